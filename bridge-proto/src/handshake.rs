//! Filesystem handshakes with the NEST side: the bridge polls for a
//! `.unlock` sentinel written by NEST, then reads the sibling data file
//! it guards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ProtoError;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

fn unlock_path(data_path: &Path) -> PathBuf {
    let mut name = data_path.as_os_str().to_owned();
    name.push(".unlock");
    PathBuf::from(name)
}

/// Blocks, polling every second, until `data_path`'s `.unlock` sentinel
/// appears. There is no default deadline (per the error-handling design,
/// a caller that wants one wraps this in `tokio::time::timeout`).
pub async fn wait_for_unlock(data_path: &Path) {
    let sentinel = unlock_path(data_path);
    loop {
        if tokio::fs::try_exists(&sentinel).await.unwrap_or(false) {
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Reads `data_path` as whitespace-separated integers (the requested
/// spike-generator ids NEST wrote once the `.unlock` sentinel appeared).
pub async fn read_requested_ids(data_path: &Path) -> Result<Vec<i64>, ProtoError> {
    let text =
        tokio::fs::read_to_string(data_path)
            .await
            .map_err(|source| ProtoError::ReadHandshake {
                path: data_path.to_owned(),
                source,
            })?;
    Ok(text
        .split_whitespace()
        .filter_map(|tok| tok.parse::<f64>().ok())
        .map(|v| v as i64)
        .collect())
}
