use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

/// Which coupling direction this launch of the bridge drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    NestToTvb,
    TvbToNest,
}

/// The run parameters the orchestrator hands the bridge. A Rust
/// analogue of the orchestrator's XML-parsed configuration dictionary;
/// XML parsing itself is out of scope, so this is loaded from a JSON
/// sidecar the orchestrator writes instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Shared directory root for handshake files.
    pub path: PathBuf,
    pub direction: Direction,
    pub id_first_neurons: i64,
    pub id_nest_region: i64,
    pub time_synchronization_ms: f64,
    pub resolution_ms: f64,
    pub nb_neurons: usize,
    pub max_events: usize,
    pub id_first_spike_detector: i64,
    /// Number of ranks in the NEST-side process group this bridge talks
    /// to. Required because the TCP transport has no built-in notion of
    /// group size the way an MPI intercomm would.
    pub nest_peer_count: usize,
    /// Number of ranks in the TVB-side process group this bridge talks
    /// to, analogous to `nest_peer_count`.
    pub tvb_peer_count: usize,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_owned(),
                source,
            })?;
        let cfg = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        Ok(cfg)
    }

    pub fn buffer_len(&self) -> usize {
        2 + self.max_events
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Process-launch arguments. Each rank of the process group is started
/// with the same config file and direction, differing only in `rank`.
#[derive(Debug, Parser)]
#[command(name = "bridge-hub", version, about)]
pub struct Cli {
    /// This process's rank within the launch group.
    #[arg(long, env = "BRIDGE_RANK")]
    pub rank: usize,

    /// Total number of ranks in the launch group.
    #[arg(long, env = "BRIDGE_WORLD_SIZE")]
    pub world_size: usize,

    /// Rank that runs the receive loop (R_recv).
    #[arg(long, env = "BRIDGE_RECV_RANK", default_value_t = 0)]
    pub recv_rank: usize,

    /// Rank that runs the emit loop (R_send).
    #[arg(long, env = "BRIDGE_SEND_RANK")]
    pub send_rank: usize,

    /// Path to the JSON run configuration.
    #[arg(long, env = "BRIDGE_CONFIG")]
    pub config: PathBuf,

    /// Overrides the direction recorded in the config file, if set.
    #[arg(long, env = "BRIDGE_DIRECTION", value_enum)]
    pub direction: Option<Direction>,
}
