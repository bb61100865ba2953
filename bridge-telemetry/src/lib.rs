//! Standardized telemetry for the bridge binary.
//!
//! A trimmed sibling of `orb-telemetry`: the bridge is a batch process
//! launched once per run by an orchestrator rather than a long-lived
//! system service, so there is no journald or opentelemetry export here,
//! just `RUST_LOG`-driven stderr logging with the run's rank and
//! direction attached to every span.

use std::io::Write as _;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter,
};

/// Initializes the global tracing subscriber. Call once, at the start of
/// `main`. `rank` and `direction` are attached to every log line emitted
/// by this process so a run's logs can be demultiplexed by rank after
/// the fact.
pub fn init(rank: u32, direction: &str) -> TelemetryFlusher {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    tracing::info!(rank, direction, "telemetry initialized");
    TelemetryFlusher
}

/// Flushes stdout/stderr at the end of a run.
#[must_use = "call .flush() at the end of the program, otherwise buffered output may be lost"]
pub struct TelemetryFlusher;

impl TelemetryFlusher {
    pub fn flush(self) {
        std::io::stderr().flush().ok();
        std::io::stdout().flush().ok();
    }
}
