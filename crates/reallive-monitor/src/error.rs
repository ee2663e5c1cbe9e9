//! Error types for the monitor.

use std::path::PathBuf;

use thiserror::Error;

// ── Connection ──────────────────────────────────────────────────────

/// Why one connection attempt (FLV pull or SRS poll) ended.
///
/// None of these escape a monitor task; they are logged and the task
/// reconnects.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("stream closed by server")]
    StreamClosed,
    #[error("SRS API returned code {0}")]
    Api(i64),
}

// ── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
