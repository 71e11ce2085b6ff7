//! Error types for the livecount server

use thiserror::Error;

/// Errors surfaced by server construction and the serve loop
///
/// Per-connection failures (read errors, write timeouts, malformed
/// frames) never reach this type; they terminate or degrade a single
/// endpoint and are logged where they happen.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket bind or accept failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Convenience result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
