//! Error types for the speed test engine
//!
//! Per-candidate failures during ranking and per-stream failures during load
//! generation are absorbed where they occur and logged at debug level. Only
//! conditions that leave an operation without a usable result are represented
//! here and propagate to the caller.

use thiserror::Error;

/// Errors produced by the speed test engine
#[derive(Debug, Error)]
pub enum SpeedtestError {
    /// Ranking finished with zero usable results
    #[error("no server is currently available, please try again later")]
    NoServersAvailable,

    /// Both latency strategies failed to produce samples for a server
    #[error("latency probe failed for server '{server}': {reason}")]
    ProbeFailed { server: String, reason: String },

    /// Liveness check or connection failed; excludes the server from ranking
    #[error("server '{server}' is unreachable: {reason}")]
    ServerUnreachable { server: String, reason: String },

    /// A server entry carries an endpoint that cannot be parsed into a URL
    #[error("invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Request-level transport failure, before any stream absorption applies
    #[error("transfer failed: {0}")]
    Transfer(#[from] reqwest::Error),

    /// A whole transfer window elapsed without a single byte moving
    #[error("transfer window ended with zero progress ({failed_streams} streams failed)")]
    TransferStalled { failed_streams: usize },

    /// Telemetry endpoint returned a malformed or rejecting response
    #[error("telemetry server returned an invalid response: {0}")]
    TelemetryRejected(String),

    /// Orchestrator phase sequencing violation
    #[error("invalid phase transition: {0}")]
    InvalidPhaseTransition(String),
}

pub type SpeedtestResult<T> = Result<T, SpeedtestError>;
