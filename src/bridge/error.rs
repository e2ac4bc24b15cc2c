use thiserror::Error;

use super::control::BridgeVerb;

/// Bridge failures.
///
/// Start and stop failures are separate variants, and a failed forced stop
/// after a failed primary stop keeps both errors.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge {verb} request failed: {source}")]
    Transport {
        verb: BridgeVerb,
        #[source]
        source: reqwest::Error,
    },
    #[error("bridge rejected {verb} with status {status}: {message}")]
    Rejected {
        verb: BridgeVerb,
        status: u16,
        message: String,
    },
    #[error("bridge failed to start: {0}")]
    StartFailed(#[source] Box<BridgeError>),
    #[error("bridge stop failed, forced stop succeeded: {0}")]
    StopFailed(#[source] Box<BridgeError>),
    #[error("bridge stop failed ({primary}) and forced stop failed ({cleanup})")]
    CleanupFailed {
        primary: Box<BridgeError>,
        #[source]
        cleanup: Box<BridgeError>,
    },
    #[error("invalid bridge operation: {0}")]
    InvalidOp(String),
    #[error("invalid amount {0:?}")]
    InvalidAmount(String),
}

impl BridgeError {
    /// Whether this error came from the shutdown path.
    pub fn is_stop_failure(&self) -> bool {
        matches!(self, BridgeError::StopFailed(_) | BridgeError::CleanupFailed { .. })
    }
}
