//! # Playback Error Types
//!
//! Errors raised by the progress stores, the URL refresh client and the
//! connection monitor. Most of them never reach the host: the tracker turns
//! save failures into a local fallback and read failures into `None`.

use bridge_traits::BridgeError;
use thiserror::Error;

/// Errors that can occur in the playback core.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Remote Progress Store
    // ========================================================================
    /// The progress service could not be reached or failed server-side.
    #[error("Remote progress store unavailable: {0}")]
    RemoteUnavailable(String),

    /// The progress service refused the request (validation, auth).
    #[error("Remote progress store rejected request ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    // ========================================================================
    // Local Cache Store
    // ========================================================================
    /// Device-local storage failed.
    #[error("Local cache error: {0}")]
    LocalCache(String),

    /// Device-local storage is full.
    #[error("Local storage quota exceeded for key {key}")]
    QuotaExceeded { key: String },

    // ========================================================================
    // Signed URL refresh
    // ========================================================================
    /// The refresh endpoint answered with a non-success status.
    #[error("URL refresh rejected ({status}): {message}")]
    RefreshRejected { status: u16, message: String },

    /// The refresh endpoint could not be reached.
    #[error("URL refresh failed: {0}")]
    RefreshFailed(String),

    /// A response body did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// No lease has been set on the refresh manager.
    #[error("No signed URL lease is active")]
    NoActiveLease,

    // ========================================================================
    // Input / wiring
    // ========================================================================
    /// A position or duration was negative or not a number.
    #[error("Invalid progress value: {0}")]
    InvalidProgress(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            PlaybackError::RemoteUnavailable(_) | PlaybackError::RefreshFailed(_) => true,
            PlaybackError::RemoteRejected { status, .. }
            | PlaybackError::RefreshRejected { status, .. } => *status == 429 || *status >= 500,
            PlaybackError::Bridge(BridgeError::OperationFailed(_)) => true,
            _ => false,
        }
    }

    /// Returns `true` if this error is due to network issues.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::RemoteUnavailable(_)
                | PlaybackError::RefreshFailed(_)
                | PlaybackError::Bridge(BridgeError::OperationFailed(_))
        )
    }

    /// Returns `true` if device-local storage is out of space.
    pub fn is_quota_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::QuotaExceeded { .. }
                | PlaybackError::Bridge(BridgeError::QuotaExceeded { .. })
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
