// ── Core error types ──
//
// User-facing errors from skyctl-core. Consumers never see websocket
// frames or JSON parse failures directly; the `From<skyctl_api::Error>`
// impl translates transport-layer errors into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to device server at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Not connected to a device server")]
    Disconnected,

    // ── Dispatch errors ──────────────────────────────────────────────
    #[error("Timed out after {timeout_ms}ms waiting for {key}")]
    Timeout { key: String, timeout_ms: u64 },

    #[error("Device server rejected {key}: {message}")]
    Rejected { key: String, message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {name}")]
    DeviceNotFound { name: String },

    #[error("Property not found: {key}")]
    PropertyNotFound { key: String },

    #[error("Element not found: {key}")]
    ElementNotFound { key: String },

    // ── Validation errors ────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Pointing model errors ────────────────────────────────────────
    #[error("Not enough sync points on the {pier} side: need {needed}, have {available}")]
    InsufficientSyncPoints {
        pier: String,
        needed: usize,
        available: usize,
    },

    #[error("Pointing model file {path}: {reason}")]
    ModelFile { path: String, reason: String },

    // ── IO / internal ────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    /// Returns `true` if the session behind this error is no longer usable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::Disconnected)
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<skyctl_api::Error> for CoreError {
    fn from(err: skyctl_api::Error) -> Self {
        match err {
            skyctl_api::Error::Connect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason,
            },
            skyctl_api::Error::Closed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            skyctl_api::Error::LinkClosed => CoreError::Disconnected,
            skyctl_api::Error::Transport(e) => CoreError::Internal(format!("BLOB download failed: {e}")),
            skyctl_api::Error::InvalidUrl(e) => CoreError::validation(format!("invalid URL: {e}")),
            skyctl_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            skyctl_api::Error::Blob(message) => CoreError::Internal(message),
        }
    }
}
