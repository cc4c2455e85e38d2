use thiserror::Error;

/// Top-level error type for the `skyctl-api` crate.
///
/// Covers the transport-level failure modes: establishing the websocket,
/// losing it, decoding frames, and fetching BLOB payloads.
/// `skyctl-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── WebSocket ───────────────────────────────────────────────────
    /// Could not establish the websocket (refused, DNS failure, bad handshake).
    #[error("WebSocket connection failed: {0}")]
    Connect(String),

    /// WebSocket closed by the server.
    #[error("WebSocket closed (code {code}): {reason}")]
    Closed { code: u16, reason: String },

    /// The link's pump task has exited and can no longer carry messages.
    #[error("Link to device server is closed")]
    LinkClosed,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error while downloading a BLOB.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON (de)serialization failed, with the raw frame for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// BLOB item carried neither inline data nor a fetchable URL, or the
    /// inline payload was not valid base64.
    #[error("BLOB error: {0}")]
    Blob(String),
}

impl Error {
    /// Returns `true` if the error means the session can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Closed { .. } | Self::LinkClosed
        )
    }

    /// Returns `true` if this is a "not found" response from the BLOB URL.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }
}
