// ── Runtime session configuration ──
//
// Describes *how* to talk to a device server. Never touches disk: the
// CLI (or any other consumer) builds a `SessionConfig` and hands it in.

use std::time::Duration;

use skyctl_api::BlobMode;
use skyctl_api::transport::{self, DEFAULT_PORT};
use url::Url;

use crate::error::CoreError;

/// Poll interval used by the command dispatcher unless overridden.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for a single device-server session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server websocket URL (e.g., `ws://localhost:7624/`).
    pub url: Url,
    /// Client name announced with `getProperties`.
    pub client_name: String,
    /// Default deadline for a dispatched command to reach its terminal state.
    pub timeout: Duration,
    /// How often the dispatcher re-reads the property store while waiting.
    pub poll_interval: Duration,
    /// BLOB delivery policy requested for image downloads.
    pub blob_mode: BlobMode,
}

impl SessionConfig {
    /// Build a config for `host:port` with default tuning.
    pub fn for_host(host: &str, port: u16) -> Result<Self, CoreError> {
        Ok(Self {
            url: transport::server_url(host, port)?,
            ..Self::default()
        })
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: Url::parse(&format!("ws://localhost:{DEFAULT_PORT}/"))
                .unwrap_or_else(|_| unreachable!("static URL is valid")),
            client_name: "skyctl".into(),
            timeout: Duration::from_secs(60),
            poll_interval: DEFAULT_POLL_INTERVAL,
            blob_mode: BlobMode::Url,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_local_server() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.url.as_str(), "ws://localhost:7624/");
        assert_eq!(cfg.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn for_host_keeps_tuning_defaults() {
        let cfg = SessionConfig::for_host("observatory.local", 7625).unwrap();
        assert_eq!(cfg.url.as_str(), "ws://observatory.local:7625/");
        assert_eq!(cfg.client_name, "skyctl");
    }
}
