// Shared transport configuration.
//
// The websocket and the BLOB downloader both derive their endpoints from
// the same server URL; this module owns that mapping and the reqwest
// builder so neither duplicates it.

use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Default INDIGO server port.
pub const DEFAULT_PORT: u16 = 7624;

/// Transport configuration for the HTTP side of a session (BLOB downloads).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("skyctl/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(Error::Transport)
    }
}

/// Build the websocket URL for a host and port.
pub fn server_url(host: &str, port: u16) -> Result<Url, Error> {
    Ok(Url::parse(&format!("ws://{host}:{port}/"))?)
}

/// Map a websocket server URL onto its HTTP counterpart (`ws` → `http`,
/// `wss` → `https`). BLOB URLs are resolved against this base.
pub fn http_base(ws_url: &Url) -> Result<Url, Error> {
    let scheme = match ws_url.scheme() {
        "wss" | "https" => "https",
        _ => "http",
    };
    let host = ws_url
        .host_str()
        .ok_or_else(|| Error::Connect(format!("URL has no host: {ws_url}")))?;
    let port = ws_url.port_or_known_default().unwrap_or(DEFAULT_PORT);
    Ok(Url::parse(&format!("{scheme}://{host}:{port}/"))?)
}
