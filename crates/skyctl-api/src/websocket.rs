//! WebSocket transport for the INDIGO JSON protocol.
//!
//! [`connect`] opens the socket and spawns a pump task that moves frames
//! between the socket and a [`Link`]. A failed handshake is returned
//! immediately; a socket that drops later ends the pump, which closes the
//! link's inbound channel. There is no automatic reconnect.
//!
//! # Example
//!
//! ```rust,ignore
//! use skyctl_api::websocket;
//! use tokio_util::sync::CancellationToken;
//!
//! let url = skyctl_api::transport::server_url("localhost", 7624)?;
//! let (link, pump) = websocket::connect(&url, CancellationToken::new()).await?;
//! let (tx, mut rx) = link.split();
//! tx.send(ClientMessage::get_properties("skyctl")).await?;
//! while let Some(frame) = rx.recv().await {
//!     println!("{:?}", frame.device());
//! }
//! ```

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::link::Link;
use crate::protocol::{ClientMessage, ServerMessage};

// ── Channel capacity ─────────────────────────────────────────────────

const FRAME_CHANNEL_CAPACITY: usize = 1024;

// ── Connection ───────────────────────────────────────────────────────

/// Open a websocket to the device server and start the frame pump.
///
/// Returns once the handshake has completed. The pump runs until the
/// socket closes, the link's sender side is dropped, or `cancel` fires.
pub async fn connect(url: &Url, cancel: CancellationToken) -> Result<(Link, JoinHandle<()>), Error> {
    tracing::info!(url = %url, "connecting to device server");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::Connect(e.to_string()))?;

    let request = ClientRequestBuilder::new(uri);
    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::Connect(e.to_string()))?;

    tracing::info!("websocket connected");

    let (outbound_tx, outbound_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    let (inbound_tx, inbound_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);

    let pump = tokio::spawn(async move {
        if let Err(e) = pump(ws_stream, outbound_rx, inbound_tx, cancel).await {
            tracing::warn!(error = %e, "websocket pump ended with error");
        }
        tracing::debug!("websocket pump exiting");
    });

    Ok((Link::from_parts(outbound_tx, inbound_rx), pump))
}

// ── Frame pump ───────────────────────────────────────────────────────

async fn pump<S>(
    ws_stream: tokio_tungstenite::WebSocketStream<S>,
    mut outbound: mpsc::Receiver<ClientMessage>,
    inbound: mpsc::Sender<ServerMessage>,
    cancel: CancellationToken,
) -> Result<(), Error>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(tungstenite::Message::Close(None)).await;
                return Ok(());
            }
            msg = outbound.recv() => {
                let Some(msg) = msg else {
                    // Session dropped its sender: close politely.
                    let _ = write.send(tungstenite::Message::Close(None)).await;
                    return Ok(());
                };
                let json = msg.to_json()?;
                tracing::trace!(frame = %json, "sending frame");
                write
                    .send(tungstenite::Message::text(json))
                    .await
                    .map_err(|e| Error::Connect(e.to_string()))?;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if let Some(msg) = parse_frame(&text) {
                            if inbound.send(msg).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite queues the pong itself
                        tracing::trace!("websocket ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        return Err(match frame {
                            Some(cf) => Error::Closed {
                                code: u16::from(cf.code),
                                reason: cf.reason.to_string(),
                            },
                            None => Error::Closed {
                                code: 1005,
                                reason: "no close payload".into(),
                            },
                        });
                    }
                    Some(Err(e)) => return Err(Error::Connect(e.to_string())),
                    None => {
                        tracing::info!("websocket stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, raw Frame: not part of the JSON protocol
                    }
                }
            }
        }
    }
}

// ── Message parsing ──────────────────────────────────────────────────

/// Parse a text frame, logging and dropping anything malformed.
fn parse_frame(text: &str) -> Option<ServerMessage> {
    match ServerMessage::from_json(text) {
        Ok(msg) => {
            tracing::trace!(device = ?msg.device(), "received frame");
            Some(msg)
        }
        Err(e) => {
            tracing::debug!(error = %e, "dropping unparseable frame");
            None
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_frame_accepts_set_vector() {
        let raw = serde_json::json!({
            "setSwitchVector": {
                "device": "Mount Simulator @ localhost",
                "name": "MOUNT_PARK",
                "state": "Busy",
                "items": [{"name": "PARKED", "value": true}]
            }
        });

        let msg = parse_frame(&raw.to_string()).unwrap();
        assert_eq!(msg.device(), Some("Mount Simulator @ localhost"));
    }

    #[test]
    fn parse_frame_drops_malformed_json() {
        assert!(parse_frame("not json at all").is_none());
        assert!(parse_frame(r#"{"unknownVector": {}}"#).is_none());
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails_immediately() {
        let url = Url::parse("ws://127.0.0.1:1/").unwrap();
        let err = connect(&url, CancellationToken::new()).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
