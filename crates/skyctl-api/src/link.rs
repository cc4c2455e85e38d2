//! Message-passing link between a session and a device server.
//!
//! A [`Link`] is the client half: an outbound sender and an inbound
//! receiver of already-parsed frames. The websocket transport produces one
//! backed by a socket pump task; [`Link::pair`] produces one connected to an
//! in-process [`LinkPeer`] (used by the simulator and tests).

use tokio::sync::mpsc;

use crate::error::Error;
use crate::protocol::{ClientMessage, ServerMessage};

const LINK_CHANNEL_CAPACITY: usize = 1024;

/// Client half of a link.
#[derive(Debug)]
pub struct Link {
    outbound: mpsc::Sender<ClientMessage>,
    inbound: mpsc::Receiver<ServerMessage>,
}

/// Server half of an in-process link.
#[derive(Debug)]
pub struct LinkPeer {
    pub inbound: mpsc::Receiver<ClientMessage>,
    pub outbound: mpsc::Sender<ServerMessage>,
}

impl Link {
    pub(crate) fn from_parts(
        outbound: mpsc::Sender<ClientMessage>,
        inbound: mpsc::Receiver<ServerMessage>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// Create a connected in-memory link pair.
    pub fn pair() -> (Self, LinkPeer) {
        let (client_tx, client_rx) = mpsc::channel(LINK_CHANNEL_CAPACITY);
        let (server_tx, server_rx) = mpsc::channel(LINK_CHANNEL_CAPACITY);
        (
            Self::from_parts(client_tx, server_rx),
            LinkPeer {
                inbound: client_rx,
                outbound: server_tx,
            },
        )
    }

    /// Split into a cloneable sender and the inbound receiver.
    pub fn split(self) -> (LinkSender, mpsc::Receiver<ServerMessage>) {
        (LinkSender(self.outbound), self.inbound)
    }
}

/// Cloneable outbound handle.
#[derive(Debug, Clone)]
pub struct LinkSender(mpsc::Sender<ClientMessage>);

impl LinkSender {
    /// Queue a frame for the server. Does not wait for any acknowledgement.
    pub async fn send(&self, msg: ClientMessage) -> Result<(), Error> {
        self.0.send(msg).await.map_err(|_| Error::LinkClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::{DeleteProperty, ServerMessage};

    #[tokio::test]
    async fn pair_carries_frames_both_ways() {
        let (link, mut peer) = Link::pair();
        let (tx, mut rx) = link.split();

        tx.send(ClientMessage::get_properties("test")).await.unwrap();
        let got = peer.inbound.recv().await.unwrap();
        assert!(matches!(got, ClientMessage::GetProperties(_)));

        peer.outbound
            .send(ServerMessage::DeleteProperty(DeleteProperty {
                device: "CCD".into(),
                name: None,
            }))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().device(), Some("CCD"));
    }

    #[tokio::test]
    async fn send_fails_once_peer_is_gone() {
        let (link, peer) = Link::pair();
        let (tx, _rx) = link.split();
        drop(peer);

        assert!(tx.is_closed());
        assert!(matches!(
            tx.send(ClientMessage::get_properties("test")).await,
            Err(Error::LinkClosed)
        ));
    }
}
