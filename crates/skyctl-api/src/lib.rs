// skyctl-api: Async client plumbing for INDIGO device servers (JSON protocol over WebSocket)

pub mod blob;
pub mod error;
pub mod link;
pub mod protocol;
pub mod transport;
pub mod websocket;

pub use blob::BlobFetcher;
pub use error::Error;
pub use link::{Link, LinkPeer, LinkSender};
pub use protocol::{
    BlobItem, BlobMode, ClientMessage, Item, ItemValue, LightItem, NumberItem, PropertyPerm,
    PropertyState, PropertyType, PropertyVector, ServerMessage, SwitchItem, SwitchRule, TextItem,
    VectorEvent,
};
