// ── Session abstraction ──
//
// Full lifecycle management for a device-server connection.
// Owns the link, the inbound reader task (the property store's only
// writer), and the command processor that runs one write-and-wait at
// a time.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use skyctl_api::transport::{self, TransportConfig};
use skyctl_api::{BlobFetcher, ClientMessage, Link, LinkSender, ServerMessage, websocket};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::command::dispatch::{self, WaitContext};
use crate::command::{Clock, Command, CommandEnvelope, TokioClock};
use crate::config::SessionConfig;
use crate::error::CoreError;
use crate::model::{CONNECTION, Device, DeviceConnection, Property, PropertyId, PropertyKey, PropertyListItem, WriteType};
use crate::store::PropertyStore;
use crate::stream::SnapshotStream;

const COMMAND_CHANNEL_SIZE: usize = 64;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The link dropped underneath us. Sessions do not reconnect.
    Failed,
}

// ── NewPropertyValue ─────────────────────────────────────────────

/// One `(key, type, value)` triple of a grouped write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPropertyValue {
    pub key: PropertyKey,
    #[serde(rename = "type")]
    pub kind: WriteType,
    pub value: String,
}

impl NewPropertyValue {
    pub fn new(key: PropertyKey, kind: WriteType, value: impl Into<String>) -> Self {
        Self {
            key,
            kind,
            value: value.into(),
        }
    }
}

// ── Session ──────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<SessionInner>`. Every controller receives
/// a `Session` handle; there is no process-wide instance.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    store: Arc<PropertyStore>,
    clock: Arc<dyn Clock>,
    connection_state: watch::Sender<ConnectionState>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    sender: Mutex<Option<LinkSender>>,
    blob: Mutex<Option<BlobFetcher>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Create a new Session. Does NOT connect -- call
    /// [`connect()`](Self::connect) or [`connect_with()`](Self::connect_with).
    pub fn new(config: SessionConfig) -> Self {
        Self::with_clock(config, Arc::new(TokioClock))
    }

    /// Create a Session whose wait loops read time from `clock`.
    pub fn with_clock(config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

        Self {
            inner: Arc::new(SessionInner {
                config,
                store: Arc::new(PropertyStore::new()),
                clock,
                connection_state,
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                sender: Mutex::new(None),
                blob: Mutex::new(None),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<PropertyStore> {
        &self.inner.store
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Connect to the configured server over websocket and start the
    /// device-enumeration burst.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let url = self.inner.config.url.clone();
        self.inner.connection_state.send_replace(ConnectionState::Connecting);

        let (link, pump) = match websocket::connect(&url, self.inner.cancel.child_token()).await {
            Ok(parts) => parts,
            Err(e) => {
                self.inner.connection_state.send_replace(ConnectionState::Failed);
                return Err(CoreError::ConnectionFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        self.inner.task_handles.lock().await.push(pump);

        let fetcher = BlobFetcher::new(transport::http_base(&url)?, &TransportConfig::default())?;
        *self.inner.blob.lock().await = Some(fetcher);

        self.attach(link).await
    }

    /// Attach to an already-established link (e.g. the in-process simulator).
    pub async fn connect_with(&self, link: Link) -> Result<(), CoreError> {
        self.attach(link).await
    }

    async fn attach(&self, link: Link) -> Result<(), CoreError> {
        let Some(command_rx) = self.inner.command_rx.lock().await.take() else {
            return Err(CoreError::Internal("session was already connected".into()));
        };
        self.inner.connection_state.send_replace(ConnectionState::Connecting);

        let (sender, inbound) = link.split();
        *self.inner.sender.lock().await = Some(sender.clone());

        {
            let mut handles = self.inner.task_handles.lock().await;
            handles.push(tokio::spawn(reader_task(
                Arc::clone(&self.inner.store),
                inbound,
                self.inner.connection_state.clone(),
                self.inner.cancel.clone(),
            )));
            handles.push(tokio::spawn(command_processor_task(self.clone(), command_rx)));
        }

        self.inner.connection_state.send_replace(ConnectionState::Connected);
        sender
            .send(ClientMessage::get_properties(self.inner.config.client_name.clone()))
            .await?;
        info!(url = %self.inner.config.url, "connected to device server");
        Ok(())
    }

    /// Disconnect: stop background tasks, close the link, forget all state.
    pub async fn disconnect(&self) {
        self.inner.cancel.cancel();
        self.inner
            .connection_state
            .send_replace(ConnectionState::Disconnected);

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        *self.inner.sender.lock().await = None;
        *self.inner.blob.lock().await = None;
        self.inner.store.clear();
        debug!("disconnected");
    }

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.connection_state.borrow() == ConnectionState::Connected
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Queue a raw property write without waiting for any state change.
    pub async fn submit_write(
        &self,
        id: &PropertyId,
        kind: WriteType,
        values: Vec<(String, String)>,
    ) -> Result<(), CoreError> {
        let msg = Command::new(id.clone(), kind, values).to_message()?;
        let sender = self.sender().await?;
        debug!(property = %id, %kind, "submitting write");
        sender.send(msg).await?;
        Ok(())
    }

    /// Grouped write with SET semantics: triples addressing the same
    /// property are combined into one vector, in first-seen order.
    /// Returns the number of vectors written.
    pub async fn send_new_properties(&self, values: &[NewPropertyValue]) -> Result<usize, CoreError> {
        if values.is_empty() {
            return Err(CoreError::validation("no property values given"));
        }

        let mut groups: IndexMap<PropertyId, (WriteType, Vec<(String, String)>)> = IndexMap::new();
        for v in values {
            let entry = groups
                .entry(v.key.property_id())
                .or_insert_with(|| (v.kind, Vec::new()));
            if entry.0 != v.kind {
                return Err(CoreError::validation(format!(
                    "mixed element types for {}: {} and {}",
                    v.key.property_id(),
                    entry.0,
                    v.kind
                )));
            }
            entry.1.push((v.key.element.clone(), v.value.clone()));
        }

        // Validate every group before sending any of them.
        let messages = groups
            .into_iter()
            .map(|(id, (kind, items))| Command::new(id, kind, items).to_message())
            .collect::<Result<Vec<_>, _>>()?;

        let count = messages.len();
        let sender = self.sender().await?;
        for msg in messages {
            sender.send(msg).await?;
        }
        Ok(count)
    }

    /// Dispatch a command and wait for its terminal state.
    ///
    /// Commands are queued to the session's command processor, which runs
    /// them strictly one at a time.
    pub async fn execute(&self, cmd: Command) -> Result<Arc<Property>, CoreError> {
        if !self.is_connected() {
            return Err(CoreError::Disconnected);
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command: cmd,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::Disconnected)?;

        rx.await.map_err(|_| CoreError::Disconnected)?
    }

    /// Ask the server to deliver BLOBs for `device` per the configured mode.
    pub async fn enable_blob(&self, device: &str) -> Result<(), CoreError> {
        let sender = self.sender().await?;
        sender
            .send(ClientMessage::enable_blob(device, self.inner.config.blob_mode))
            .await?;
        Ok(())
    }

    /// Resolve a BLOB element value (URL, server path, or inline data).
    pub async fn fetch_blob(&self, value: &str) -> Result<Vec<u8>, CoreError> {
        if let Some(fetcher) = self.inner.blob.lock().await.as_ref() {
            return Ok(fetcher.fetch(value).await?);
        }
        Ok(skyctl_api::blob::decode_inline(value)?)
    }

    // ── Waiting ──────────────────────────────────────────────────

    /// Poll the store until `check` yields a result or `timeout` passes.
    pub async fn wait_until<T>(
        &self,
        what: &str,
        timeout: Duration,
        check: impl FnMut(&PropertyStore) -> Option<Result<T, CoreError>>,
    ) -> Result<T, CoreError> {
        let inner = &self.inner;
        let is_connected =
            || *inner.connection_state.borrow() == ConnectionState::Connected;
        let ctx = self.wait_context(&is_connected);
        dispatch::poll_until(&ctx, what, timeout, check).await
    }

    /// Wait until the server has announced `name`.
    pub async fn wait_for_device(&self, name: &str, timeout: Duration) -> Result<Arc<Device>, CoreError> {
        self.wait_until(name, timeout, |store| store.device(name).map(Ok))
            .await
            .map_err(|e| match e {
                CoreError::Timeout { .. } => CoreError::DeviceNotFound { name: name.to_owned() },
                other => other,
            })
    }

    /// Wait until `id` is defined.
    pub async fn wait_for_property(&self, id: &PropertyId, timeout: Duration) -> Result<Arc<Property>, CoreError> {
        self.wait_until(&id.to_string(), timeout, |store| store.property(id).map(Ok))
            .await
            .map_err(|e| match e {
                CoreError::Timeout { .. } => CoreError::PropertyNotFound { key: id.to_string() },
                other => other,
            })
    }

    // ── Device connection ────────────────────────────────────────

    /// Connect a driver: `CONNECTION.CONNECTED = ON`, await ON and OK.
    pub async fn connect_device(&self, name: &str) -> Result<(), CoreError> {
        let device = self.wait_for_device(name, self.inner.config.timeout).await?;
        if device.connection == DeviceConnection::Connected {
            debug!(device = name, "already connected");
            return Ok(());
        }
        self.execute(Command::switch_on(PropertyId::new(name, CONNECTION), &["CONNECTED"]))
            .await?;
        info!(device = name, "device connected");
        Ok(())
    }

    /// Disconnect a driver: `CONNECTION.DISCONNECTED = ON`.
    pub async fn disconnect_device(&self, name: &str) -> Result<(), CoreError> {
        self.wait_for_device(name, self.inner.config.timeout).await?;
        self.execute(Command::switch_on(PropertyId::new(name, CONNECTION), &["DISCONNECTED"]))
            .await?;
        info!(device = name, "device disconnected");
        Ok(())
    }

    // ── Reads ────────────────────────────────────────────────────

    pub fn snapshot(&self, id: &PropertyId) -> Option<Arc<Property>> {
        self.inner.store.property(id)
    }

    pub fn list_devices(&self) -> Vec<String> {
        self.inner.store.list_devices()
    }

    pub fn devices(&self) -> Arc<Vec<Arc<Device>>> {
        self.inner.store.devices_snapshot()
    }

    /// One row per element across every known property.
    pub fn property_list(&self) -> Vec<PropertyListItem> {
        self.inner.store.property_list()
    }

    pub fn properties(&self) -> SnapshotStream<Property> {
        self.inner.store.subscribe_properties()
    }

    // ── Private helpers ──────────────────────────────────────────

    async fn sender(&self) -> Result<LinkSender, CoreError> {
        self.inner
            .sender
            .lock()
            .await
            .clone()
            .ok_or(CoreError::Disconnected)
    }

    fn wait_context<'a>(&'a self, is_connected: &'a (dyn Fn() -> bool + Send + Sync)) -> WaitContext<'a> {
        WaitContext {
            store: &self.inner.store,
            clock: self.inner.clock.as_ref(),
            poll_interval: self.inner.config.poll_interval,
            is_connected,
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Apply inbound frames to the store. The only writer of server state.
async fn reader_task(
    store: Arc<PropertyStore>,
    mut inbound: mpsc::Receiver<ServerMessage>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            msg = inbound.recv() => {
                let Some(msg) = msg else {
                    warn!("device server link closed");
                    state.send_replace(ConnectionState::Failed);
                    break;
                };
                trace!(?msg, "inbound frame");
                store.apply(msg);
            }
        }
    }
}

/// Run queued commands one at a time.
async fn command_processor_task(session: Session, mut rx: mpsc::Receiver<CommandEnvelope>) {
    let cancel = session.inner.cancel.clone();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let result = tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(CoreError::Disconnected),
                    r = run_command(&session, &envelope.command) => r,
                };
                let _ = envelope.response_tx.send(result);
            }
        }
    }
}

async fn run_command(session: &Session, cmd: &Command) -> Result<Arc<Property>, CoreError> {
    let sender = session.sender().await?;
    let timeout = cmd.timeout.unwrap_or(session.inner.config.timeout);
    let inner = &session.inner;
    let is_connected = || *inner.connection_state.borrow() == ConnectionState::Connected;
    let ctx = session.wait_context(&is_connected);
    dispatch::execute(&ctx, &sender, cmd, timeout).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use skyctl_api::{LinkPeer, protocol::new_switch};

    async fn connected() -> (Session, LinkPeer) {
        let (link, mut peer) = Link::pair();
        let session = Session::new(SessionConfig::default());
        session.connect_with(link).await.unwrap();
        // Swallow the enumeration request.
        assert!(matches!(peer.inbound.recv().await, Some(ClientMessage::GetProperties(_))));
        (session, peer)
    }

    #[tokio::test]
    async fn grouped_writes_combine_per_property() {
        let (session, mut peer) = connected().await;
        let values = vec![
            NewPropertyValue::new("/Mount/MOUNT_EQUATORIAL_COORDINATES/RA".parse().unwrap(), WriteType::Number, "6.5"),
            NewPropertyValue::new("/Mount/MOUNT_PARK/PARKED".parse().unwrap(), WriteType::Switch, "ON"),
            NewPropertyValue::new("/Mount/MOUNT_EQUATORIAL_COORDINATES/DEC".parse().unwrap(), WriteType::Number, "-12"),
        ];
        assert_eq!(session.send_new_properties(&values).await.unwrap(), 2);

        let ClientMessage::NewNumberVector(coords) = peer.inbound.recv().await.unwrap() else {
            panic!("expected number vector first");
        };
        assert_eq!(coords.items.len(), 2);
        assert_eq!(coords.items[1].name, "DEC");
        assert_eq!(
            peer.inbound.recv().await.unwrap(),
            new_switch("Mount", "MOUNT_PARK", [("PARKED".to_string(), true)])
        );
    }

    #[tokio::test]
    async fn grouped_write_rejects_mixed_types_before_sending() {
        let (session, mut peer) = connected().await;
        let values = vec![
            NewPropertyValue::new("/CCD/CCD_BIN/HORIZONTAL".parse().unwrap(), WriteType::Number, "2"),
            NewPropertyValue::new("/CCD/CCD_BIN/VERTICAL".parse().unwrap(), WriteType::Text, "2"),
        ];
        assert!(matches!(
            session.send_new_properties(&values).await,
            Err(CoreError::ValidationFailed { .. })
        ));
        assert!(peer.inbound.try_recv().is_err());
    }

    fn coordinates(kind: &str, state: &str, ra: f64) -> ServerMessage {
        ServerMessage::from_json(&format!(
            r#"{{"{kind}NumberVector": {{"device": "Mount", "name": "MOUNT_EQUATORIAL_COORDINATES",
                "state": "{state}", "items": [{{"name": "RA", "value": {ra}}}, {{"name": "DEC", "value": 0}}]}}}}"#
        ))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn stale_ok_does_not_finish_a_slew() {
        let (session, mut peer) = connected().await;
        let id = PropertyId::new("Mount", "MOUNT_EQUATORIAL_COORDINATES");
        peer.outbound.send(coordinates("def", "Ok", 0.0)).await.unwrap();
        session.wait_for_property(&id, Duration::from_secs(1)).await.unwrap();

        let cmd = Command::number(id, &[("RA", 6.0), ("DEC", 0.0)]).after_busy();
        let slew = tokio::spawn({
            let session = session.clone();
            async move { session.execute(cmd).await }
        });
        assert!(matches!(peer.inbound.recv().await, Some(ClientMessage::NewNumberVector(_))));

        // A tracking update sent before the server saw the write.
        peer.outbound.send(coordinates("set", "Ok", 0.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!slew.is_finished());

        peer.outbound.send(coordinates("set", "Busy", 3.0)).await.unwrap();
        peer.outbound.send(coordinates("set", "Ok", 6.0)).await.unwrap();
        let prop = slew.await.unwrap().unwrap();
        assert_eq!(prop.number("RA"), Some(6.0));
    }

    #[tokio::test(start_paused = true)]
    async fn plain_number_write_accepts_immediate_ok() {
        let (session, mut peer) = connected().await;
        let id = PropertyId::new("Mount", "MOUNT_EQUATORIAL_COORDINATES");
        peer.outbound.send(coordinates("def", "Ok", 0.0)).await.unwrap();
        session.wait_for_property(&id, Duration::from_secs(1)).await.unwrap();

        let cmd = Command::number(id, &[("RA", 6.0), ("DEC", 0.0)]);
        let sync = tokio::spawn({
            let session = session.clone();
            async move { session.execute(cmd).await }
        });
        assert!(matches!(peer.inbound.recv().await, Some(ClientMessage::NewNumberVector(_))));
        peer.outbound.send(coordinates("set", "Ok", 6.0)).await.unwrap();
        assert!(sync.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn execute_requires_connection() {
        let session = Session::new(SessionConfig::default());
        let cmd = Command::switch_on(PropertyId::new("CCD", CONNECTION), &["CONNECTED"]);
        assert!(matches!(session.execute(cmd).await, Err(CoreError::Disconnected)));
    }

    #[tokio::test]
    async fn second_attach_is_refused() {
        let (session, _peer) = connected().await;
        let (link, _peer2) = Link::pair();
        assert!(matches!(session.connect_with(link).await, Err(CoreError::Internal(_))));
    }
}
