// ── Property store ──
//
// Client-side mirror of every device and property the server has
// announced. Inbound frames are applied by the session's reader task;
// everything else only reads. Each property is stored as an immutable
// `Arc<Property>` replaced wholesale per message, so a reader never
// observes a half-applied vector.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use skyctl_api::protocol::VectorEvent;
use skyctl_api::{PropertyState, ServerMessage};
use tracing::{debug, info, warn};

use super::collection::EntityCollection;
use crate::model::key::store_key;
use crate::model::{CONNECTION, Device, DeviceConnection, Property, PropertyId, PropertyKey, PropertyListItem};
use crate::stream::SnapshotStream;

/// Reactive store of devices and their properties.
pub struct PropertyStore {
    devices: EntityCollection<Device>,
    properties: EntityCollection<Property>,
    /// Store-wide message sequence; stamped into `Property::revision`.
    sequence: AtomicU64,
    /// Revision of the last server-sent Busy update, per property.
    busy_revisions: DashMap<String, u64>,
    /// Serializes read-modify-write of individual properties.
    write_lock: Mutex<()>,
}

impl Default for PropertyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyStore {
    pub fn new() -> Self {
        Self {
            devices: EntityCollection::new(),
            properties: EntityCollection::new(),
            sequence: AtomicU64::new(0),
            busy_revisions: DashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    // ── Inbound application ──────────────────────────────────────────

    /// Apply one inbound frame.
    pub fn apply(&self, msg: ServerMessage) {
        let _guard = self.lock();
        let revision = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;

        match msg.into_event() {
            VectorEvent::Define(kind, vector) => {
                let prop = Property::from_definition(kind, vector, revision);
                debug!(device = %prop.device, property = %prop.name, "property defined");
                let id = prop.id();
                self.properties.upsert(id.store_key(), prop);
                self.refresh_device(&id.device);
            }
            VectorEvent::Update(_, vector) => {
                let key = store_key(&vector.device, &vector.name);
                let Some(existing) = self.properties.get_by_key(&key) else {
                    warn!(device = %vector.device, property = %vector.name, "update for undefined property ignored");
                    return;
                };
                let next = existing.merged(vector, revision);
                if next.state == PropertyState::Busy {
                    self.busy_revisions.insert(key.clone(), revision);
                }
                let is_connection = next.name == CONNECTION;
                let device = next.device.clone();
                self.properties.upsert(key, next);
                if is_connection {
                    self.refresh_device(&device);
                }
            }
            VectorEvent::Delete { device, name: Some(name) } => {
                debug!(%device, property = %name, "property deleted");
                self.properties.remove(&store_key(&device, &name));
                self.refresh_device(&device);
            }
            VectorEvent::Delete { device, name: None } => {
                debug!(%device, "device deleted");
                self.properties.remove_where(|p| p.device == device);
                self.devices.remove(&device);
            }
            VectorEvent::Notice { device, message } => {
                info!(device = device.as_deref().unwrap_or("server"), "{message}");
            }
        }
    }

    /// Optimistically flag a property Busy ahead of a client write, so a
    /// stale Ok state cannot satisfy the write's completion check.
    pub(crate) fn mark_busy(&self, id: &PropertyId) {
        let _guard = self.lock();
        let key = id.store_key();
        if let Some(existing) = self.properties.get_by_key(&key) {
            let mut next = (*existing).clone();
            next.state = PropertyState::Busy;
            next.revision = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
            next.updated = Utc::now();
            self.properties.upsert(key, next);
        }
    }

    /// Drop everything (on disconnect).
    pub fn clear(&self) {
        let _guard = self.lock();
        self.properties.clear();
        self.devices.clear();
        self.busy_revisions.clear();
    }

    // ── Lookups ──────────────────────────────────────────────────────

    /// Revision of the last Busy update the server sent for `id`, or 0.
    /// Local [`mark_busy`](Self::mark_busy) flags do not count.
    pub(crate) fn server_busy_revision(&self, id: &PropertyId) -> u64 {
        self.busy_revisions.get(&id.store_key()).map_or(0, |r| *r)
    }

    pub fn property(&self, id: &PropertyId) -> Option<Arc<Property>> {
        self.properties.get_by_key(&id.store_key())
    }

    pub fn device(&self, name: &str) -> Option<Arc<Device>> {
        self.devices.get_by_key(name)
    }

    /// Display value of one element, if present.
    pub fn element_value(&self, key: &PropertyKey) -> Option<String> {
        self.property(&key.property_id())?
            .element(&key.element)
            .map(|e| e.value.display_value())
    }

    /// Device names, sorted.
    pub fn list_devices(&self) -> Vec<String> {
        self.devices.snapshot().iter().map(|d| d.name.clone()).collect()
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.devices.snapshot()
    }

    pub fn properties_snapshot(&self) -> Arc<Vec<Arc<Property>>> {
        self.properties.snapshot()
    }

    /// Properties of one device.
    pub fn device_properties(&self, device: &str) -> Vec<Arc<Property>> {
        self.properties
            .snapshot()
            .iter()
            .filter(|p| p.device == device)
            .cloned()
            .collect()
    }

    /// One row per element across all properties.
    pub fn property_list(&self) -> Vec<PropertyListItem> {
        self.properties
            .snapshot()
            .iter()
            .flat_map(|p| p.list_items().collect::<Vec<_>>())
            .collect()
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    /// Mutation counter across both collections.
    pub fn version(&self) -> u64 {
        self.devices.version() + self.properties.version()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_properties(&self) -> SnapshotStream<Property> {
        SnapshotStream::new(self.properties.subscribe())
    }

    pub fn subscribe_devices(&self) -> SnapshotStream<Device> {
        SnapshotStream::new(self.devices.subscribe())
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        // The guarded data is `()`, so a poisoned lock carries no broken state.
        self.write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Recompute a device record from its properties.
    fn refresh_device(&self, name: &str) {
        let props: Vec<Arc<Property>> = self.device_properties(name);
        if props.is_empty() {
            self.devices.remove(name);
            return;
        }
        let connection = props
            .iter()
            .find(|p| p.name == CONNECTION)
            .map_or(DeviceConnection::Disconnected, |p| {
                DeviceConnection::from_property(p)
            });
        let device = Device {
            name: name.to_owned(),
            connection,
            properties: props.len(),
        };
        if self.devices.get_by_key(name).as_deref() != Some(&device) {
            self.devices.upsert(name.to_owned(), device);
        }
    }
}
