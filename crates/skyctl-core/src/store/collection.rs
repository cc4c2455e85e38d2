// ── Generic reactive entity collection ──
//
// Concurrent keyed storage with O(1) lookups and push-based
// change notification via `watch` channels.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

/// A concurrent, reactive collection for a single entity type.
///
/// Uses `DashMap` for O(1) concurrent lookups and `watch` channels
/// for push-based change notification. Every mutation bumps a version
/// counter and rebuilds the snapshot that subscribers receive.
/// Snapshots are ordered by key so listings are stable.
pub(crate) struct EntityCollection<T: Send + Sync + 'static> {
    by_key: DashMap<String, Arc<T>>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, rebuilt on mutation for efficient subscription.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            version,
            snapshot,
        }
    }

    /// Insert or replace an entity. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, key: String, entity: T) -> bool {
        let is_new = self.by_key.insert(key, Arc::new(entity)).is_none();
        self.rebuild_snapshot();
        self.bump_version();
        is_new
    }

    /// Remove an entity by key. Returns the removed entity if it existed.
    pub(crate) fn remove(&self, key: &str) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.rebuild_snapshot();
            self.bump_version();
        }
        removed
    }

    /// Remove every entity matching `pred`. Returns how many were removed.
    pub(crate) fn remove_where(&self, pred: impl Fn(&T) -> bool) -> usize {
        let before = self.by_key.len();
        self.by_key.retain(|_, v| !pred(v));
        let removed = before - self.by_key.len();
        if removed > 0 {
            self.rebuild_snapshot();
            self.bump_version();
        }
        removed
    }

    pub(crate) fn get_by_key(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Remove all entities.
    pub(crate) fn clear(&self) {
        self.by_key.clear();
        self.rebuild_snapshot();
        self.bump_version();
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Collect all values into a key-ordered snapshot and broadcast it.
    fn rebuild_snapshot(&self) {
        let mut entries: Vec<(String, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let values: Vec<Arc<T>> = entries.into_iter().map(|(_, v)| v).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn upsert_reports_new_keys() {
        let col: EntityCollection<String> = EntityCollection::new();
        assert!(col.upsert("key1".into(), "hello".into()));
        assert!(!col.upsert("key1".into(), "world".into()));
        assert_eq!(*col.get_by_key("key1").unwrap(), "world");
        assert_eq!(col.version(), 2);
    }

    #[test]
    fn remove_and_remove_where() {
        let col: EntityCollection<String> = EntityCollection::new();
        col.upsert("a".into(), "ccd:exposure".into());
        col.upsert("b".into(), "ccd:bin".into());
        col.upsert("c".into(), "mount:park".into());

        assert_eq!(*col.remove("a").unwrap(), "ccd:exposure");
        assert!(col.remove("a").is_none());
        assert_eq!(col.remove_where(|v| v.starts_with("ccd:")), 1);
        assert_eq!(col.len(), 1);
        assert_eq!(col.remove_where(|v| v.starts_with("ccd:")), 0);
    }

    #[test]
    fn snapshot_is_key_ordered() {
        let col: EntityCollection<String> = EntityCollection::new();
        col.upsert("b".into(), "y".into());
        col.upsert("a".into(), "x".into());

        let snap = col.snapshot();
        let values: Vec<&str> = snap.iter().map(|s| s.as_str()).collect();
        assert_eq!(values, vec!["x", "y"]);
    }

    #[test]
    fn clear_empties_everything() {
        let col: EntityCollection<String> = EntityCollection::new();
        col.upsert("a".into(), "x".into());
        col.clear();
        assert!(col.is_empty());
        assert!(col.snapshot().is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_mutations() {
        let col: EntityCollection<String> = EntityCollection::new();
        let mut rx = col.subscribe();
        col.upsert("a".into(), "x".into());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
    }
}
