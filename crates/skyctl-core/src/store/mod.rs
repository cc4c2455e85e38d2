// ── Reactive property store ──
//
// Concurrent entity storage with push-based change notification.

mod collection;
mod property_store;

pub use property_store::PropertyStore;
