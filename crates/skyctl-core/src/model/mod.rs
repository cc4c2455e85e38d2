// ── Domain model ──
//
// Types mirrored from the device server, independent of wire framing.

pub mod device;
pub mod key;
pub mod property;

pub use device::{CONNECTION, Device, DeviceConnection, short_name};
pub use key::{PropertyId, PropertyKey, WriteType};
pub use property::{Element, ElementValue, Property, PropertyListItem, parse_switch};
