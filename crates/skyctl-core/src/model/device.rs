// ── Device domain type ──

use serde::{Deserialize, Serialize};
use skyctl_api::PropertyState;
use strum::Display;

use super::property::Property;

/// Name of the standard connection switch every driver defines.
pub const CONNECTION: &str = "CONNECTION";

/// Driver connection as reported by the `CONNECTION` switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceConnection {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl DeviceConnection {
    /// Derive from a `CONNECTION` property.
    pub fn from_property(prop: &Property) -> Self {
        let connected = prop.switch("CONNECTED").unwrap_or(false);
        match (prop.state, connected) {
            (PropertyState::Busy, _) => Self::Connecting,
            (PropertyState::Alert, _) => Self::Failed,
            (_, true) => Self::Connected,
            (_, false) => Self::Disconnected,
        }
    }
}

/// A device the server has announced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub connection: DeviceConnection,
    /// Number of properties currently defined.
    pub properties: usize,
}

impl Device {
    /// Driver name without the INDIGO `" @ host"` suffix.
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }

    /// Host part of the name, if the device is remote-qualified.
    pub fn host(&self) -> Option<&str> {
        self.name.rsplit_once(" @ ").map(|(_, host)| host.trim())
    }
}

/// Strip an INDIGO `" @ host"` suffix from a device name.
pub fn short_name(device: &str) -> &str {
    device
        .rsplit_once(" @ ")
        .map_or(device, |(name, _)| name.trim_end())
}
