// ── Property addressing ──
//
// PropertyId names a property vector on a device; PropertyKey narrows it
// to one element. Keys render as "/Device/Property/Element" and are
// parsed from the right, so device names may contain '/' (INDIGO device
// names routinely include "@ host" suffixes and sometimes paths).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CoreError;

// ── PropertyId ──────────────────────────────────────────────────────

/// A property vector on a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyId {
    pub device: String,
    pub property: String,
}

impl PropertyId {
    pub fn new(device: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            property: property.into(),
        }
    }

    /// The element key for `element` within this property.
    pub fn element(&self, element: impl Into<String>) -> PropertyKey {
        PropertyKey {
            device: self.device.clone(),
            property: self.property.clone(),
            element: element.into(),
        }
    }

    /// Storage key used by the property store.
    pub(crate) fn store_key(&self) -> String {
        store_key(&self.device, &self.property)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.device, self.property)
    }
}

pub(crate) fn store_key(device: &str, property: &str) -> String {
    format!("{device}\u{1f}{property}")
}

// ── PropertyKey ─────────────────────────────────────────────────────

/// A single element: `/Device/Property/Element`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyKey {
    pub device: String,
    pub property: String,
    pub element: String,
}

impl PropertyKey {
    pub fn new(
        device: impl Into<String>,
        property: impl Into<String>,
        element: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            property: property.into(),
            element: element.into(),
        }
    }

    pub fn property_id(&self) -> PropertyId {
        PropertyId::new(self.device.clone(), self.property.clone())
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}/{}", self.device, self.property, self.element)
    }
}

impl FromStr for PropertyKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::validation(format!("invalid property key '{s}', expected /Device/Property/Element"));

        let rest = s.strip_prefix('/').ok_or_else(invalid)?;
        let (rest, element) = rest.rsplit_once('/').ok_or_else(invalid)?;
        let (device, property) = rest.rsplit_once('/').ok_or_else(invalid)?;

        if device.is_empty() || property.is_empty() || element.is_empty() {
            return Err(invalid());
        }

        Ok(Self::new(device, property, element))
    }
}

// ── WriteType ───────────────────────────────────────────────────────

/// Element type of a client write. Names follow the INDI constants
/// used on the command line and in scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum WriteType {
    #[strum(to_string = "INDI_SWITCH", serialize = "switch")]
    #[serde(rename = "INDI_SWITCH")]
    Switch,
    #[strum(to_string = "INDI_NUMBER", serialize = "number")]
    #[serde(rename = "INDI_NUMBER")]
    Number,
    #[strum(to_string = "INDI_TEXT", serialize = "text")]
    #[serde(rename = "INDI_TEXT")]
    Text,
}
