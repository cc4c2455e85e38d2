//! INDIGO JSON wire types.
//!
//! Every frame is a single-key JSON object whose key names the message,
//! e.g. `{"defSwitchVector": {...}}`. Serde's external tagging maps that
//! shape directly onto [`ServerMessage`] and [`ClientMessage`].
//!
//! Inbound vectors are normalized through [`ServerMessage::into_event`] so
//! consumers deal with one item type ([`Item`]) instead of five.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::Error;

/// JSON protocol version announced in `getProperties`.
pub const PROTOCOL_VERSION: u32 = 512;

// ── Enumerations ─────────────────────────────────────────────────────

/// Property state as reported by the server.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum PropertyState {
    #[default]
    Idle,
    Ok,
    Busy,
    Alert,
}

/// Property access permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum PropertyPerm {
    #[serde(rename = "ro")]
    #[strum(serialize = "ro")]
    ReadOnly,
    #[serde(rename = "rw")]
    #[strum(serialize = "rw")]
    ReadWrite,
    #[serde(rename = "wo")]
    #[strum(serialize = "wo")]
    WriteOnly,
}

/// Switch vector exclusivity rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum SwitchRule {
    OneOfMany,
    AtMostOne,
    AnyOfMany,
}

/// Property type tag.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PropertyType {
    Text,
    Number,
    Switch,
    Light,
    Blob,
}

/// BLOB delivery policy requested with `enableBLOB`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum BlobMode {
    Never,
    Also,
    #[default]
    #[serde(rename = "URL")]
    #[strum(serialize = "URL")]
    Url,
}

// ── Typed vector items ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub value: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub value: PropertyState,
}

/// BLOB item. `value` is either a server-relative URL (`/blob/...`),
/// an absolute URL, or inline base64 data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

// ── Vectors ──────────────────────────────────────────────────────────

/// A property vector as carried by `def*Vector` and `set*Vector` frames.
///
/// Definition-only attributes (group, label, perm, rule) are absent on
/// `set*` frames; `state` is absent when the server leaves it unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyVector<I> {
    pub device: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perm: Option<PropertyPerm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PropertyState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<SwitchRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default = "Vec::new")]
    pub items: Vec<I>,
}

impl<I> PropertyVector<I> {
    /// Build a bare vector carrying only device, name, state, and items.
    pub fn new(
        device: impl Into<String>,
        name: impl Into<String>,
        state: PropertyState,
        items: Vec<I>,
    ) -> Self {
        Self {
            device: device.into(),
            name: name.into(),
            version: None,
            group: None,
            label: None,
            perm: None,
            state: Some(state),
            rule: None,
            message: None,
            items,
        }
    }

    fn map_items<J>(self, f: impl FnMut(I) -> J) -> PropertyVector<J> {
        PropertyVector {
            device: self.device,
            name: self.name,
            version: self.version,
            group: self.group,
            label: self.label,
            perm: self.perm,
            state: self.state,
            rule: self.rule,
            message: self.message,
            items: self.items.into_iter().map(f).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteProperty {
    pub device: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerNotice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub message: String,
}

// ── Server → client ──────────────────────────────────────────────────

/// A frame sent by the device server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    #[serde(rename = "defTextVector")]
    DefTextVector(PropertyVector<TextItem>),
    #[serde(rename = "defNumberVector")]
    DefNumberVector(PropertyVector<NumberItem>),
    #[serde(rename = "defSwitchVector")]
    DefSwitchVector(PropertyVector<SwitchItem>),
    #[serde(rename = "defLightVector")]
    DefLightVector(PropertyVector<LightItem>),
    #[serde(rename = "defBLOBVector")]
    DefBlobVector(PropertyVector<BlobItem>),

    #[serde(rename = "setTextVector")]
    SetTextVector(PropertyVector<TextItem>),
    #[serde(rename = "setNumberVector")]
    SetNumberVector(PropertyVector<NumberItem>),
    #[serde(rename = "setSwitchVector")]
    SetSwitchVector(PropertyVector<SwitchItem>),
    #[serde(rename = "setLightVector")]
    SetLightVector(PropertyVector<LightItem>),
    #[serde(rename = "setBLOBVector")]
    SetBlobVector(PropertyVector<BlobItem>),

    #[serde(rename = "deleteProperty")]
    DeleteProperty(DeleteProperty),
    #[serde(rename = "message")]
    Message(ServerNotice),
}

/// Typed value of a normalized item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ItemValue {
    Text(String),
    Number {
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
        step: Option<f64>,
        format: Option<String>,
    },
    Switch(bool),
    Light(PropertyState),
    Blob {
        format: Option<String>,
        size: Option<u64>,
        value: Option<String>,
    },
}

/// Type-erased vector item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub label: Option<String>,
    pub value: ItemValue,
}

/// Normalized view of an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorEvent {
    Define(PropertyType, PropertyVector<Item>),
    Update(PropertyType, PropertyVector<Item>),
    Delete { device: String, name: Option<String> },
    Notice { device: Option<String>, message: String },
}

impl From<TextItem> for Item {
    fn from(i: TextItem) -> Self {
        Self {
            name: i.name,
            label: i.label,
            value: ItemValue::Text(i.value),
        }
    }
}

impl From<NumberItem> for Item {
    fn from(i: NumberItem) -> Self {
        Self {
            name: i.name,
            label: i.label,
            value: ItemValue::Number {
                value: i.value,
                min: i.min,
                max: i.max,
                step: i.step,
                format: i.format,
            },
        }
    }
}

impl From<SwitchItem> for Item {
    fn from(i: SwitchItem) -> Self {
        Self {
            name: i.name,
            label: i.label,
            value: ItemValue::Switch(i.value),
        }
    }
}

impl From<LightItem> for Item {
    fn from(i: LightItem) -> Self {
        Self {
            name: i.name,
            label: i.label,
            value: ItemValue::Light(i.value),
        }
    }
}

impl From<BlobItem> for Item {
    fn from(i: BlobItem) -> Self {
        Self {
            name: i.name,
            label: i.label,
            value: ItemValue::Blob {
                format: i.format,
                size: i.size,
                value: i.value,
            },
        }
    }
}

impl ServerMessage {
    /// Parse a text frame.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: text.to_owned(),
        })
    }

    /// Device this frame concerns, if any.
    pub fn device(&self) -> Option<&str> {
        match self {
            Self::DefTextVector(v) | Self::SetTextVector(v) => Some(&v.device),
            Self::DefNumberVector(v) | Self::SetNumberVector(v) => Some(&v.device),
            Self::DefSwitchVector(v) | Self::SetSwitchVector(v) => Some(&v.device),
            Self::DefLightVector(v) | Self::SetLightVector(v) => Some(&v.device),
            Self::DefBlobVector(v) | Self::SetBlobVector(v) => Some(&v.device),
            Self::DeleteProperty(d) => Some(&d.device),
            Self::Message(m) => m.device.as_deref(),
        }
    }

    /// Collapse the ten vector variants into a single normalized shape.
    pub fn into_event(self) -> VectorEvent {
        match self {
            Self::DefTextVector(v) => VectorEvent::Define(PropertyType::Text, v.map_items(Item::from)),
            Self::DefNumberVector(v) => {
                VectorEvent::Define(PropertyType::Number, v.map_items(Item::from))
            }
            Self::DefSwitchVector(v) => {
                VectorEvent::Define(PropertyType::Switch, v.map_items(Item::from))
            }
            Self::DefLightVector(v) => {
                VectorEvent::Define(PropertyType::Light, v.map_items(Item::from))
            }
            Self::DefBlobVector(v) => VectorEvent::Define(PropertyType::Blob, v.map_items(Item::from)),
            Self::SetTextVector(v) => VectorEvent::Update(PropertyType::Text, v.map_items(Item::from)),
            Self::SetNumberVector(v) => {
                VectorEvent::Update(PropertyType::Number, v.map_items(Item::from))
            }
            Self::SetSwitchVector(v) => {
                VectorEvent::Update(PropertyType::Switch, v.map_items(Item::from))
            }
            Self::SetLightVector(v) => {
                VectorEvent::Update(PropertyType::Light, v.map_items(Item::from))
            }
            Self::SetBlobVector(v) => VectorEvent::Update(PropertyType::Blob, v.map_items(Item::from)),
            Self::DeleteProperty(d) => VectorEvent::Delete {
                device: d.device,
                name: d.name,
            },
            Self::Message(m) => VectorEvent::Notice {
                device: m.device,
                message: m.message,
            },
        }
    }
}

// ── Client → server ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetProperties {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem<V> {
    pub name: String,
    pub value: V,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVector<V> {
    pub device: String,
    pub name: String,
    pub items: Vec<NewItem<V>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnableBlob {
    pub device: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: BlobMode,
}

/// A frame sent by this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    #[serde(rename = "getProperties")]
    GetProperties(GetProperties),
    #[serde(rename = "newTextVector")]
    NewTextVector(NewVector<String>),
    #[serde(rename = "newNumberVector")]
    NewNumberVector(NewVector<f64>),
    #[serde(rename = "newSwitchVector")]
    NewSwitchVector(NewVector<bool>),
    #[serde(rename = "enableBLOB")]
    EnableBlob(EnableBlob),
}

impl ClientMessage {
    /// Enumerate every device and property on the server.
    pub fn get_properties(client: impl Into<String>) -> Self {
        Self::GetProperties(GetProperties {
            version: PROTOCOL_VERSION,
            client: Some(client.into()),
            device: None,
            name: None,
        })
    }

    pub fn enable_blob(device: impl Into<String>, mode: BlobMode) -> Self {
        Self::EnableBlob(EnableBlob {
            device: device.into(),
            name: None,
            value: mode,
        })
    }

    /// Device and property this frame addresses, if it is a `new*Vector`.
    pub fn target(&self) -> Option<(&str, &str)> {
        match self {
            Self::NewTextVector(v) => Some((&v.device, &v.name)),
            Self::NewNumberVector(v) => Some((&v.device, &v.name)),
            Self::NewSwitchVector(v) => Some((&v.device, &v.name)),
            Self::GetProperties(_) | Self::EnableBlob(_) => None,
        }
    }

    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: format!("{self:?}"),
        })
    }
}

/// Build a `newSwitchVector` frame.
pub fn new_switch(
    device: impl Into<String>,
    name: impl Into<String>,
    items: impl IntoIterator<Item = (String, bool)>,
) -> ClientMessage {
    ClientMessage::NewSwitchVector(new_vector(device, name, items))
}

/// Build a `newNumberVector` frame.
pub fn new_number(
    device: impl Into<String>,
    name: impl Into<String>,
    items: impl IntoIterator<Item = (String, f64)>,
) -> ClientMessage {
    ClientMessage::NewNumberVector(new_vector(device, name, items))
}

/// Build a `newTextVector` frame.
pub fn new_text(
    device: impl Into<String>,
    name: impl Into<String>,
    items: impl IntoIterator<Item = (String, String)>,
) -> ClientMessage {
    ClientMessage::NewTextVector(new_vector(device, name, items))
}

fn new_vector<V>(
    device: impl Into<String>,
    name: impl Into<String>,
    items: impl IntoIterator<Item = (String, V)>,
) -> NewVector<V> {
    NewVector {
        device: device.into(),
        name: name.into(),
        items: items
            .into_iter()
            .map(|(name, value)| NewItem { name, value })
            .collect(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_def_switch_vector() {
        let json = r#"{"defSwitchVector": {
            "version": 512,
            "device": "CCD Imager Simulator @ localhost",
            "name": "CONNECTION",
            "group": "Main",
            "label": "Connection status",
            "perm": "rw",
            "state": "Ok",
            "rule": "OneOfMany",
            "items": [
                {"name": "CONNECTED", "label": "Connected", "value": false},
                {"name": "DISCONNECTED", "label": "Disconnected", "value": true}
            ]
        }}"#;

        let msg = ServerMessage::from_json(json).unwrap();
        assert_eq!(msg.device(), Some("CCD Imager Simulator @ localhost"));

        let VectorEvent::Define(kind, vector) = msg.into_event() else {
            panic!("expected a definition");
        };
        assert_eq!(kind, PropertyType::Switch);
        assert_eq!(vector.name, "CONNECTION");
        assert_eq!(vector.perm, Some(PropertyPerm::ReadWrite));
        assert_eq!(vector.rule, Some(SwitchRule::OneOfMany));
        assert_eq!(vector.items.len(), 2);
        assert_eq!(vector.items[1].value, ItemValue::Switch(true));
    }

    #[test]
    fn parses_set_number_vector_without_state() {
        let json = r#"{"setNumberVector": {
            "device": "Mount Simulator @ localhost",
            "name": "MOUNT_EQUATORIAL_COORDINATES",
            "items": [{"name": "RA", "value": 6.5}, {"name": "DEC", "value": -12.25}]
        }}"#;

        let VectorEvent::Update(kind, vector) = ServerMessage::from_json(json).unwrap().into_event()
        else {
            panic!("expected an update");
        };
        assert_eq!(kind, PropertyType::Number);
        assert!(vector.state.is_none());
        assert!(matches!(
            vector.items[0].value,
            ItemValue::Number { value, .. } if (value - 6.5).abs() < f64::EPSILON
        ));
    }

    #[test]
    fn parses_blob_and_delete() {
        let blob = r#"{"setBLOBVector": {"device": "CCD", "name": "CCD_IMAGE", "state": "Ok",
            "items": [{"name": "IMAGE", "format": ".fits", "value": "/blob/0x10001.fits"}]}}"#;
        let VectorEvent::Update(PropertyType::Blob, v) =
            ServerMessage::from_json(blob).unwrap().into_event()
        else {
            panic!("expected a blob update");
        };
        assert_eq!(
            v.items[0].value,
            ItemValue::Blob {
                format: Some(".fits".into()),
                size: None,
                value: Some("/blob/0x10001.fits".into()),
            }
        );

        let delete = r#"{"deleteProperty": {"device": "CCD"}}"#;
        assert_eq!(
            ServerMessage::from_json(delete).unwrap().into_event(),
            VectorEvent::Delete {
                device: "CCD".into(),
                name: None
            }
        );
    }

    #[test]
    fn malformed_frame_keeps_body() {
        let err = ServerMessage::from_json("{\"bogus\": 1}").unwrap_err();
        match err {
            Error::Deserialization { body, .. } => assert_eq!(body, "{\"bogus\": 1}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn serializes_new_switch_vector() {
        let msg = new_switch(
            "CCD Imager Simulator @ localhost",
            "CONNECTION",
            [("CONNECTED".to_string(), true)],
        );
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"newSwitchVector": {
                "device": "CCD Imager Simulator @ localhost",
                "name": "CONNECTION",
                "items": [{"name": "CONNECTED", "value": true}]
            }})
        );
        assert_eq!(
            msg.target(),
            Some(("CCD Imager Simulator @ localhost", "CONNECTION"))
        );
    }

    #[test]
    fn serializes_get_properties() {
        let value: serde_json::Value =
            serde_json::from_str(&ClientMessage::get_properties("skyctl").to_json().unwrap())
                .unwrap();
        assert_eq!(
            value,
            serde_json::json!({"getProperties": {"version": 512, "client": "skyctl"}})
        );
    }

    #[test]
    fn property_type_names() {
        assert_eq!(PropertyType::Switch.to_string(), "SWITCH");
        assert_eq!("NUMBER".parse::<PropertyType>().unwrap(), PropertyType::Number);
        assert_eq!(PropertyState::Alert.to_string(), "Alert");
    }
}
