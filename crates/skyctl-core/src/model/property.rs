// ── Property domain type ──
//
// A property is one vector as mirrored from the server: its definition
// attributes, current state, and ordered elements. Values are replaced
// wholesale on every update so readers always see a consistent vector.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use skyctl_api::{Item, ItemValue, PropertyPerm, PropertyState, PropertyType, PropertyVector, SwitchRule};

use super::key::{PropertyId, PropertyKey};

/// Typed element value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElementValue {
    Text {
        value: String,
    },
    Number {
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
        step: Option<f64>,
        format: Option<String>,
    },
    Switch {
        value: bool,
    },
    Light {
        value: PropertyState,
    },
    Blob {
        format: Option<String>,
        size: Option<u64>,
        value: Option<String>,
    },
}

impl ElementValue {
    /// Human-readable rendering used by listings and value comparison.
    pub fn display_value(&self) -> String {
        match self {
            Self::Text { value } => value.clone(),
            Self::Number { value, .. } => format_number(*value),
            Self::Switch { value } => if *value { "ON" } else { "OFF" }.to_owned(),
            Self::Light { value } => value.to_string(),
            Self::Blob { format, size, value } => match (value, size) {
                (Some(v), _) if v.starts_with('/') || v.starts_with("http") => v.clone(),
                (Some(_), Some(size)) => format!("<{} bytes {}>", size, format.as_deref().unwrap_or("")),
                (Some(v), None) => format!("<{} chars {}>", v.len(), format.as_deref().unwrap_or("")),
                (None, _) => String::new(),
            },
        }
    }

    /// Whether this value equals `expected` as written by a client.
    ///
    /// Switches accept ON/OFF (any case) or true/false; numbers compare
    /// numerically with a small tolerance; everything else compares text.
    pub fn matches(&self, expected: &str) -> bool {
        match self {
            Self::Switch { value } => parse_switch(expected) == Some(*value),
            Self::Number { value, .. } => expected
                .trim()
                .parse::<f64>()
                .is_ok_and(|e| (e - value).abs() <= 1e-9_f64.max(e.abs() * 1e-9)),
            _ => self.display_value() == expected,
        }
    }
}

impl From<ItemValue> for ElementValue {
    fn from(v: ItemValue) -> Self {
        match v {
            ItemValue::Text(value) => Self::Text { value },
            ItemValue::Number {
                value,
                min,
                max,
                step,
                format,
            } => Self::Number {
                value,
                min,
                max,
                step,
                format,
            },
            ItemValue::Switch(value) => Self::Switch { value },
            ItemValue::Light(value) => Self::Light { value },
            ItemValue::Blob {
                format,
                size,
                value,
            } => Self::Blob {
                format,
                size,
                value,
            },
        }
    }
}

/// Parse a client-supplied switch value.
pub fn parse_switch(s: &str) -> Option<bool> {
    match s.trim().to_ascii_uppercase().as_str() {
        "ON" | "TRUE" | "1" => Some(true),
        "OFF" | "FALSE" | "0" => Some(false),
        _ => None,
    }
}

fn format_number(v: f64) -> String {
    // Shortest representation that round-trips; integers print without ".0".
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v}")
    }
}

/// One element of a property vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    pub label: Option<String>,
    pub value: ElementValue,
}

impl From<Item> for Element {
    fn from(item: Item) -> Self {
        Self {
            name: item.name,
            label: item.label,
            value: item.value.into(),
        }
    }
}

/// A property vector mirrored from the device server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub device: String,
    pub name: String,
    pub kind: PropertyType,
    pub group: Option<String>,
    pub label: Option<String>,
    pub perm: Option<PropertyPerm>,
    pub rule: Option<SwitchRule>,
    pub state: PropertyState,
    pub message: Option<String>,
    pub elements: IndexMap<String, Element>,
    /// Store-wide sequence number of the message that last touched this property.
    pub revision: u64,
    pub updated: DateTime<Utc>,
}

impl Property {
    /// Build from a `def*Vector`.
    pub(crate) fn from_definition(kind: PropertyType, vector: PropertyVector<Item>, revision: u64) -> Self {
        Self {
            device: vector.device,
            name: vector.name,
            kind,
            group: vector.group,
            label: vector.label,
            perm: vector.perm,
            rule: vector.rule,
            state: vector.state.unwrap_or_default(),
            message: vector.message,
            elements: vector
                .items
                .into_iter()
                .map(|item| (item.name.clone(), Element::from(item)))
                .collect(),
            revision,
            updated: Utc::now(),
        }
    }

    /// Merge a `set*Vector` into a copy of this property.
    ///
    /// Elements not mentioned in the update keep their values; elements the
    /// definition did not declare are appended. Definition-only attributes
    /// are kept unless the update carries them.
    pub(crate) fn merged(&self, vector: PropertyVector<Item>, revision: u64) -> Self {
        let mut next = self.clone();
        if let Some(state) = vector.state {
            next.state = state;
        }
        if vector.message.is_some() {
            next.message = vector.message;
        }
        for item in vector.items {
            let element = Element::from(item);
            match next.elements.get_mut(&element.name) {
                Some(existing) => {
                    existing.value = merge_value(&existing.value, element.value);
                    if element.label.is_some() {
                        existing.label = element.label;
                    }
                }
                None => {
                    next.elements.insert(element.name.clone(), element);
                }
            }
        }
        next.revision = revision;
        next.updated = Utc::now();
        next
    }

    pub fn id(&self) -> PropertyId {
        PropertyId::new(self.device.clone(), self.name.clone())
    }

    pub fn key(&self, element: &str) -> PropertyKey {
        PropertyKey::new(self.device.clone(), self.name.clone(), element)
    }

    pub fn element(&self, name: &str) -> Option<&Element> {
        self.elements.get(name)
    }

    pub fn switch(&self, name: &str) -> Option<bool> {
        match self.element(name)?.value {
            ElementValue::Switch { value } => Some(value),
            _ => None,
        }
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.element(name)?.value {
            ElementValue::Number { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match &self.element(name)?.value {
            ElementValue::Text { value } => Some(value),
            _ => None,
        }
    }

    /// Value of a BLOB element: a URL, a server path, or inline base64.
    pub fn blob(&self, name: &str) -> Option<(&str, Option<&str>)> {
        match &self.element(name)?.value {
            ElementValue::Blob { value, format, .. } => {
                value.as_deref().map(|v| (v, format.as_deref()))
            }
            _ => None,
        }
    }

    /// Names of switch elements currently ON.
    pub fn switches_on(&self) -> impl Iterator<Item = &str> {
        self.elements.values().filter_map(|e| match e.value {
            ElementValue::Switch { value: true } => Some(e.name.as_str()),
            _ => None,
        })
    }
}

/// Updates only carry values; limits and format from the definition stay.
fn merge_value(existing: &ElementValue, update: ElementValue) -> ElementValue {
    match (existing, update) {
        (
            ElementValue::Number {
                min, max, step, format, ..
            },
            ElementValue::Number {
                value,
                min: new_min,
                max: new_max,
                step: new_step,
                format: new_format,
            },
        ) => ElementValue::Number {
            value,
            min: new_min.or(*min),
            max: new_max.or(*max),
            step: new_step.or(*step),
            format: new_format.or_else(|| format.clone()),
        },
        (_, update) => update,
    }
}

// ── Listing rows ────────────────────────────────────────────────────

/// Flattened, display-ready row for one element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyListItem {
    pub device: String,
    pub property: String,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    pub element: String,
    pub state: PropertyState,
    pub key: String,
    pub value: String,
}

impl Property {
    /// One row per element, in definition order.
    pub fn list_items(&self) -> impl Iterator<Item = PropertyListItem> + '_ {
        self.elements.values().map(move |e| PropertyListItem {
            device: self.device.clone(),
            property: self.name.clone(),
            kind: self.kind,
            element: e.name.clone(),
            state: self.state,
            key: self.key(&e.name).to_string(),
            value: e.value.display_value(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use skyctl_api::ServerMessage;
    use skyctl_api::protocol::VectorEvent;

    fn event(json: &str) -> (PropertyType, PropertyVector<Item>) {
        match ServerMessage::from_json(json).unwrap().into_event() {
            VectorEvent::Define(kind, v) | VectorEvent::Update(kind, v) => (kind, v),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn update_merges_values_and_keeps_limits() {
        let (kind, def) = event(
            r#"{"defNumberVector": {"device": "CCD", "name": "CCD_EXPOSURE", "group": "Camera",
                "perm": "rw", "state": "Idle",
                "items": [{"name": "EXPOSURE", "min": 0, "max": 3600, "step": 1, "format": "%g", "value": 0}]}}"#,
        );
        let prop = Property::from_definition(kind, def, 1);
        assert_eq!(prop.state, PropertyState::Idle);

        let (_, set) = event(
            r#"{"setNumberVector": {"device": "CCD", "name": "CCD_EXPOSURE", "state": "Busy",
                "items": [{"name": "EXPOSURE", "value": 2.5}]}}"#,
        );
        let next = prop.merged(set, 2);
        assert_eq!(next.state, PropertyState::Busy);
        assert_eq!(next.revision, 2);
        assert_eq!(next.group.as_deref(), Some("Camera"));
        assert_eq!(
            next.element("EXPOSURE").unwrap().value,
            ElementValue::Number {
                value: 2.5,
                min: Some(0.0),
                max: Some(3600.0),
                step: Some(1.0),
                format: Some("%g".into()),
            }
        );
        // The previous snapshot is untouched.
        assert_eq!(prop.number("EXPOSURE"), Some(0.0));
    }

    #[test]
    fn update_without_state_keeps_previous_state() {
        let (kind, def) = event(
            r#"{"defSwitchVector": {"device": "Mount", "name": "MOUNT_PARK", "state": "Ok", "rule": "OneOfMany",
                "items": [{"name": "PARKED", "value": true}, {"name": "UNPARKED", "value": false}]}}"#,
        );
        let prop = Property::from_definition(kind, def, 1);
        let (_, set) = event(
            r#"{"setSwitchVector": {"device": "Mount", "name": "MOUNT_PARK",
                "items": [{"name": "PARKED", "value": false}, {"name": "UNPARKED", "value": true}]}}"#,
        );
        let next = prop.merged(set, 2);
        assert_eq!(next.state, PropertyState::Ok);
        assert_eq!(next.switches_on().collect::<Vec<_>>(), vec!["UNPARKED"]);
    }

    #[test]
    fn value_matching() {
        assert!(ElementValue::Switch { value: true }.matches("on"));
        assert!(ElementValue::Switch { value: false }.matches("OFF"));
        assert!(!ElementValue::Switch { value: false }.matches("bogus"));
        let n = ElementValue::Number {
            value: 1.0,
            min: None,
            max: None,
            step: None,
            format: None,
        };
        assert!(n.matches("1"));
        assert!(n.matches("1.000"));
        assert!(!n.matches("1.1"));
        assert_eq!(n.display_value(), "1");
        assert!(ElementValue::Text { value: "/tmp".into() }.matches("/tmp"));
    }

    #[test]
    fn list_items_follow_definition_order() {
        let (kind, def) = event(
            r#"{"defNumberVector": {"device": "Mount", "name": "MOUNT_EQUATORIAL_COORDINATES", "state": "Ok",
                "items": [{"name": "RA", "value": 6.5}, {"name": "DEC", "value": -12.25}]}}"#,
        );
        let rows: Vec<_> = Property::from_definition(kind, def, 1).list_items().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, "/Mount/MOUNT_EQUATORIAL_COORDINATES/RA");
        assert_eq!(rows[0].value, "6.5");
        assert_eq!(rows[1].value, "-12.25");
        assert_eq!(rows[1].kind, PropertyType::Number);
    }
}
