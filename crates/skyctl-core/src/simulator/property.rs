// ── Simulated property vectors ──

use indexmap::IndexMap;
use skyctl_api::{
    BlobItem, LightItem, NumberItem, PropertyPerm, PropertyState, PropertyVector, ServerMessage,
    SwitchItem, SwitchRule, TextItem,
};

#[derive(Debug, Clone, PartialEq)]
pub(super) enum SimValue {
    Text(String),
    Number { value: f64, min: f64, max: f64, format: &'static str },
    Switch(bool),
    Light(PropertyState),
    Blob { format: Option<String>, value: Option<String> },
}

/// Server-side copy of one property.
#[derive(Debug, Clone)]
pub(super) struct SimProperty {
    pub device: String,
    pub name: String,
    pub group: &'static str,
    pub perm: PropertyPerm,
    pub rule: Option<SwitchRule>,
    pub state: PropertyState,
    pub message: Option<String>,
    pub items: IndexMap<String, SimValue>,
}

impl SimProperty {
    pub fn new(device: &str, name: &str, group: &'static str, perm: PropertyPerm) -> Self {
        Self {
            device: device.to_owned(),
            name: name.to_owned(),
            group,
            perm,
            rule: None,
            state: PropertyState::Idle,
            message: None,
            items: IndexMap::new(),
        }
    }

    pub fn rule(mut self, rule: SwitchRule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn state(mut self, state: PropertyState) -> Self {
        self.state = state;
        self
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.items.insert(name.to_owned(), SimValue::Text(value.to_owned()));
        self
    }

    pub fn number(mut self, name: &str, value: f64, min: f64, max: f64, format: &'static str) -> Self {
        self.items
            .insert(name.to_owned(), SimValue::Number { value, min, max, format });
        self
    }

    pub fn switch(mut self, name: &str, value: bool) -> Self {
        self.items.insert(name.to_owned(), SimValue::Switch(value));
        self
    }

    pub fn light(mut self, name: &str, value: PropertyState) -> Self {
        self.items.insert(name.to_owned(), SimValue::Light(value));
        self
    }

    pub fn blob(mut self, name: &str) -> Self {
        self.items.insert(
            name.to_owned(),
            SimValue::Blob { format: None, value: None },
        );
        self
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn get_number(&self, name: &str) -> Option<f64> {
        match self.items.get(name)? {
            SimValue::Number { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn get_switch(&self, name: &str) -> bool {
        matches!(self.items.get(name), Some(SimValue::Switch(true)))
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        match self.items.get(name)? {
            SimValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn first_on(&self) -> Option<&str> {
        self.items.iter().find_map(|(name, v)| match v {
            SimValue::Switch(true) => Some(name.as_str()),
            _ => None,
        })
    }

    // ── Mutation ────────────────────────────────────────────────────

    pub fn set_number(&mut self, name: &str, new: f64) {
        if let Some(SimValue::Number { value, .. }) = self.items.get_mut(name) {
            *value = new;
        }
    }

    pub fn set_text(&mut self, name: &str, new: &str) {
        if let Some(SimValue::Text(value)) = self.items.get_mut(name) {
            new.clone_into(value);
        }
    }

    /// Set a switch, honouring the vector's rule. Returns false for
    /// unknown elements.
    pub fn set_switch(&mut self, name: &str, on: bool) -> bool {
        if !self.items.contains_key(name) {
            return false;
        }
        let exclusive = matches!(self.rule, Some(SwitchRule::OneOfMany | SwitchRule::AtMostOne));
        if on && exclusive {
            for (item, value) in &mut self.items {
                if let SimValue::Switch(v) = value {
                    *v = item == name;
                }
            }
        } else if let Some(SimValue::Switch(v)) = self.items.get_mut(name) {
            *v = on;
        }
        true
    }

    pub fn set_blob(&mut self, name: &str, format: &str, data: String) {
        if let Some(SimValue::Blob { format: f, value }) = self.items.get_mut(name) {
            *f = Some(format.to_owned());
            *value = Some(data);
        }
    }

    // ── Wire frames ─────────────────────────────────────────────────

    pub fn definition(&self) -> ServerMessage {
        self.frame(true)
    }

    pub fn update(&self) -> ServerMessage {
        self.frame(false)
    }

    fn frame(&self, define: bool) -> ServerMessage {
        let kind = self.items.values().next().map_or(Kind::Text, Kind::of);
        match kind {
            Kind::Text => {
                let v = self.vector(define, |name, value| match value {
                    SimValue::Text(v) => Some(TextItem {
                        name: name.to_owned(),
                        label: None,
                        value: v.clone(),
                    }),
                    _ => None,
                });
                if define { ServerMessage::DefTextVector(v) } else { ServerMessage::SetTextVector(v) }
            }
            Kind::Number => {
                let v = self.vector(define, |name, value| match value {
                    SimValue::Number { value, min, max, format } => Some(NumberItem {
                        name: name.to_owned(),
                        label: None,
                        format: define.then(|| (*format).to_owned()),
                        min: define.then_some(*min),
                        max: define.then_some(*max),
                        step: None,
                        value: *value,
                        target: None,
                    }),
                    _ => None,
                });
                if define { ServerMessage::DefNumberVector(v) } else { ServerMessage::SetNumberVector(v) }
            }
            Kind::Switch => {
                let v = self.vector(define, |name, value| match value {
                    SimValue::Switch(v) => Some(SwitchItem {
                        name: name.to_owned(),
                        label: None,
                        value: *v,
                    }),
                    _ => None,
                });
                if define { ServerMessage::DefSwitchVector(v) } else { ServerMessage::SetSwitchVector(v) }
            }
            Kind::Light => {
                let v = self.vector(define, |name, value| match value {
                    SimValue::Light(v) => Some(LightItem {
                        name: name.to_owned(),
                        label: None,
                        value: *v,
                    }),
                    _ => None,
                });
                if define { ServerMessage::DefLightVector(v) } else { ServerMessage::SetLightVector(v) }
            }
            Kind::Blob => {
                let v = self.vector(define, |name, value| match value {
                    SimValue::Blob { format, value } => Some(BlobItem {
                        name: name.to_owned(),
                        label: None,
                        format: format.clone(),
                        size: None,
                        value: if define { None } else { value.clone() },
                    }),
                    _ => None,
                });
                if define { ServerMessage::DefBlobVector(v) } else { ServerMessage::SetBlobVector(v) }
            }
        }
    }

    fn vector<I>(&self, define: bool, item: impl Fn(&str, &SimValue) -> Option<I>) -> PropertyVector<I> {
        let mut v = PropertyVector::new(
            self.device.clone(),
            self.name.clone(),
            self.state,
            self.items.iter().filter_map(|(n, val)| item(n, val)).collect(),
        );
        v.message.clone_from(&self.message);
        if define {
            v.group = Some(self.group.to_owned());
            v.perm = Some(self.perm);
            v.rule = self.rule;
        }
        v
    }
}

#[derive(Clone, Copy)]
enum Kind {
    Text,
    Number,
    Switch,
    Light,
    Blob,
}

impl Kind {
    fn of(value: &SimValue) -> Self {
        match value {
            SimValue::Text(_) => Self::Text,
            SimValue::Number { .. } => Self::Number,
            SimValue::Switch(_) => Self::Switch,
            SimValue::Light(_) => Self::Light,
            SimValue::Blob { .. } => Self::Blob,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn one_of_many_switches_are_exclusive() {
        let mut p = SimProperty::new("Mount", "MOUNT_PARK", "Main", PropertyPerm::ReadWrite)
            .rule(SwitchRule::OneOfMany)
            .switch("PARKED", true)
            .switch("UNPARKED", false);
        assert!(p.set_switch("UNPARKED", true));
        assert!(!p.get_switch("PARKED"));
        assert_eq!(p.first_on(), Some("UNPARKED"));
        assert!(!p.set_switch("NOPE", true));
    }

    #[test]
    fn update_frames_omit_definition_attributes() {
        let p = SimProperty::new("CCD", "CCD_BIN", "Camera", PropertyPerm::ReadWrite)
            .number("HORIZONTAL", 1.0, 1.0, 64.0, "%g");
        match p.update() {
            ServerMessage::SetNumberVector(v) => {
                assert!(v.perm.is_none());
                assert_eq!(v.items[0].min, None);
            }
            other => panic!("unexpected {other:?}"),
        }
        match p.definition() {
            ServerMessage::DefNumberVector(v) => {
                assert_eq!(v.perm, Some(PropertyPerm::ReadWrite));
                assert_eq!(v.items[0].max, Some(64.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
