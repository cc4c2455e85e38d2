// ── Command API ──
//
// Every device write flows through a `Command`: the property to write,
// the element values, and the condition that marks it complete. The
// session's command processor runs one command at a time.

mod clock;
pub(crate) mod dispatch;

use std::time::Duration;

use skyctl_api::protocol::{new_number, new_switch, new_text};
use skyctl_api::{ClientMessage, PropertyState};

use crate::error::CoreError;
use crate::model::{Property, PropertyId, WriteType, parse_switch};

pub use clock::{Clock, ElapsedTimer, TokioClock};

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<std::sync::Arc<Property>, CoreError>>,
}

// ── Expectation ─────────────────────────────────────────────────────

/// Terminal condition for a command.
#[derive(Debug, Clone, PartialEq)]
pub struct Expectation {
    /// States that count as done. ALERT always rejects unless listed.
    pub states: Vec<PropertyState>,
    /// Element values that must hold once a terminal state is reached.
    pub values: Vec<(String, String)>,
    /// Only count a terminal state reported after the server has sent
    /// Busy for this write.
    pub busy_first: bool,
}

impl Default for Expectation {
    fn default() -> Self {
        Self {
            states: vec![PropertyState::Ok],
            values: Vec::new(),
            busy_first: false,
        }
    }
}

/// Result of checking one property snapshot against an expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Progress {
    Pending,
    Done,
    Rejected(String),
}

impl Expectation {
    pub(crate) fn evaluate(&self, prop: &Property) -> Progress {
        if prop.state == PropertyState::Alert && !self.states.contains(&PropertyState::Alert) {
            return Progress::Rejected(
                prop.message
                    .clone()
                    .unwrap_or_else(|| "property state is Alert".into()),
            );
        }
        if !self.states.contains(&prop.state) {
            return Progress::Pending;
        }
        let values_hold = self.values.iter().all(|(element, expected)| {
            prop.element(element)
                .is_some_and(|e| e.value.matches(expected))
        });
        if values_hold {
            Progress::Done
        } else {
            Progress::Pending
        }
    }
}

// ── Command ─────────────────────────────────────────────────────────

/// A property write plus the condition that completes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub id: PropertyId,
    pub kind: WriteType,
    pub values: Vec<(String, String)>,
    pub expect: Expectation,
    /// Overrides the session's default timeout.
    pub timeout: Option<Duration>,
}

impl Command {
    /// Generic write from client-supplied strings. Switch writes also
    /// expect the written values to be echoed back.
    pub fn new(id: PropertyId, kind: WriteType, values: Vec<(String, String)>) -> Self {
        let expect = Expectation {
            values: if kind == WriteType::Switch {
                values.clone()
            } else {
                Vec::new()
            },
            ..Expectation::default()
        };
        Self {
            id,
            kind,
            values,
            expect,
            timeout: None,
        }
    }

    /// Turn the named switch elements ON.
    pub fn switch_on(id: PropertyId, elements: &[&str]) -> Self {
        Self::new(
            id,
            WriteType::Switch,
            elements
                .iter()
                .map(|e| ((*e).to_owned(), "ON".to_owned()))
                .collect(),
        )
    }

    /// Write explicit switch values.
    pub fn switches(id: PropertyId, values: &[(&str, bool)]) -> Self {
        Self::new(
            id,
            WriteType::Switch,
            values
                .iter()
                .map(|(e, v)| ((*e).to_owned(), if *v { "ON" } else { "OFF" }.to_owned()))
                .collect(),
        )
    }

    pub fn number(id: PropertyId, values: &[(&str, f64)]) -> Self {
        Self::new(
            id,
            WriteType::Number,
            values
                .iter()
                .map(|(e, v)| ((*e).to_owned(), v.to_string()))
                .collect(),
        )
    }

    pub fn text(id: PropertyId, values: &[(&str, &str)]) -> Self {
        Self::new(
            id,
            WriteType::Text,
            values
                .iter()
                .map(|(e, v)| ((*e).to_owned(), (*v).to_owned()))
                .collect(),
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replace the accepted terminal states.
    pub fn accept_states(mut self, states: &[PropertyState]) -> Self {
        self.expect.states = states.to_vec();
        self
    }

    /// Complete only after the server has reported Busy for this write,
    /// so a periodic Ok update already in flight cannot end the wait.
    /// For writes that always start a timed operation (slews, exposures).
    pub fn after_busy(mut self) -> Self {
        self.expect.busy_first = true;
        self
    }

    /// Additionally require `element` to read `value` on completion.
    pub fn expect_value(mut self, element: &str, value: &str) -> Self {
        self.expect.values.push((element.to_owned(), value.to_owned()));
        self
    }

    /// Build the wire frame, validating values against the write type.
    pub fn to_message(&self) -> Result<ClientMessage, CoreError> {
        let device = self.id.device.clone();
        let name = self.id.property.clone();
        match self.kind {
            WriteType::Switch => {
                let items = self
                    .values
                    .iter()
                    .map(|(e, v)| {
                        parse_switch(v).map(|b| (e.clone(), b)).ok_or_else(|| {
                            CoreError::validation(format!(
                                "switch value for {} must be ON or OFF, got '{v}'",
                                self.id.element(e.clone())
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(new_switch(device, name, items))
            }
            WriteType::Number => {
                let items = self
                    .values
                    .iter()
                    .map(|(e, v)| {
                        v.trim().parse::<f64>().map(|n| (e.clone(), n)).map_err(|_| {
                            CoreError::validation(format!(
                                "number value for {} is not numeric: '{v}'",
                                self.id.element(e.clone())
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(new_number(device, name, items))
            }
            WriteType::Text => Ok(new_text(device, name, self.values.iter().cloned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use skyctl_api::ServerMessage;
    use skyctl_api::protocol::VectorEvent;

    fn park_property(state: &str, parked: bool) -> Property {
        let json = format!(
            r#"{{"defSwitchVector": {{"device": "Mount", "name": "MOUNT_PARK", "state": "{state}",
                "message": "mount is slewing",
                "items": [{{"name": "PARKED", "value": {parked}}}, {{"name": "UNPARKED", "value": {}}}]}}}}"#,
            !parked
        );
        let VectorEvent::Define(kind, v) = ServerMessage::from_json(&json).unwrap().into_event() else {
            panic!("expected definition");
        };
        Property::from_definition(kind, v, 1)
    }

    #[test]
    fn switch_command_expects_echo() {
        let cmd = Command::switch_on(PropertyId::new("Mount", "MOUNT_PARK"), &["PARKED"]);
        assert_eq!(cmd.expect.values, vec![("PARKED".into(), "ON".into())]);

        assert_eq!(cmd.expect.evaluate(&park_property("Busy", true)), Progress::Pending);
        assert_eq!(cmd.expect.evaluate(&park_property("Ok", false)), Progress::Pending);
        assert_eq!(cmd.expect.evaluate(&park_property("Ok", true)), Progress::Done);
        assert_eq!(
            cmd.expect.evaluate(&park_property("Alert", false)),
            Progress::Rejected("mount is slewing".into())
        );
    }

    #[test]
    fn accepting_busy_completes_early() {
        let cmd = Command::switch_on(PropertyId::new("Mount", "MOUNT_PARK"), &["PARKED"])
            .accept_states(&[PropertyState::Ok, PropertyState::Busy]);
        assert_eq!(cmd.expect.evaluate(&park_property("Busy", true)), Progress::Done);
    }

    #[test]
    fn to_message_validates_values() {
        let id = PropertyId::new("CCD", "CCD_EXPOSURE");
        let bad = Command::new(id.clone(), WriteType::Number, vec![("EXPOSURE".into(), "soon".into())]);
        assert!(matches!(bad.to_message(), Err(CoreError::ValidationFailed { .. })));

        let good = Command::number(id, &[("EXPOSURE", 1.5)]);
        assert_eq!(good.to_message().unwrap().target(), Some(("CCD", "CCD_EXPOSURE")));

        let bad_switch = Command::new(
            PropertyId::new("CCD", "CONNECTION"),
            WriteType::Switch,
            vec![("CONNECTED".into(), "maybe".into())],
        );
        assert!(bad_switch.to_message().is_err());
    }
}
