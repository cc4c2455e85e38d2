//! Raw property writes: `skyctl set /Device/Property/Element=value ...`.

use skyctl_core::{
    NewPropertyValue, PropertyId, PropertyKey, PropertyState, PropertyType, WriteType,
};
use tabled::Tabled;
use tracing::debug;

use crate::cli::{GlobalOpts, SetArgs, WriteKind};
use crate::error::CliError;
use crate::output;

use super::Context;

#[derive(Clone, Tabled, serde::Serialize)]
struct WrittenRow {
    #[tabled(rename = "Property")]
    property: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Split `key=value`. The key is everything before the first `=`.
fn parse_assignment(input: &str) -> Result<(PropertyKey, String), CliError> {
    let (key, value) = input.split_once('=').ok_or_else(|| {
        CliError::validation("assignment", format!("'{input}' is not KEY=VALUE"))
    })?;
    let key: PropertyKey = key
        .parse()
        .map_err(|e: skyctl_core::CoreError| CliError::validation("key", e.to_string()))?;
    Ok((key, value.to_owned()))
}

fn write_type(kind: WriteKind) -> WriteType {
    match kind {
        WriteKind::Switch => WriteType::Switch,
        WriteKind::Number => WriteType::Number,
        WriteKind::Text => WriteType::Text,
    }
}

fn infer_type(kind: PropertyType, id: &PropertyId) -> Result<WriteType, CliError> {
    match kind {
        PropertyType::Switch => Ok(WriteType::Switch),
        PropertyType::Number => Ok(WriteType::Number),
        PropertyType::Text => Ok(WriteType::Text),
        other => Err(CliError::validation(
            "type",
            format!("{id} is a {other} property and cannot be written"),
        )),
    }
}

pub async fn handle(ctx: &Context, args: &SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut values = Vec::with_capacity(args.assignments.len());
    let mut touched: Vec<(PropertyId, u64)> = Vec::new();

    for assignment in &args.assignments {
        let (key, value) = parse_assignment(assignment)?;
        let id = key.property_id();
        let current = ctx.session.snapshot(&id);
        let kind = match (args.kind, &current) {
            (Some(kind), _) => write_type(kind),
            (None, Some(prop)) => infer_type(prop.kind, &id)?,
            (None, None) => {
                return Err(CliError::NotFound {
                    resource_type: "property".into(),
                    identifier: id.to_string(),
                    list_command: "props".into(),
                });
            }
        };
        if !touched.iter().any(|(t, _)| *t == id) {
            touched.push((id, current.map_or(0, |p| p.revision)));
        }
        values.push(NewPropertyValue::new(key, kind, value));
    }

    let sent = ctx.session.send_new_properties(&values).await?;
    debug!(vectors = sent, "property values sent");

    if !args.wait {
        if !global.quiet {
            eprintln!("✓ Sent {sent} property update(s)");
        }
        return Ok(());
    }

    let mut rows = Vec::with_capacity(touched.len());
    for (id, before) in touched {
        let prop = ctx
            .session
            .wait_until(&id.to_string(), ctx.timeout(), |store| {
                let prop = store.property(&id)?;
                if prop.revision <= before {
                    return None;
                }
                match prop.state {
                    PropertyState::Ok => Some(Ok(prop)),
                    PropertyState::Alert => Some(Err(skyctl_core::CoreError::Rejected {
                        key: id.to_string(),
                        message: prop.message.clone().unwrap_or_else(|| "alert".into()),
                    })),
                    PropertyState::Idle | PropertyState::Busy => None,
                }
            })
            .await?;
        rows.push(WrittenRow {
            property: id.to_string(),
            state: prop.state.to_string(),
            message: prop.message.clone().unwrap_or_default(),
        });
    }

    let out = output::render_list(
        &global.output,
        &rows,
        WrittenRow::clone,
        |r| r.property.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn assignment_splits_at_first_equals() {
        let (key, value) =
            parse_assignment("/CCD Imager Simulator @ host/FITS_HEADER/COMMENT=a=b").unwrap();
        assert_eq!(key.device, "CCD Imager Simulator @ host");
        assert_eq!(key.property, "FITS_HEADER");
        assert_eq!(key.element, "COMMENT");
        assert_eq!(value, "a=b");
    }

    #[test]
    fn assignment_without_value_is_rejected() {
        assert!(matches!(
            parse_assignment("/Mount/MOUNT_PARK/PARKED"),
            Err(CliError::Validation { .. })
        ));
        assert!(matches!(
            parse_assignment("MOUNT_PARK=ON"),
            Err(CliError::Validation { .. })
        ));
    }

    #[test]
    fn read_only_kinds_are_not_inferred() {
        let id = PropertyId::new("Mount", "INFO");
        assert_eq!(infer_type(PropertyType::Number, &id).unwrap(), WriteType::Number);
        assert!(infer_type(PropertyType::Light, &id).is_err());
        assert!(infer_type(PropertyType::Blob, &id).is_err());
    }
}
