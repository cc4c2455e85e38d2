//! Live property change stream.

use std::collections::HashMap;
use std::sync::Arc;

use skyctl_core::{Property, PropertyId};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::Context;

/// Properties whose revision moved since `seen`, in snapshot order.
/// `seen` is updated in place.
fn changed_since(
    snapshot: &[Arc<Property>],
    seen: &mut HashMap<PropertyId, u64>,
    device: Option<&str>,
) -> Vec<Arc<Property>> {
    snapshot
        .iter()
        .filter(|p| device.is_none_or(|d| p.device == d))
        .filter(|p| {
            let previous = seen.insert(p.id(), p.revision);
            previous != Some(p.revision)
        })
        .cloned()
        .collect()
}

fn line(prop: &Property, color: bool) -> String {
    let values = prop
        .elements
        .values()
        .map(|e| format!("{}={}", e.name, e.value.display_value()))
        .collect::<Vec<_>>()
        .join(" ");
    let mut text = format!(
        "{} {:<5} {}/{} {values}",
        prop.updated.format("%H:%M:%S%.3f"),
        output::paint_state(prop.state, color),
        skyctl_core::model::short_name(&prop.device),
        prop.name,
    );
    if let Some(ref message) = prop.message {
        text.push_str(&format!("  \"{message}\""));
    }
    text
}

fn render(prop: &Property, format: &OutputFormat, color: bool) -> String {
    match format {
        // One document per change keeps the stream line-oriented.
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
            output::render_single(&OutputFormat::JsonCompact, prop, |_| String::new(), |_| {
                String::new()
            })
        }
        OutputFormat::Plain => prop
            .elements
            .values()
            .map(|e| format!("{}={}", prop.key(&e.name), e.value.display_value()))
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Table => line(prop, color),
    }
}

pub async fn handle(ctx: &Context, args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if let Some(ref device) = args.device {
        if !ctx.session.list_devices().contains(device) {
            return Err(CliError::NotFound {
                resource_type: "device".into(),
                identifier: device.clone(),
                list_command: "devices".into(),
            });
        }
    }

    let color = output::should_color(&global.color);
    let mut stream = ctx.session.properties();
    let mut seen: HashMap<PropertyId, u64> = stream
        .current()
        .iter()
        .map(|p| (p.id(), p.revision))
        .collect();

    if !global.quiet {
        eprintln!("Watching property changes, Ctrl-C to stop");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            snapshot = stream.changed() => {
                let Some(snapshot) = snapshot else { break };
                for prop in changed_since(&snapshot, &mut seen, args.device.as_deref()) {
                    output::print_output(&render(&prop, &global.output, color), global.quiet);
                }
                if !ctx.session.is_connected() {
                    return Err(CliError::Disconnected);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use skyctl_core::{PropertyState, PropertyType};

    use super::*;

    fn prop(device: &str, name: &str, revision: u64) -> Arc<Property> {
        Arc::new(Property {
            device: device.into(),
            name: name.into(),
            kind: PropertyType::Number,
            group: None,
            label: None,
            perm: None,
            rule: None,
            state: PropertyState::Ok,
            message: None,
            elements: Default::default(),
            revision,
            updated: Default::default(),
        })
    }

    #[test]
    fn only_moved_revisions_are_reported() {
        let mut seen = HashMap::new();
        let first = vec![prop("Mount", "A", 1), prop("CCD", "B", 1)];
        assert_eq!(changed_since(&first, &mut seen, None).len(), 2);

        let second = vec![prop("Mount", "A", 2), prop("CCD", "B", 1)];
        let changed = changed_since(&second, &mut seen, None);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].name, "A");

        let third = vec![prop("Mount", "A", 3), prop("CCD", "B", 2)];
        let changed = changed_since(&third, &mut seen, Some("CCD"));
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].device, "CCD");
    }
}
