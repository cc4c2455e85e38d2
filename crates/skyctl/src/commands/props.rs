//! Property listing handler.

use skyctl_core::PropertyListItem;
use tabled::Tabled;

use crate::cli::{GlobalOpts, PropsArgs};
use crate::error::CliError;
use crate::output;

use super::Context;

#[derive(Tabled)]
struct PropertyRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Property")]
    property: String,
    #[tabled(rename = "Element")]
    element: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn row(item: &PropertyListItem, color: bool) -> PropertyRow {
    PropertyRow {
        device: skyctl_core::model::short_name(&item.device).to_owned(),
        property: item.property.clone(),
        element: item.element.clone(),
        kind: item.kind.to_string(),
        state: output::paint_state(item.state, color),
        value: item.value.clone(),
    }
}

/// Rows matching the optional device and property filters, sorted by
/// device then property. Element order within a property is kept.
fn filter(items: Vec<PropertyListItem>, args: &PropsArgs) -> Vec<PropertyListItem> {
    let mut items: Vec<_> = items
        .into_iter()
        .filter(|i| args.device.as_ref().is_none_or(|d| &i.device == d))
        .filter(|i| args.property.as_ref().is_none_or(|p| &i.property == p))
        .collect();
    items.sort_by(|a, b| (&a.device, &a.property).cmp(&(&b.device, &b.property)));
    items
}

pub fn handle(ctx: &Context, args: &PropsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if let Some(ref device) = args.device {
        if !ctx.session.list_devices().contains(device) {
            return Err(CliError::NotFound {
                resource_type: "device".into(),
                identifier: device.clone(),
                list_command: "devices".into(),
            });
        }
    }

    let items = filter(ctx.session.property_list(), args);
    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &items,
        |i| row(i, color),
        |i| format!("{}={}", i.key, i.value),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use skyctl_core::{PropertyState, PropertyType};

    use super::*;

    fn item(device: &str, property: &str, element: &str) -> PropertyListItem {
        PropertyListItem {
            device: device.into(),
            property: property.into(),
            kind: PropertyType::Number,
            element: element.into(),
            state: PropertyState::Ok,
            key: format!("/{device}/{property}/{element}"),
            value: "1".into(),
        }
    }

    #[test]
    fn filters_and_orders_rows() {
        let items = vec![
            item("Mount", "MOUNT_PARK", "PARKED"),
            item("CCD", "CCD_EXPOSURE", "EXPOSURE"),
            item("Mount", "MOUNT_EQUATORIAL_COORDINATES", "RA"),
            item("Mount", "MOUNT_EQUATORIAL_COORDINATES", "DEC"),
        ];
        let args = PropsArgs {
            device: Some("Mount".into()),
            property: None,
        };
        let rows = filter(items.clone(), &args);
        let elements: Vec<_> = rows.iter().map(|r| r.element.as_str()).collect();
        assert_eq!(elements, ["RA", "DEC", "PARKED"]);

        let args = PropsArgs {
            device: None,
            property: Some("CCD_EXPOSURE".into()),
        };
        assert_eq!(filter(items, &args).len(), 1);
    }
}
