//! Device listing and driver connection handlers.

use std::sync::Arc;
use std::time::Duration;

use skyctl_core::Device;
use tabled::Tabled;

use crate::cli::{ConnectDeviceArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::{Context, util};

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Connection")]
    connection: String,
    #[tabled(rename = "Properties")]
    properties: usize,
}

impl From<&Arc<Device>> for DeviceRow {
    fn from(d: &Arc<Device>) -> Self {
        Self {
            name: d.short_name().to_owned(),
            host: d.host().unwrap_or("-").to_owned(),
            connection: d.connection.to_string(),
            properties: d.properties,
        }
    }
}

// ── Handlers ────────────────────────────────────────────────────────

pub fn handle(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let devices = ctx.session.devices();
    let out = output::render_list(
        &global.output,
        &devices,
        |d| DeviceRow::from(d),
        |d| d.name.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn handle_connect(
    ctx: &Context,
    args: &ConnectDeviceArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.disconnect {
        ctx.session.disconnect_device(&args.device).await?;
    } else {
        ctx.session.connect_device(&args.device).await?;
        util::settle(&ctx.session, ctx.timeout().min(Duration::from_secs(2))).await;
    }

    let device = ctx
        .session
        .devices()
        .iter()
        .find(|d| d.name == args.device)
        .cloned()
        .ok_or_else(|| CliError::NotFound {
            resource_type: "device".into(),
            identifier: args.device.clone(),
            list_command: "devices".into(),
        })?;
    let out = output::render_single(
        &global.output,
        &device,
        |d| format!("{}: {}", d.name, d.connection),
        |d| d.connection.to_string(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
