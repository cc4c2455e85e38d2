//! Command dispatch: bridges CLI args -> core controllers -> output formatting.

pub mod ccd;
pub mod config_cmd;
pub mod devices;
pub mod mount;
pub mod props;
pub mod set;
pub mod util;
pub mod watch;

use std::time::Duration;

use skyctl_core::{Session, Simulator, SimulatorConfig, astro};
use tracing::{debug, info};

use crate::cli::{Command, GlobalOpts};
use crate::config::Resolved;
use crate::error::CliError;

/// How long enumeration may take before commands run anyway.
const ENUMERATION_LIMIT: Duration = Duration::from_secs(3);

/// A connected session plus the profile it was opened with.
pub struct Context {
    pub session: Session,
    pub resolved: Resolved,
    simulator: Option<Simulator>,
}

impl Context {
    /// Open the session: the built-in simulator with `--simulate`, else
    /// the server named by the profile. Returns once the initial property
    /// burst has settled.
    pub async fn connect(resolved: Resolved, global: &GlobalOpts) -> Result<Self, CliError> {
        let session = Session::new(resolved.session_config()?);
        debug!(profile = %resolved.name, url = %session.config().url, "opening session");

        let simulator = if global.simulate {
            let config = SimulatorConfig {
                lst: astro::lst_now(resolved.profile.longitude),
                latitude: resolved.profile.latitude,
                longitude: resolved.profile.longitude,
                ..SimulatorConfig::default()
            };
            info!("using built-in simulator");
            Some(Simulator::attach(&session, config).await?)
        } else {
            session.connect().await?;
            None
        };

        util::settle(&session, ENUMERATION_LIMIT).await;
        debug!(devices = session.list_devices().len(), "enumeration settled");

        Ok(Self {
            session,
            resolved,
            simulator,
        })
    }

    /// Command timeout from the resolved profile.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.resolved.timeout)
    }

    pub async fn close(self) {
        self.session.disconnect().await;
        if let Some(simulator) = self.simulator {
            simulator.shutdown().await;
        }
    }
}

/// Dispatch a server-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Devices => devices::handle(ctx, global),
        Command::Props(args) => props::handle(ctx, &args, global),
        Command::Set(args) => set::handle(ctx, &args, global).await,
        Command::ConnectDevice(args) => devices::handle_connect(ctx, &args, global).await,
        Command::Ccd(args) => ccd::handle(ctx, args, global).await,
        Command::Mount(args) => mount::handle(ctx, args, global).await,
        Command::Watch(args) => watch::handle(ctx, &args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
