//! Profile resolution: config file + global flag overrides.
//!
//! The TOML types and loading live in `skyctl-config`; this module picks
//! the active profile and folds `--host`, `--port` and `--timeout` into it.

pub use skyctl_config::*;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// The profile a command runs with, after overrides.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub name: String,
    pub profile: Profile,
    /// Command timeout, seconds.
    pub timeout: u64,
}

impl Resolved {
    pub fn session_config(&self) -> Result<skyctl_core::SessionConfig, CliError> {
        Ok(profile_to_session_config(&self.profile, self.timeout)?)
    }
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Pick the active profile and apply flag overrides.
///
/// An explicitly requested profile must exist. Without `--profile` a
/// missing default profile falls back to a local server on the
/// standard port.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let cfg = load_config()?;
    resolve_from(&cfg, global)
}

pub fn resolve_from(cfg: &Config, global: &GlobalOpts) -> Result<Resolved, CliError> {
    let name = active_profile_name(global, cfg);
    let mut profile = match cfg.profiles.get(&name) {
        Some(profile) => profile.clone(),
        None if global.profile.is_some() => {
            let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
            available.sort();
            return Err(CliError::ProfileNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            });
        }
        None => Profile::default(),
    };

    if let Some(ref host) = global.host {
        profile.host.clone_from(host);
    }
    if let Some(port) = global.port {
        profile.port = port;
    }
    let timeout = global
        .timeout
        .or(profile.timeout)
        .unwrap_or(cfg.defaults.timeout);
    profile.timeout = Some(timeout);

    Ok(Resolved {
        name,
        profile,
        timeout,
    })
}
