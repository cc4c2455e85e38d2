//! Config subcommand handlers.

use std::io::IsTerminal;
use std::path::PathBuf;

use dialoguer::Input;

use crate::cli::{ConfigArgs, ConfigCommand, ConfigInitArgs, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn profile_not_found(cfg: &Config, name: String) -> CliError {
    let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
    available.sort();
    CliError::ProfileNotFound {
        name,
        available: if available.is_empty() {
            "(none)".into()
        } else {
            available.join(", ")
        },
    }
}

fn prompt_text(prompt: &str, current: Option<&str>) -> Result<Option<String>, CliError> {
    let value: String = Input::new()
        .with_prompt(prompt)
        .default(current.unwrap_or_default().to_owned())
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_err)?;
    Ok((!value.trim().is_empty()).then(|| value.trim().to_owned()))
}

fn prompt_number(prompt: &str, current: f64) -> Result<f64, CliError> {
    Input::new()
        .with_prompt(prompt)
        .default(current)
        .interact_text()
        .map_err(prompt_err)
}

/// Fill `profile` from flags, then prompt for whatever is still
/// interesting when interactive.
fn apply_init_args(
    profile: &mut Profile,
    args: &ConfigInitArgs,
    interactive: bool,
) -> Result<(), CliError> {
    if let Some(ref ccd) = args.ccd_device {
        profile.ccd_device = Some(ccd.clone());
    }
    if let Some(ref mount) = args.mount_device {
        profile.mount_device = Some(mount.clone());
    }
    if let Some(lat) = args.latitude {
        profile.latitude = lat;
    }
    if let Some(lon) = args.longitude {
        profile.longitude = lon;
    }
    if let Some(ref file) = args.model_file {
        profile.model_file = Some(file.clone());
    }

    if interactive {
        profile.host = prompt_text("Server host", Some(&profile.host))?
            .unwrap_or_else(|| profile.host.clone());
        profile.port = Input::new()
            .with_prompt("Server port")
            .default(profile.port)
            .interact_text()
            .map_err(prompt_err)?;
        if args.ccd_device.is_none() {
            profile.ccd_device =
                prompt_text("Camera device (empty = auto)", profile.ccd_device.as_deref())?;
        }
        if args.mount_device.is_none() {
            profile.mount_device =
                prompt_text("Mount device (empty = auto)", profile.mount_device.as_deref())?;
        }
        if args.latitude.is_none() {
            profile.latitude = prompt_number("Site latitude (deg N)", profile.latitude)?;
        }
        if args.longitude.is_none() {
            profile.longitude = prompt_number("Site longitude (deg E)", profile.longitude)?;
        }
        if args.model_file.is_none() {
            let current = profile.model_file.as_ref().map(|p| p.display().to_string());
            profile.model_file =
                prompt_text("Pointing model file (empty = none)", current.as_deref())?
                    .map(PathBuf::from);
        }
    }

    if !(-90.0..=90.0).contains(&profile.latitude) {
        return Err(CliError::validation(
            "latitude",
            format!("{} is outside [-90, 90]", profile.latitude),
        ));
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init(init) => {
            let path = config::config_path();
            let mut cfg = config::load_config_or_default();
            let name = init
                .name
                .clone()
                .or_else(|| global.profile.clone())
                .unwrap_or_else(|| "default".into());
            let interactive = !init.non_interactive && std::io::stdin().is_terminal();

            if interactive {
                eprintln!("skyctl configuration");
                eprintln!("   Config path: {}\n", path.display());
            }

            let mut profile = cfg.profiles.get(&name).cloned().unwrap_or_default();
            if let Some(ref host) = global.host {
                profile.host.clone_from(host);
            }
            if let Some(port) = global.port {
                profile.port = port;
            }
            apply_init_args(&mut profile, &init, interactive)?;

            cfg.profiles.insert(name.clone(), profile);
            if cfg.default_profile.is_none() {
                cfg.default_profile = Some(name.clone());
            }
            config::save_config(&cfg)?;

            if !global.quiet {
                eprintln!("✓ Profile '{name}' written to {}", path.display());
                eprintln!("  Test it: skyctl --profile {name} devices");
            }
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load_config()?;
            let out = output::render_single(
                &global.output,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_else(|e| format!("error: {e}")),
                |c| c.default_profile.clone().unwrap_or_else(|| "default".into()),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: skyctl config init");
            } else {
                let mut names: Vec<_> = cfg.profiles.keys().collect();
                names.sort();
                for name in names {
                    let marker = if name == default { " *" } else { "" };
                    println!("{name}{marker}");
                }
            }
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();
            if !cfg.profiles.contains_key(&name) {
                return Err(profile_not_found(&cfg, name));
            }
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Default profile set to '{name}'");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn init_args() -> ConfigInitArgs {
        ConfigInitArgs {
            name: None,
            ccd_device: Some("CCD Imager Simulator @ localhost".into()),
            mount_device: None,
            latitude: Some(49.26),
            longitude: Some(-16.5),
            model_file: Some("/tmp/model.xml".into()),
            non_interactive: true,
        }
    }

    #[test]
    fn init_flags_fill_profile() {
        let mut profile = Profile::default();
        apply_init_args(&mut profile, &init_args(), false).unwrap();
        assert_eq!(profile.ccd_device.as_deref(), Some("CCD Imager Simulator @ localhost"));
        assert_eq!(profile.mount_device, None);
        assert!((profile.longitude + 16.5).abs() < f64::EPSILON);
        assert_eq!(profile.model_file, Some(PathBuf::from("/tmp/model.xml")));
    }

    #[test]
    fn init_rejects_impossible_latitude() {
        let mut profile = Profile::default();
        let args = ConfigInitArgs {
            latitude: Some(123.0),
            ..init_args()
        };
        let err = apply_init_args(&mut profile, &args, false).unwrap_err();
        assert!(matches!(err, CliError::Validation { ref field, .. } if field == "latitude"));
    }
}
