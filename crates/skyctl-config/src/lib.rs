//! Shared configuration for skyctl.
//!
//! TOML profiles naming a device server, the devices to drive on it and
//! the observing site, plus their translation to `skyctl_core`
//! settings. The core never reads this file; the CLI resolves a
//! profile, applies its flag overrides and hands the result in.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use skyctl_api::transport::DEFAULT_PORT;
use skyctl_core::pointing::DEFAULT_MODEL_CONFIG;
use skyctl_core::{
    AlignmentMethod, CcdSettings, CoreError, ModelConfig, MountSettings, SessionConfig, SlewRate,
};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Command timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    60
}

/// A named device-server profile.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Profile {
    /// Server host name or address.
    pub host: String,
    pub port: u16,
    /// Client name announced to the server.
    pub client_name: String,
    pub ccd_device: Option<String>,
    pub mount_device: Option<String>,
    /// Site latitude, degrees north.
    pub latitude: f64,
    /// Site longitude, degrees east.
    pub longitude: f64,
    /// Pointing model file (`.xtpm`).
    pub model_file: Option<PathBuf>,
    /// Bitmask of enabled pointing-model terms.
    pub model_config: u32,
    pub alignment: AlignmentMethod,
    pub slew_rate: SlewRate,
    pub poll_interval_ms: u64,
    /// Override the default command timeout (seconds).
    pub timeout: Option<u64>,
    /// Server-side directory for SERVER uploads.
    pub upload_dir: Option<String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: DEFAULT_PORT,
            client_name: "skyctl".into(),
            ccd_device: None,
            mount_device: None,
            latitude: 0.0,
            longitude: 0.0,
            model_file: None,
            model_config: DEFAULT_MODEL_CONFIG,
            alignment: AlignmentMethod::None,
            slew_rate: SlewRate::default(),
            poll_interval_ms: 100,
            timeout: None,
            upload_dir: None,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "skyctl", "skyctl").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("skyctl");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. `SKYCTL_` variables override the file;
/// nested keys use a double underscore (`SKYCTL_DEFAULTS__OUTPUT`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SKYCTL_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation to core settings ────────────────────────────────────

fn core_err(field: &str) -> impl Fn(CoreError) -> ConfigError + '_ {
    move |e| ConfigError::Validation {
        field: field.into(),
        reason: e.to_string(),
    }
}

/// Build a `SessionConfig` from a profile. `default_timeout` (seconds)
/// applies when the profile sets none.
pub fn profile_to_session_config(
    profile: &Profile,
    default_timeout: u64,
) -> Result<SessionConfig, ConfigError> {
    if profile.host.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: "must not be empty".into(),
        });
    }
    if profile.poll_interval_ms == 0 {
        return Err(ConfigError::Validation {
            field: "poll_interval_ms".into(),
            reason: "must be at least 1".into(),
        });
    }
    let base = SessionConfig::for_host(&profile.host, profile.port).map_err(core_err("host"))?;
    Ok(SessionConfig {
        client_name: profile.client_name.clone(),
        timeout: Duration::from_secs(profile.timeout.unwrap_or(default_timeout)),
        poll_interval: Duration::from_millis(profile.poll_interval_ms),
        ..base
    })
}

/// Mount site and alignment settings from a profile.
pub fn profile_to_mount_settings(profile: &Profile) -> Result<MountSettings, ConfigError> {
    if !(-90.0..=90.0).contains(&profile.latitude) {
        return Err(ConfigError::Validation {
            field: "latitude".into(),
            reason: format!("{} is outside [-90, 90]", profile.latitude),
        });
    }
    Ok(MountSettings {
        latitude: profile.latitude,
        longitude: profile.longitude,
        model_file: profile.model_file.clone(),
        model_config: ModelConfig::new(profile.model_config).map_err(core_err("model_config"))?,
        alignment: profile.alignment,
        slew_rate: profile.slew_rate,
    })
}

pub fn profile_to_ccd_settings(profile: &Profile, default_timeout: u64) -> CcdSettings {
    CcdSettings {
        timeout: Duration::from_secs(profile.timeout.unwrap_or(default_timeout)),
    }
}
