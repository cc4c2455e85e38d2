//! Clap derive structures for the `skyctl` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.
//! Only clap types are used here so `build.rs` can include this file.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// skyctl -- drive INDIGO cameras and telescope mounts
#[derive(Debug, Parser)]
#[command(
    name = "skyctl",
    version,
    about = "Control INDIGO cameras and mounts from the command line",
    long_about = "Connects to an INDIGO device server, mirrors its device properties\n\
        and runs imaging and pointing operations: exposures, park, GOTO, SYNC\n\
        and pointing-model fitting.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Server profile to use
    #[arg(long, short = 'p', env = "SKYCTL_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Device server host (overrides profile)
    #[arg(long, short = 'H', env = "SKYCTL_HOST", global = true)]
    pub host: Option<String>,

    /// Device server port (overrides profile)
    #[arg(long, env = "SKYCTL_PORT", global = true)]
    pub port: Option<u16>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SKYCTL_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Command timeout in seconds (overrides profile)
    #[arg(long, env = "SKYCTL_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Run against a built-in simulated CCD and mount
    #[arg(long, env = "SKYCTL_SIMULATE", global = true)]
    pub simulate: bool,

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List devices announced by the server
    #[command(alias = "dev", alias = "d")]
    Devices,

    /// List device properties, one row per element
    #[command(alias = "p")]
    Props(PropsArgs),

    /// Write property elements (`/Device/Property/Element=value`)
    Set(SetArgs),

    /// Connect or disconnect a device driver
    ConnectDevice(ConnectDeviceArgs),

    /// Camera operations
    Ccd(CcdArgs),

    /// Mount operations and pointing model
    #[command(alias = "m")]
    Mount(MountArgs),

    /// Stream property changes until interrupted
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Properties ───────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PropsArgs {
    /// Only this device
    #[arg(long, short = 'd')]
    pub device: Option<String>,

    /// Only this property name
    #[arg(long)]
    pub property: Option<String>,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Assignments, e.g. "/CCD Imager Simulator @ host/CCD_BIN/HORIZONTAL=2"
    #[arg(required = true)]
    pub assignments: Vec<String>,

    /// Value type; inferred from the property definition when omitted
    #[arg(long = "type", short = 't')]
    pub kind: Option<WriteKind>,

    /// Wait until every written property reports OK
    #[arg(long, short = 'w')]
    pub wait: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum WriteKind {
    Switch,
    Number,
    Text,
}

#[derive(Debug, Args)]
pub struct ConnectDeviceArgs {
    /// Device name as announced by the server
    pub device: String,

    /// Disconnect instead of connecting
    #[arg(long)]
    pub disconnect: bool,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only this device
    #[arg(long, short = 'd')]
    pub device: Option<String>,
}

// ── CCD ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CcdArgs {
    /// Camera device (overrides profile; auto-detected when unset)
    #[arg(long, short = 'd', global = true)]
    pub device: Option<String>,

    #[command(subcommand)]
    pub command: CcdCommand,
}

#[derive(Debug, Subcommand)]
pub enum CcdCommand {
    /// Take one or more exposures
    Expose(ExposeArgs),
}

#[derive(Debug, Args)]
pub struct ExposeArgs {
    /// Exposure time in seconds
    #[arg(long, short = 'e', default_value = "1")]
    pub exposure: f64,

    /// Binning, "2" or "2x1"
    #[arg(long, short = 'b', default_value = "1x1")]
    pub bin: String,

    /// Frame type
    #[arg(long, short = 'f', default_value = "light")]
    pub frame_type: FrameKind,

    /// Number of frames
    #[arg(long, short = 'n', default_value = "1")]
    pub count: u32,

    /// Seconds to wait before each exposure
    #[arg(long, default_value = "0")]
    pub delay: f64,

    /// Where frames are delivered
    #[arg(long, short = 'u', default_value = "client")]
    pub upload: UploadTarget,

    /// Server-side directory for server uploads (overrides profile)
    #[arg(long)]
    pub server_dir: Option<String>,

    /// Filename template (%f type, %b binning, %e exposure, %n index)
    #[arg(long)]
    pub template: Option<String>,

    /// Object name written to the OBJECT header
    #[arg(long)]
    pub object: Option<String>,

    /// Local directory for client frames
    #[arg(long, default_value = ".")]
    pub out: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FrameKind {
    Light,
    Bias,
    Dark,
    Flat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum UploadTarget {
    Client,
    Server,
    Both,
}

// ── Mount ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct MountArgs {
    /// Mount device (overrides profile; auto-detected when unset)
    #[arg(long, short = 'd', global = true)]
    pub device: Option<String>,

    #[command(subcommand)]
    pub command: MountCommand,
}

#[derive(Debug, Subcommand)]
pub enum MountCommand {
    /// Show LST, position, park state and pier side
    Status,

    /// Park the mount
    Park,

    /// Unpark the mount
    Unpark,

    /// Store the current position as the park position
    ParkDefault,

    /// Slew to a target
    Goto(TargetArgs),

    /// Tell the mount it is pointing at a target
    Sync(SyncArgs),

    /// Slew uncorrected, read back the position and log a sync point
    TestSync(TestSyncArgs),

    /// Move in a direction for a number of seconds
    Move(MoveArgs),

    /// Run test-syncs over a rectangular sky grid
    Grid(GridArgs),

    /// Fit a pointing model to a sync-point log
    FitModel(FitModelArgs),
}

#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Right ascension, hours (decimal or hh:mm:ss)
    #[arg(allow_hyphen_values = true)]
    pub ra: String,

    /// Declination, degrees (decimal or dd:mm:ss)
    #[arg(allow_hyphen_values = true)]
    pub dec: String,

    /// Pier side; derived from the hour angle when omitted
    #[arg(long)]
    pub pier: Option<Pier>,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Right ascension, hours (decimal or hh:mm:ss)
    #[arg(allow_hyphen_values = true)]
    pub ra: String,

    /// Declination, degrees (decimal or dd:mm:ss)
    #[arg(allow_hyphen_values = true)]
    pub dec: String,
}

#[derive(Debug, Args)]
pub struct TestSyncArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Sync-point log to append to
    #[arg(long, short = 'l')]
    pub log: PathBuf,
}

#[derive(Debug, Args)]
pub struct MoveArgs {
    pub direction: MoveDirection,

    /// How long to move
    #[arg(long, short = 's', default_value = "1")]
    pub seconds: f64,

    /// Slew rate (overrides profile)
    #[arg(long, short = 'r')]
    pub rate: Option<Rate>,
}

#[derive(Debug, Args)]
pub struct GridArgs {
    #[arg(long, default_value = "0.2")]
    pub ra_lower: f64,
    #[arg(long, default_value = "23.7")]
    pub ra_upper: f64,
    /// RA spacing in degrees
    #[arg(long, default_value = "10")]
    pub ra_step: f64,
    #[arg(long, default_value = "-10", allow_hyphen_values = true)]
    pub dec_lower: f64,
    #[arg(long, default_value = "80")]
    pub dec_upper: f64,
    /// Dec spacing in degrees
    #[arg(long, default_value = "20")]
    pub dec_step: f64,

    /// Save the collected sync points here
    #[arg(long, short = 'l')]
    pub log: Option<PathBuf>,

    /// Fit and write the pointing model after the grid
    #[arg(long)]
    pub fit: bool,
}

#[derive(Debug, Args)]
pub struct FitModelArgs {
    /// Sync-point log to fit
    #[arg(long, short = 'l')]
    pub log: PathBuf,

    /// Model file to write (overrides profile)
    #[arg(long, short = 'm')]
    pub model_file: Option<PathBuf>,

    /// Bitmask of enabled terms (overrides profile)
    #[arg(long)]
    pub model_config: Option<u32>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Pier {
    West,
    East,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MoveDirection {
    North,
    South,
    West,
    East,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Rate {
    Guide,
    Centering,
    Find,
    Max,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or update a profile
    Init(ConfigInitArgs),

    /// Show the current configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Set the default profile
    Use {
        /// Profile name
        name: String,
    },

    /// List profile names
    Profiles,
}

#[derive(Debug, Args)]
pub struct ConfigInitArgs {
    /// Profile name (defaults to --profile, then "default")
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub ccd_device: Option<String>,

    #[arg(long)]
    pub mount_device: Option<String>,

    /// Site latitude, degrees north
    #[arg(long, allow_hyphen_values = true)]
    pub latitude: Option<f64>,

    /// Site longitude, degrees east
    #[arg(long, allow_hyphen_values = true)]
    pub longitude: Option<f64>,

    /// Pointing model file
    #[arg(long)]
    pub model_file: Option<PathBuf>,

    /// Never prompt; take missing values from defaults
    #[arg(long)]
    pub non_interactive: bool,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
