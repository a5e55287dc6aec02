//! Clap derive structures for the `orrery` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// orrery -- talk to ASCOM Alpaca devices from the command line
#[derive(Debug, Parser)]
#[command(
    name = "orrery",
    version,
    about = "Discover and drive ASCOM Alpaca telescopes, cameras, and focusers",
    long_about = "Find Alpaca devices on the local network, remember them across runs,\n\
        and send validated commands to telescopes (including Seestar smart\n\
        telescopes), cameras, and focusers.\n\n\
        Devices are named by id (telescope_1), by a stored name, or directly\n\
        with a connection string such as seestar@192.168.1.50:5555.",
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
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "ORRERY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "ORRERY_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip the UDP broadcast during discovery
    #[arg(long, global = true)]
    pub no_udp: bool,

    /// Command timeout in seconds (overrides config)
    #[arg(long, global = true)]
    pub timeout: Option<f64>,
}

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

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Find Alpaca devices on the local network
    #[command(alias = "scan")]
    Discover(DiscoverArgs),

    /// Show which device an identifier resolves to, without connecting
    Resolve(ResolveArgs),

    /// Known devices and the device store
    #[command(alias = "dev")]
    Devices(DevicesArgs),

    /// Connect to a device and print its status and capabilities
    Status(StatusArgs),

    /// Telescope operations
    #[command(alias = "scope")]
    Telescope(TelescopeArgs),

    /// Camera operations
    #[command(alias = "cam")]
    Camera(CameraArgs),

    /// Check method parameters locally, without touching any device
    Validate(ValidateArgs),

    /// Show configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Discovery ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Seconds to wait for responses (max 30)
    #[arg(long, short = 't')]
    pub timeout: Option<f64>,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Device id, stored name, or connection string (name@host:port)
    pub identifier: String,
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List every device known from the store and static config
    #[command(alias = "ls")]
    List,

    /// Describe one device
    Info {
        /// Device id, stored name, or connection string
        identifier: String,
    },

    /// Forget every stored device
    Forget,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Device id, stored name, or connection string
    pub identifier: String,
}

// ── Telescope ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TelescopeArgs {
    /// Telescope id, stored name, or connection string
    #[arg(long, short = 'd', env = "ORRERY_TELESCOPE")]
    pub device: String,

    /// Observer latitude; runs the start-up sequence first when the mount needs it
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Observer longitude
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    pub lon: Option<f64>,

    #[command(subcommand)]
    pub command: TelescopeCommand,
}

#[derive(Debug, Subcommand)]
pub enum TelescopeCommand {
    /// Current pointing
    #[command(alias = "pos")]
    Position,

    /// Slew to equatorial coordinates
    Goto {
        /// Right ascension in hours (0-24)
        ra: f64,
        /// Declination in degrees (-90 to 90)
        #[arg(allow_hyphen_values = true)]
        dec: f64,
    },

    /// Park the mount
    Park,

    /// Unpark the mount
    Unpark,

    /// Turn sidereal tracking on or off
    Track {
        #[arg(value_enum)]
        state: Toggle,
    },

    /// Nudge the mount in a compass direction
    Move {
        /// north, east, south, or west
        direction: String,
        /// Seconds to move (default 3)
        #[arg(long)]
        duration: Option<f64>,
        /// Firmware speed (default 300)
        #[arg(long)]
        speed: Option<f64>,
    },

    /// Run the start-up sequence (location, then unpark/initialize)
    Startup {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Leave the arm folded
        #[arg(long)]
        no_move_arm: bool,
    },

    /// Raw Alpaca Action
    Action {
        name: String,
        /// Action parameters, passed through verbatim
        #[arg(default_value = "")]
        parameters: String,
    },

    /// Device firmware method with validated JSON params
    Method {
        method: String,
        /// JSON parameters, e.g. true or '{"ra_hour": 5.5, "dec_deg": -5.4}'
        params: Option<String>,
    },

    /// Park (optionally) and disconnect
    Disconnect {
        #[arg(long)]
        park: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

// ── Camera ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CameraArgs {
    /// Camera id, stored name, or connection string
    #[arg(long, short = 'd', env = "ORRERY_CAMERA")]
    pub device: String,

    #[command(subcommand)]
    pub command: CameraCommand,
}

#[derive(Debug, Subcommand)]
pub enum CameraCommand {
    /// Camera state and temperature
    Status,

    /// Take one exposure and wait until the image is ready
    Capture {
        /// Exposure length in seconds
        exposure: f64,
        /// Dark frame (shutter closed)
        #[arg(long)]
        dark: bool,
    },
}

// ── Validate ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Firmware method name
    pub method: String,
    /// JSON parameters; omit for none
    pub params: Option<String>,
}

// ── Config & completions ─────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,

    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
