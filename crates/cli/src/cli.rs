//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use contracts::{BridgeConfig, ControlAuthority};

/// cosim-bridge - traffic / world co-simulation bridge
#[derive(Parser, Debug)]
#[command(
    name = "cosim-bridge",
    author,
    version,
    about = "Bidirectional traffic / world co-simulation bridge",
    long_about = "Keeps a traffic simulator and a 3D world simulator in lock-step.\n\n\
                  Vehicles created in either engine are mirrored into the other, poses \n\
                  and light states are reconciled every step, and traffic-light phases \n\
                  follow the authoritative side."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "COSIM_BRIDGE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "COSIM_BRIDGE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the co-simulation bridge
    Run(RunArgs),

    /// Validate configuration and catalog files without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config/bridge.toml",
        env = "COSIM_BRIDGE_CONFIG"
    )]
    pub config: PathBuf,

    /// Override world engine host
    #[arg(long, env = "COSIM_WORLD_HOST")]
    pub world_host: Option<String>,

    /// Override world engine port
    #[arg(long, env = "COSIM_WORLD_PORT")]
    pub world_port: Option<u16>,

    /// Traffic network configuration file handed to the traffic peer
    #[arg(long, env = "COSIM_TRAFFIC_NETWORK")]
    pub network_file: Option<PathBuf>,

    /// Override step link listen port
    #[arg(long, env = "COSIM_LISTEN_PORT")]
    pub listen_port: Option<u16>,

    /// Override fixed step length (seconds)
    #[arg(long, env = "COSIM_STEP_LENGTH")]
    pub step_length: Option<f64>,

    /// Which engine drives traffic-light state
    #[arg(long, value_enum, env = "COSIM_CONTROL_DEVICES")]
    pub control_devices: Option<AuthorityArg>,

    /// Mirror vehicle color
    #[arg(long)]
    pub sync_vehicle_color: bool,

    /// Mirror vehicle light state
    #[arg(long)]
    pub sync_vehicle_lights: bool,

    /// Mirror every supported vehicle attribute (color and lights)
    #[arg(long)]
    pub sync_vehicle_all: bool,

    /// Validate configuration and exit without starting the bridge
    #[arg(long)]
    pub dry_run: bool,

    /// Simulate the world engine in memory instead of connecting to it
    #[arg(long, env = "COSIM_OFFLINE")]
    pub offline: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "COSIM_BRIDGE_METRICS_PORT")]
    pub metrics_port: u16,
}

impl RunArgs {
    /// Apply command-line overrides on top of the file configuration
    pub fn apply_overrides(&self, config: &mut BridgeConfig) {
        if let Some(ref host) = self.world_host {
            config.world.host = host.clone();
        }
        if let Some(port) = self.world_port {
            config.world.port = port;
        }
        if let Some(ref path) = self.network_file {
            config.traffic.network_file = Some(path.clone());
        }
        if let Some(port) = self.listen_port {
            config.link.listen_port = port;
        }
        if let Some(step_length) = self.step_length {
            config.sync.step_length = step_length;
        }
        if let Some(authority) = self.control_devices {
            config.sync.control_devices = authority.into();
        }
        if self.sync_vehicle_color || self.sync_vehicle_all {
            config.sync.sync_vehicle_color = true;
        }
        if self.sync_vehicle_lights || self.sync_vehicle_all {
            config.sync.sync_vehicle_lights = true;
        }
    }
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config/bridge.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/bridge.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the vehicle-class table grouped by class
    #[arg(long)]
    pub catalog: bool,
}

/// Control-device authority
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthorityArg {
    None,
    Traffic,
    World,
}

impl From<AuthorityArg> for ControlAuthority {
    fn from(arg: AuthorityArg) -> Self {
        match arg {
            AuthorityArg::None => ControlAuthority::None,
            AuthorityArg::Traffic => ControlAuthority::Traffic,
            AuthorityArg::World => ControlAuthority::World,
        }
    }
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}
