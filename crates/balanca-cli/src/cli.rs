//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use balanca_types::DeviceClass;

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Device category to scan for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ClassArg {
    /// Body composition scale
    #[default]
    Scale,
    /// Heart-rate chest strap or wristband
    HeartRate,
}

impl From<ClassArg> for DeviceClass {
    fn from(arg: ClassArg) -> Self {
        match arg {
            ClassArg::Scale => DeviceClass::SmartScale,
            ClassArg::HeartRate => DeviceClass::HeartRateMonitor,
        }
    }
}

/// Measurement history category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum HistoryKind {
    #[default]
    Weight,
    HeartRate,
}

#[derive(Parser)]
#[command(name = "balanca")]
#[command(author, version, about = "CLI for Bluetooth body scales and heart-rate monitors", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Database path (defaults to the platform data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for nearby devices
    Scan {
        /// Device category to look for
        #[arg(short, long, value_enum, default_value = "scale")]
        class: ClassArg,

        /// Scan timeout in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Run a measurement session and save the result
    Measure {
        /// Device category to look for
        #[arg(short, long, value_enum, default_value = "scale")]
        class: ClassArg,

        /// Device id to use; skips the interactive picker
        #[arg(short, long, env = "BALANCA_DEVICE")]
        device: Option<String>,

        /// User the measurement belongs to
        #[arg(short, long, env = "BALANCA_USER")]
        user: String,

        /// Update the profile height (meters) before measuring
        #[arg(long)]
        height: Option<f32>,

        /// Scan timeout in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,

        /// Calibration countdown in seconds
        #[arg(long, default_value = "5")]
        calibration: u64,

        /// Measuring window in seconds
        #[arg(long, default_value = "5")]
        measuring: u64,

        /// Save without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show saved measurements
    History {
        /// User whose history to show
        #[arg(short, long, env = "BALANCA_USER")]
        user: String,

        /// Measurement category
        #[arg(short, long, value_enum, default_value = "weight")]
        kind: HistoryKind,

        /// Maximum number of records to show
        #[arg(short, long, default_value = "20")]
        limit: u32,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Manage user profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
}

#[derive(Subcommand)]
pub enum ProfileAction {
    /// Create or update a profile
    Set {
        /// User id the profile belongs to
        #[arg(short, long, env = "BALANCA_USER")]
        user: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Height in meters, used to derive BMI
        #[arg(long)]
        height: Option<f32>,
    },

    /// Show a profile
    Show {
        /// User id the profile belongs to
        #[arg(short, long, env = "BALANCA_USER")]
        user: String,
    },
}
