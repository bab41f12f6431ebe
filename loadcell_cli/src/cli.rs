//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "loadcell", version, about = "Load-cell calibration and filtering")]
pub struct Cli {
    /// Path to config TOML (typed); built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print results and logs as JSON lines instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Cell rating overrides; `[cell]` from the config fills the gaps.
#[derive(clap::Args, Debug, Clone, Copy)]
pub struct RatingArgs {
    /// Rated capacity in kg
    #[arg(long, value_name = "KG")]
    pub capacity_kg: Option<f64>,
    /// Accuracy class as percent of capacity
    #[arg(long, value_name = "PCT")]
    pub accuracy_percent: Option<f64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fit the raw→kg line through recorded calibration points
    Fit {
        /// CSV with headers `mass_kg,raw`
        #[arg(long, value_name = "FILE")]
        points: PathBuf,
        #[command(flatten)]
        rating: RatingArgs,
    },
    /// Derive the firmware stability tolerance
    Tolerance {
        #[command(flatten)]
        rating: RatingArgs,
        /// Measured noise standard deviation in N
        #[arg(long, value_name = "N")]
        std_dev: f64,
        /// Fitted slope in kg per raw count
        #[arg(long, allow_negative_numbers = true)]
        alpha: f64,
    },
    /// Run a recorded force trace through the display filter
    Filter {
        /// CSV with headers `time,force_n`
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
        /// Enable the adaptive anti-noise gate regardless of config
        #[arg(long, action = ArgAction::SetTrue)]
        anti_noise: bool,
    },
    /// Run the calibration wizard against the simulated device
    Calibrate {
        /// Known masses to place, in kg, in capture order
        #[arg(long = "mass-kg", value_name = "KG", num_args = 1.., required = true)]
        masses: Vec<f64>,
        #[command(flatten)]
        rating: RatingArgs,
        /// Do not write tareOffset/conversionFactor
        #[arg(long, action = ArgAction::SetTrue)]
        skip_offset: bool,
        /// Do not write the cell rating
        #[arg(long, action = ArgAction::SetTrue)]
        skip_rating: bool,
        /// Do not write the stability tolerance
        #[arg(long, action = ArgAction::SetTrue)]
        skip_tolerance: bool,
    },
    /// Stream filtered readings from the simulated device
    Stream {
        /// Stop after this many milliseconds (Ctrl-C also stops)
        #[arg(long, value_name = "MS", default_value_t = 2000)]
        duration_ms: u64,
        /// Load placed on the simulated cell
        #[arg(long, value_name = "KG", default_value_t = 0.0)]
        load_kg: f64,
    },
    /// Quick health check (config + simulator)
    SelfCheck,
}
