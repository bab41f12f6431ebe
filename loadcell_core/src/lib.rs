#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Load-cell calibration engine and streaming filter pipeline (transport-agnostic).
//!
//! Device I/O goes through `loadcell_traits::DeviceLink` for commands and a
//! [`bus::SampleBus`] fed by [`frame::FrameRouter`] for readings.
//!
//! ## Architecture
//!
//! - **Filtering**: dead zone, decade rounding, EMA, anti-noise gate (`filter`)
//! - **Noise**: timed windows over the bus and burst statistics (`noise`)
//! - **Calibration**: least-squares fit and quality gate (`regression`),
//!   firmware stability tolerance (`tolerance`)
//! - **Wizard**: step sequencing, captures and commit (`wizard`)
//! - **Device boundary**: command encoding and pacing (`command`),
//!   gateway frame decoding (`frame`)
//!
//! Forces are newtons, masses kilograms, firmware thresholds grams; raw
//! readings are whatever unit the ADC reports.

pub mod bus;
pub mod command;
pub mod config;
pub mod conversions;
pub mod error;
pub mod filter;
pub mod frame;
pub mod mocks;
pub mod monitor;
pub mod noise;
pub mod regression;
pub mod session;
pub mod tolerance;
pub mod types;
pub mod util;
pub mod wizard;

pub use bus::{SampleBus, SampleFeed, SampleSource, Subscription};
pub use command::{Commander, DeviceCommand, DeviceParam};
pub use config::{CaptureCfg, FilterCfg, LinkCfg, NoiseCfg, ToleranceCfg, WizardCfg};
pub use error::{CalibrationError, Result};
pub use filter::{FilterState, FilteredSample, Stability, filter};
pub use frame::{DeviceConfig, FrameRouter, GatewayFrame, parse_frames};
pub use monitor::StreamMonitor;
pub use noise::{NoiseProfile, collect_mean, measure_noise};
pub use regression::{QualityWarning, RegressionResult, fit, require_single_zero};
pub use session::{DisplayReading, DisplaySession};
pub use tolerance::{ToleranceSpec, derive_tolerance};
pub use types::{CalibrationPoint, CellSpec, Sample};
pub use wizard::{CommitPlan, CommitSelection, Wizard, WizardReport, WizardStep};
