#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![allow(clippy::missing_errors_doc, clippy::cast_precision_loss)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Simulated load cell and gateway for benches, demos and tests.

pub mod error;
pub mod sim;
mod util;

pub use error::LinkError;
pub use sim::{CellModel, SimLink, SimulatedDevice};
