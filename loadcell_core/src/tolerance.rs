//! Stability tolerance for the firmware, derived from cell rating, noise and fit slope.

use crate::config::ToleranceCfg;
use crate::error::{CalibrationError, Result};
use crate::noise::NoiseProfile;
use crate::types::CellSpec;
use crate::util::newtons_to_grams;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ToleranceSpec {
    pub tolerance_raw_units: f64,
    pub cell_error_g: f64,
    pub noise_g: f64,
    /// (cell error + noise) × safety margin
    pub min_tolerance_g: f64,
    /// raw units per gram
    pub conversion_factor: f64,
    /// The floor replaced a smaller computed value.
    pub floored: bool,
}

pub fn derive_tolerance(
    spec: &CellSpec,
    noise: &NoiseProfile,
    alpha: f64,
    cfg: &ToleranceCfg,
    gravity: f64,
) -> Result<ToleranceSpec> {
    if !alpha.is_finite() || alpha == 0.0 {
        return Err(eyre::Report::new(CalibrationError::DegenerateInput(format!(
            "cannot derive tolerance from slope {alpha}"
        ))));
    }
    let cell_error_g = spec.max_error_g();
    let noise_g = newtons_to_grams(noise.std_dev, gravity);
    let min_tolerance_g = (cell_error_g + noise_g) * cfg.safety_margin;
    let conversion_factor = 1.0 / (alpha * gravity / 1000.0);
    let computed = min_tolerance_g * conversion_factor;
    if !computed.is_finite() {
        return Err(eyre::Report::new(CalibrationError::NonFiniteResult(
            "stability tolerance".into(),
        )));
    }
    let floored = computed < cfg.floor_raw;
    let tolerance_raw_units = if floored { cfg.floor_raw } else { computed };
    tracing::debug!(
        cell_error_g,
        noise_g,
        min_tolerance_g,
        conversion_factor,
        tolerance_raw_units,
        floored,
        "tolerance derived"
    );
    Ok(ToleranceSpec {
        tolerance_raw_units,
        cell_error_g,
        noise_g,
        min_tolerance_g,
        conversion_factor,
        floored,
    })
}
