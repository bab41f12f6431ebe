//! Plain data exchanged between the stream, the calibration engine and the UI.

use crate::error::{CalibrationError, Result};
use serde::Serialize;

/// One reading from the device stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    /// Device clock in seconds (monotonic per device session).
    pub time: f64,
    /// Raw ADC reading; equals `force_n` when the gateway does not forward counts.
    pub raw_count: f64,
    /// Force as reported by the firmware, in newtons.
    pub force_n: f64,
}

/// A (known mass, averaged raw reading) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationPoint {
    pub mass_kg: f64,
    pub raw_reading: f64,
}

impl CalibrationPoint {
    pub const fn new(mass_kg: f64, raw_reading: f64) -> Self {
        Self {
            mass_kg,
            raw_reading,
        }
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.mass_kg == 0.0
    }
}

/// Declared rating of the load cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CellSpec {
    pub capacity_kg: f64,
    pub accuracy_percent: f64,
}

impl CellSpec {
    pub fn new(capacity_kg: f64, accuracy_percent: f64) -> Result<Self> {
        if !(capacity_kg.is_finite() && capacity_kg > 0.0) {
            return Err(eyre::Report::new(CalibrationError::InvalidSpec(format!(
                "capacity must be > 0 kg, got {capacity_kg}"
            ))));
        }
        if !(accuracy_percent.is_finite() && accuracy_percent > 0.0) {
            return Err(eyre::Report::new(CalibrationError::InvalidSpec(format!(
                "accuracy must be > 0 %, got {accuracy_percent}"
            ))));
        }
        Ok(Self {
            capacity_kg,
            accuracy_percent,
        })
    }

    #[inline]
    pub fn max_error_kg(&self) -> f64 {
        self.capacity_kg * self.accuracy_percent / 100.0
    }

    #[inline]
    pub fn max_error_g(&self) -> f64 {
        self.max_error_kg() * 1000.0
    }

    #[inline]
    pub fn capacity_g(&self) -> f64 {
        self.capacity_kg * 1000.0
    }
}

impl Default for CellSpec {
    fn default() -> Self {
        Self {
            capacity_kg: 5.0,
            accuracy_percent: 0.05,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(5.0, 0.03, 1.5)]
    #[case(5.0, 0.05, 2.5)]
    #[case(200.0, 0.02, 40.0)]
    fn max_error_in_grams(#[case] cap: f64, #[case] acc: f64, #[case] expected_g: f64) {
        let spec = CellSpec::new(cap, acc).unwrap();
        assert!((spec.max_error_g() - expected_g).abs() < 1e-9);
    }

    #[rstest]
    #[case(0.0, 0.05)]
    #[case(-1.0, 0.05)]
    #[case(5.0, 0.0)]
    #[case(f64::NAN, 0.05)]
    fn rejects_non_positive_rating(#[case] cap: f64, #[case] acc: f64) {
        let err = CellSpec::new(cap, acc).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CalibrationError>(),
            Some(CalibrationError::InvalidSpec(_))
        ));
    }
}
