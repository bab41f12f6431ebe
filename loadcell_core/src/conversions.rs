//! `From` implementations bridging `loadcell_config` types to `loadcell_core` types.

use crate::config::{CaptureCfg, FilterCfg, LinkCfg, NoiseCfg, ToleranceCfg, WizardCfg};
use crate::types::{CalibrationPoint, CellSpec};
use std::time::Duration;

// ── CellSpec ─────────────────────────────────────────────────────────────────

impl TryFrom<&loadcell_config::CellCfg> for CellSpec {
    type Error = eyre::Report;

    fn try_from(c: &loadcell_config::CellCfg) -> Result<Self, Self::Error> {
        Self::new(c.capacity_kg, c.accuracy_percent)
    }
}

// ── FilterCfg ────────────────────────────────────────────────────────────────

/// Needs the whole config: the dead zone derives from `[cell]` and `gravity`.
impl TryFrom<&loadcell_config::Config> for FilterCfg {
    type Error = eyre::Report;

    fn try_from(c: &loadcell_config::Config) -> Result<Self, Self::Error> {
        Ok(Self {
            ema_alpha: c.filter.ema_alpha,
            dead_zone: c.filter.dead_zone,
            rounding: c.filter.rounding,
            anti_noise: c.filter.anti_noise,
            anti_noise_multiplier: c.filter.anti_noise_multiplier,
            noise_buffer: c.filter.noise_buffer,
            cell: CellSpec::try_from(&c.cell)?,
            gravity: c.gravity,
        })
    }
}

// ── Windows ──────────────────────────────────────────────────────────────────

impl From<&loadcell_config::NoiseCfg> for NoiseCfg {
    fn from(c: &loadcell_config::NoiseCfg) -> Self {
        Self {
            window: Duration::from_millis(c.window_ms),
            min_samples: c.min_samples,
        }
    }
}

impl From<&loadcell_config::CaptureCfg> for CaptureCfg {
    fn from(c: &loadcell_config::CaptureCfg) -> Self {
        Self {
            window: Duration::from_millis(c.window_ms),
            min_samples: c.min_samples,
        }
    }
}

// ── Tolerance / link ─────────────────────────────────────────────────────────

impl From<&loadcell_config::ToleranceCfg> for ToleranceCfg {
    fn from(c: &loadcell_config::ToleranceCfg) -> Self {
        Self {
            safety_margin: c.safety_margin,
            floor_raw: c.floor_raw,
        }
    }
}

impl From<&loadcell_config::LinkCfg> for LinkCfg {
    fn from(c: &loadcell_config::LinkCfg) -> Self {
        Self {
            settle: Duration::from_millis(c.settle_ms),
            safe_preset: c.safe_preset,
        }
    }
}

impl From<&loadcell_config::Config> for WizardCfg {
    fn from(c: &loadcell_config::Config) -> Self {
        Self {
            noise: (&c.noise).into(),
            capture: (&c.capture).into(),
            tolerance: (&c.tolerance).into(),
            link: (&c.link).into(),
            gravity: c.gravity,
        }
    }
}

// ── Points ───────────────────────────────────────────────────────────────────

impl From<&loadcell_config::CalibrationRow> for CalibrationPoint {
    fn from(r: &loadcell_config::CalibrationRow) -> Self {
        Self::new(r.mass_kg, r.raw)
    }
}
