//! Configuration types for the filter pipeline and the calibration wizard.
//!
//! These are the runtime configuration structs used by `FilterState` and `Wizard`.
//! They are separate from the TOML-deserialized config in `loadcell_config`.

use crate::types::CellSpec;
use crate::util::STANDARD_GRAVITY;
use std::time::Duration;

/// Filter configuration for the per-sample pipeline.
#[derive(Debug, Clone)]
pub struct FilterCfg {
    /// EMA smoothing factor in (0.0, 1.0]. 1.0 is a pass-through.
    pub ema_alpha: f64,
    pub dead_zone: bool,
    pub rounding: bool,
    pub anti_noise: bool,
    /// Initial `k` of the `mean ± k·σ` stability band.
    pub anti_noise_multiplier: f64,
    /// Capacity of the trailing buffer feeding the anti-noise statistics.
    pub noise_buffer: usize,
    /// Declared cell; the dead-zone threshold and rounding resolution derive from it.
    pub cell: CellSpec,
    pub gravity: f64,
}

impl FilterCfg {
    /// Readings below this magnitude (grams) are suppressed to exactly zero.
    #[inline]
    pub fn dead_zone_g(&self) -> f64 {
        self.cell.max_error_g()
    }

    /// Rounding step in grams: the decade of the dead-zone threshold.
    /// `None` when the threshold is not a positive finite number.
    pub fn resolution_g(&self) -> Option<f64> {
        let threshold = self.dead_zone_g();
        if !(threshold.is_finite() && threshold > 0.0) {
            return None;
        }
        Some(10f64.powf(threshold.log10().floor()))
    }
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            ema_alpha: 0.2,
            dead_zone: true,
            rounding: true,
            anti_noise: false,
            anti_noise_multiplier: 2.0,
            noise_buffer: 50,
            cell: CellSpec::default(),
            gravity: STANDARD_GRAVITY,
        }
    }
}

/// Noise burst collected with the cell unloaded.
#[derive(Debug, Clone)]
pub struct NoiseCfg {
    pub window: Duration,
    pub min_samples: usize,
}

impl Default for NoiseCfg {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(5),
            min_samples: 10,
        }
    }
}

/// Averaging window for zero and known-mass captures.
#[derive(Debug, Clone)]
pub struct CaptureCfg {
    pub window: Duration,
    pub min_samples: usize,
}

impl Default for CaptureCfg {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(3),
            min_samples: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToleranceCfg {
    pub safety_margin: f64,
    /// Lower bound of the derived tolerance, in raw units.
    pub floor_raw: f64,
}

impl Default for ToleranceCfg {
    fn default() -> Self {
        Self {
            safety_margin: 1.5,
            floor_raw: 100.0,
        }
    }
}

/// Command pacing toward the device.
#[derive(Debug, Clone)]
pub struct LinkCfg {
    /// Wait after every command before issuing the next one.
    pub settle: Duration,
    pub safe_preset: bool,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(300),
            safe_preset: true,
        }
    }
}

/// Everything the calibration wizard needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct WizardCfg {
    pub noise: NoiseCfg,
    pub capture: CaptureCfg,
    pub tolerance: ToleranceCfg,
    pub link: LinkCfg,
    pub gravity: f64,
}

impl Default for WizardCfg {
    fn default() -> Self {
        Self {
            noise: NoiseCfg::default(),
            capture: CaptureCfg::default(),
            tolerance: ToleranceCfg::default(),
            link: LinkCfg::default(),
            gravity: STANDARD_GRAVITY,
        }
    }
}
