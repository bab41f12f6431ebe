//! Per-sample conditioning: dead zone, decade rounding, EMA, anti-noise gate.
//!
//! Stage order is fixed. The first two stages work in grams because the
//! thresholds come from the cell rating; EMA and the output are in newtons.

use crate::config::FilterCfg;
use crate::util::{grams_to_newtons, mean, newtons_to_grams, population_std_dev};
use serde::Serialize;
use std::collections::VecDeque;

/// Verdict of the adaptive anti-noise gate for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stability {
    Stable,
    Unstable,
    /// Gate disabled.
    Unchecked,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FilteredSample {
    /// After dead zone and rounding, before smoothing.
    pub conditioned_n: f64,
    /// Pipeline output (post-EMA).
    pub filtered_n: f64,
    pub stability: Stability,
    /// The sample fell inside the dead zone.
    pub dead_zone: bool,
}

/// Mutable pipeline state owned by one display session.
#[derive(Debug, Clone)]
pub struct FilterState {
    ema: Option<f64>,
    in_dead_zone: bool,
    anti_noise_multiplier: f64,
    noise: VecDeque<f64>,
    capacity: usize,
}

impl FilterState {
    pub fn new(cfg: &FilterCfg) -> Self {
        let capacity = cfg.noise_buffer.max(2);
        Self {
            ema: None,
            in_dead_zone: false,
            anti_noise_multiplier: cfg.anti_noise_multiplier,
            noise: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Forget accumulated history. The anti-noise multiplier is an operator
    /// setting and survives.
    pub fn reset(&mut self) {
        self.ema = None;
        self.in_dead_zone = false;
        self.noise.clear();
    }

    pub const fn ema(&self) -> Option<f64> {
        self.ema
    }

    pub const fn in_dead_zone(&self) -> bool {
        self.in_dead_zone
    }

    pub const fn anti_noise_multiplier(&self) -> f64 {
        self.anti_noise_multiplier
    }

    pub fn set_anti_noise_multiplier(&mut self, k: f64) -> crate::error::Result<()> {
        if !(k.is_finite() && k > 0.0) {
            eyre::bail!("anti-noise multiplier must be a finite value > 0, got {k}");
        }
        self.anti_noise_multiplier = k;
        Ok(())
    }

    pub fn buffered(&self) -> usize {
        self.noise.len()
    }

    /// Mean and population σ of the trailing buffer; `None` below two samples.
    pub fn noise_band(&self) -> Option<(f64, f64)> {
        if self.noise.len() < 2 {
            return None;
        }
        let (head, tail) = self.noise.as_slices();
        let values: Vec<f64> = head.iter().chain(tail).copied().collect();
        let m = mean(&values);
        Some((m, population_std_dev(&values, m)))
    }

    fn push_noise(&mut self, x: f64) {
        if self.noise.len() == self.capacity {
            self.noise.pop_front();
        }
        self.noise.push_back(x);
    }

    fn gate(&self, x: f64) -> Stability {
        match self.noise_band() {
            None => Stability::Stable,
            Some((m, sd)) => {
                let band = self.anti_noise_multiplier * sd;
                if (x - m).abs() > band {
                    Stability::Unstable
                } else {
                    Stability::Stable
                }
            }
        }
    }
}

/// Run one force reading through the pipeline.
pub fn filter(force_n: f64, state: &mut FilterState, cfg: &FilterCfg) -> FilteredSample {
    if !force_n.is_finite() {
        let held = state.ema.unwrap_or(0.0);
        return FilteredSample {
            conditioned_n: held,
            filtered_n: held,
            stability: if cfg.anti_noise {
                Stability::Unstable
            } else {
                Stability::Unchecked
            },
            dead_zone: state.in_dead_zone,
        };
    }

    let grams = newtons_to_grams(force_n, cfg.gravity);

    state.in_dead_zone = cfg.dead_zone && grams.abs() < cfg.dead_zone_g();
    let conditioned_n = if state.in_dead_zone {
        0.0
    } else if cfg.rounding
        && let Some(step) = cfg.resolution_g()
    {
        let rounded = (grams / step).round() * step;
        // 0.0 rather than -0.0 for small negative readings
        if rounded == 0.0 {
            0.0
        } else {
            grams_to_newtons(rounded, cfg.gravity)
        }
    } else {
        force_n
    };

    let a = cfg.ema_alpha.clamp(0.0, 1.0);
    let ema = match state.ema {
        None => conditioned_n,
        Some(prev) => a.mul_add(conditioned_n, (1.0 - a) * prev),
    };
    state.ema = Some(ema);

    // Statistics come from the buffer as it was before this sample.
    let stability = if cfg.anti_noise {
        state.gate(force_n)
    } else {
        Stability::Unchecked
    };
    state.push_noise(force_n);

    FilteredSample {
        conditioned_n,
        filtered_n: ema,
        stability,
        dead_zone: state.in_dead_zone,
    }
}
