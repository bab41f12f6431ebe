//! Noise characterization and the timed collection windows behind it.
//!
//! A window attaches to the stream, gathers readings until its deadline and
//! hands back plain numbers. Waits are sliced so a cancel flag raised from
//! another thread is noticed promptly.

use crate::bus::SampleSource;
use crate::config::{CaptureCfg, NoiseCfg};
use crate::error::{CalibrationError, Result};
use crate::types::Sample;
use crate::util::{mean, population_std_dev};
use loadcell_traits::Clock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Longest single wait inside a window before the cancel flag is re-checked.
pub const WINDOW_POLL_SLICE: Duration = Duration::from_millis(50);

/// Which field of a sample a window accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Firmware force in newtons (noise bursts).
    Force,
    /// Raw ADC reading (zero and known-mass captures).
    Raw,
}

impl Channel {
    #[inline]
    pub const fn read(self, s: &Sample) -> f64 {
        match self {
            Self::Force => s.force_n,
            Self::Raw => s.raw_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoiseProfile {
    /// Population standard deviation of the burst.
    pub std_dev: f64,
    pub mean: f64,
    pub sample_count: usize,
}

impl NoiseProfile {
    pub fn from_samples(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(eyre::Report::new(CalibrationError::InsufficientSamples {
                got: 0,
                need: 1,
            }));
        }
        let m = mean(values);
        let sd = population_std_dev(values, m);
        if !(m.is_finite() && sd.is_finite()) {
            return Err(eyre::Report::new(CalibrationError::NonFiniteResult(
                "noise statistics".into(),
            )));
        }
        Ok(Self {
            std_dev: sd,
            mean: m,
            sample_count: values.len(),
        })
    }
}

/// Collect one channel of `source` for `window`, measured on `clock`.
///
/// `clock` must share a timebase with `source`: the deadline handed to the
/// source is computed from it.
pub fn collect_window<S: SampleSource + ?Sized>(
    source: &mut S,
    window: Duration,
    channel: Channel,
    clock: &dyn Clock,
    cancel: Option<&AtomicBool>,
) -> Result<Vec<f64>> {
    let deadline = clock.now() + window;
    let mut values = Vec::new();
    loop {
        if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            return Err(eyre::Report::new(CalibrationError::Cancelled));
        }
        let now = clock.now();
        if now >= deadline {
            break;
        }
        let slice = deadline.min(now + WINDOW_POLL_SLICE);
        match source.next_sample(slice) {
            Some(s) => {
                let v = channel.read(&s);
                if v.is_finite() {
                    values.push(v);
                }
            }
            None if source.is_closed() => {
                tracing::debug!("sample stream closed before window deadline");
                break;
            }
            None => {}
        }
    }
    tracing::debug!(?channel, n = values.len(), window_ms = window.as_millis(), "window closed");
    Ok(values)
}

/// Noise burst on the force channel.
pub fn measure_noise<S: SampleSource + ?Sized>(
    source: &mut S,
    cfg: &NoiseCfg,
    clock: &dyn Clock,
    cancel: Option<&AtomicBool>,
) -> Result<NoiseProfile> {
    let values = collect_window(source, cfg.window, Channel::Force, clock, cancel)?;
    if values.len() < cfg.min_samples {
        return Err(eyre::Report::new(CalibrationError::InsufficientSamples {
            got: values.len(),
            need: cfg.min_samples,
        }));
    }
    let profile = NoiseProfile::from_samples(&values)?;
    tracing::debug!(
        std_dev = profile.std_dev,
        mean = profile.mean,
        n = profile.sample_count,
        "noise profile"
    );
    Ok(profile)
}

/// Mean raw reading over a capture window.
pub fn collect_mean<S: SampleSource + ?Sized>(
    source: &mut S,
    cfg: &CaptureCfg,
    clock: &dyn Clock,
    cancel: Option<&AtomicBool>,
) -> Result<f64> {
    let values = collect_window(source, cfg.window, Channel::Raw, clock, cancel)?;
    if values.len() < cfg.min_samples {
        return Err(eyre::Report::new(CalibrationError::InsufficientSamples {
            got: values.len(),
            need: cfg.min_samples,
        }));
    }
    Ok(mean(&values))
}
