//! Running stream statistics shown next to the live reading.

use crate::types::CellSpec;
use crate::util::newtons_to_grams;
use serde::Serialize;

#[derive(Debug, Clone, Default)]
pub struct StreamMonitor {
    peak_n: Option<f64>,
    min_n: Option<f64>,
    last_time: Option<f64>,
    rate_sum: f64,
    rate_count: u64,
    samples: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    pub samples: u64,
    pub peak_n: Option<f64>,
    pub min_n: Option<f64>,
    /// Mean device readings per second over the stream.
    pub readings_per_sec: Option<f64>,
}

impl StreamMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one filtered reading stamped with device time `time` (s).
    pub fn record(&mut self, time: f64, filtered_n: f64) {
        self.samples = self.samples.saturating_add(1);
        if filtered_n.is_finite() {
            self.peak_n = Some(self.peak_n.map_or(filtered_n, |p| p.max(filtered_n)));
            self.min_n = Some(self.min_n.map_or(filtered_n, |m| m.min(filtered_n)));
        }
        if let Some(prev) = self.last_time {
            let dt = time - prev;
            if dt > 0.0 && dt.is_finite() {
                self.rate_sum += 1.0 / dt;
                self.rate_count += 1;
            }
        }
        if time.is_finite() {
            self.last_time = Some(time);
        }
    }

    pub fn readings_per_sec(&self) -> Option<f64> {
        (self.rate_count > 0).then(|| self.rate_sum / self.rate_count as f64)
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            samples: self.samples,
            peak_n: self.peak_n,
            min_n: self.min_n,
            readings_per_sec: self.readings_per_sec(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Load as a percentage of the declared capacity.
pub fn load_percent(force_n: f64, cell: &CellSpec, gravity: f64) -> f64 {
    newtons_to_grams(force_n, gravity) / cell.capacity_g() * 100.0
}
