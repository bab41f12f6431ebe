//! Live display session: runs one bus listener's readings through the
//! streaming filter and keeps rate and load statistics alongside.

use crate::bus::{SampleSource, Subscription};
use crate::config::FilterCfg;
use crate::filter::{FilterState, FilteredSample, filter};
use crate::monitor::{MonitorSnapshot, StreamMonitor, load_percent};
use crate::types::Sample;
use serde::Serialize;
use std::time::Instant;

/// One row of the live display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisplayReading {
    pub sample: Sample,
    pub filtered: FilteredSample,
    pub load_percent: f64,
}

/// Owns the filter state and stream statistics for one live view of the bus.
pub struct DisplaySession {
    cfg: FilterCfg,
    state: FilterState,
    monitor: StreamMonitor,
    subscription: Subscription,
}

impl DisplaySession {
    pub fn new(cfg: FilterCfg, subscription: Subscription) -> Self {
        let state = FilterState::new(&cfg);
        Self {
            cfg,
            state,
            monitor: StreamMonitor::new(),
            subscription,
        }
    }

    pub const fn cfg(&self) -> &FilterCfg {
        &self.cfg
    }

    pub const fn state(&self) -> &FilterState {
        &self.state
    }

    pub const fn state_mut(&mut self) -> &mut FilterState {
        &mut self.state
    }

    /// Swap the filter configuration; history is discarded.
    pub fn set_cfg(&mut self, cfg: FilterCfg) {
        self.state = FilterState::new(&cfg);
        self.cfg = cfg;
        self.monitor.reset();
    }

    pub fn clear(&mut self) {
        self.state.reset();
        self.monitor.reset();
    }

    pub fn process(&mut self, sample: Sample) -> DisplayReading {
        let filtered = filter(sample.force_n, &mut self.state, &self.cfg);
        self.monitor.record(sample.time, filtered.filtered_n);
        DisplayReading {
            sample,
            filtered,
            load_percent: load_percent(filtered.filtered_n, &self.cfg.cell, self.cfg.gravity),
        }
    }

    /// Wait for the next sample until `deadline`.
    pub fn poll(&mut self, deadline: Instant) -> Option<DisplayReading> {
        let sample = self.subscription.next_sample(deadline)?;
        Some(self.process(sample))
    }

    /// Everything already queued, without blocking.
    pub fn drain(&mut self) -> Vec<DisplayReading> {
        self.subscription
            .drain()
            .into_iter()
            .map(|s| self.process(s))
            .collect()
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.monitor.snapshot()
    }
}
