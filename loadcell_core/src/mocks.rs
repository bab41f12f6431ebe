//! Test and helper doubles for loadcell_core: a recording link and scripted
//! sample sources driven by a `ManualClock`.

use crate::bus::{SampleFeed, SampleSource};
use crate::command::DeviceCommand;
use crate::types::Sample;
use loadcell_traits::{Clock, DeviceLink, ManualClock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A link that accepts everything and remembers the payloads.
#[derive(Clone, Default)]
pub struct RecordingLink {
    sent: Arc<Mutex<Vec<String>>>,
    disconnected: Arc<AtomicBool>,
    failing: Arc<AtomicBool>,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.disconnected.store(!connected, Ordering::Relaxed);
    }

    /// Make every subsequent send fail while staying "connected".
    pub fn fail_sends(&self, fail: bool) {
        self.failing.store(fail, Ordering::Relaxed);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Payloads decoded back into commands; undecodable ones are skipped.
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.sent()
            .iter()
            .filter_map(|p| serde_json::from_str(p).ok())
            .collect()
    }
}

impl DeviceLink for RecordingLink {
    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::Relaxed)
    }

    fn send(&mut self, payload: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(Box::new(std::io::Error::other("link write failed")));
        }
        if let Ok(mut g) = self.sent.lock() {
            g.push(payload.to_string());
        }
        Ok(())
    }
}

type Generator = Box<dyn FnMut(usize) -> Sample + Send>;

/// Produces samples on a fixed schedule of a `ManualClock`, advancing the
/// clock as it goes, so windows complete instantly and deterministically.
pub struct ScriptedSource {
    clock: ManualClock,
    period: Duration,
    next_due: Option<Instant>,
    index: usize,
    generate: Generator,
    live: Option<Arc<AtomicUsize>>,
}

impl ScriptedSource {
    pub fn new<F>(clock: ManualClock, period: Duration, generate: F) -> Self
    where
        F: FnMut(usize) -> Sample + Send + 'static,
    {
        Self {
            clock,
            period: period.max(Duration::from_micros(1)),
            next_due: None,
            index: 0,
            generate: Box::new(generate),
            live: None,
        }
    }

    /// Every sample reads `value` on both channels.
    pub fn constant(clock: ManualClock, value: f64, period: Duration) -> Self {
        let secs = period.as_secs_f64();
        Self::new(clock, period, move |i| Sample {
            time: i as f64 * secs,
            raw_count: value,
            force_n: value,
        })
    }
}

impl SampleSource for ScriptedSource {
    fn next_sample(&mut self, deadline: Instant) -> Option<Sample> {
        let now = self.clock.now();
        let due = *self.next_due.get_or_insert(now + self.period);
        if due > deadline {
            if deadline > now {
                self.clock.advance(deadline - now);
            }
            return None;
        }
        if due > now {
            self.clock.advance(due - now);
        }
        self.next_due = Some(due + self.period);
        let s = (self.generate)(self.index);
        self.index += 1;
        Some(s)
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        if let Some(live) = &self.live {
            live.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Level {
    raw: f64,
    force_n: f64,
}

/// A feed whose readings follow a load the test sets between steps.
///
/// Readings alternate `+jitter` / `-jitter` around the current level on both
/// channels.
#[derive(Clone)]
pub struct ScriptedFeed {
    clock: ManualClock,
    period: Duration,
    jitter: f64,
    level: Arc<Mutex<Level>>,
    live: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
    trip: Arc<Mutex<Option<(usize, Arc<AtomicBool>)>>>,
}

impl ScriptedFeed {
    pub fn new(clock: ManualClock, period: Duration, jitter: f64) -> Self {
        Self {
            clock,
            period,
            jitter,
            level: Arc::new(Mutex::new(Level {
                raw: 0.0,
                force_n: 0.0,
            })),
            live: Arc::new(AtomicUsize::new(0)),
            opened: Arc::new(AtomicUsize::new(0)),
            trip: Arc::new(Mutex::new(None)),
        }
    }

    /// The next source raises `flag` once it has delivered `readings` samples.
    pub fn raise_after(&self, readings: usize, flag: Arc<AtomicBool>) {
        if let Ok(mut g) = self.trip.lock() {
            *g = Some((readings, flag));
        }
    }

    pub fn set_load(&self, raw: f64, force_n: f64) {
        if let Ok(mut g) = self.level.lock() {
            *g = Level { raw, force_n };
        }
    }

    /// Sources currently attached.
    pub fn live_sources(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    /// Sources ever attached.
    pub fn opened_sources(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }
}

impl SampleFeed for ScriptedFeed {
    type Source = ScriptedSource;

    fn subscribe(&self) -> ScriptedSource {
        let level = Arc::clone(&self.level);
        let jitter = self.jitter;
        let secs = self.period.as_secs_f64();
        let trip = self.trip.lock().ok().and_then(|mut g| g.take());
        let mut src = ScriptedSource::new(self.clock.clone(), self.period, move |i| {
            if let Some((after, flag)) = &trip {
                if i + 1 == *after {
                    flag.store(true, Ordering::Relaxed);
                }
            }
            let l = level.lock().map(|g| *g).unwrap_or(Level {
                raw: f64::NAN,
                force_n: f64::NAN,
            });
            let d = if i % 2 == 0 { jitter } else { -jitter };
            Sample {
                time: i as f64 * secs,
                raw_count: l.raw + d,
                force_n: l.force_n + d,
            }
        });
        self.live.fetch_add(1, Ordering::Relaxed);
        self.opened.fetch_add(1, Ordering::Relaxed);
        src.live = Some(Arc::clone(&self.live));
        src
    }
}
