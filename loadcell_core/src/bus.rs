//! Broadcast of the device sample stream to independent listeners.
//!
//! Each `Subscription` owns a bounded crossbeam queue, so a slow listener only
//! loses its own samples and never stalls the producer or another listener.
//! Dropping a subscription unregisters it.
use crate::types::Sample;
use crossbeam_channel as xch;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;

/// Default per-listener queue depth (about 3 s of samples at 80 Hz).
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// Pull side of a sample stream with deadline-bounded waits.
pub trait SampleSource {
    /// Block until the next sample or `deadline`; `None` once the deadline
    /// passes or the stream ends.
    fn next_sample(&mut self, deadline: Instant) -> Option<Sample>;

    /// The producer is gone and no further samples can arrive.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Something measurement windows can attach a fresh listener to.
pub trait SampleFeed {
    type Source: SampleSource;
    fn subscribe(&self) -> Self::Source;
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, xch::Sender<Sample>)>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    match registry.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Clone)]
pub struct SampleBus {
    registry: Arc<Mutex<Registry>>,
    depth: usize,
}

impl Default for SampleBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SampleBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleBus")
            .field("listeners", &self.listener_count())
            .field("depth", &self.depth)
            .finish()
    }
}

impl SampleBus {
    pub fn new() -> Self {
        Self::with_depth(DEFAULT_QUEUE_DEPTH)
    }

    pub fn with_depth(depth: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            depth: depth.max(1),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = xch::bounded(self.depth);
        let mut reg = lock(&self.registry);
        let id = reg.next_id;
        reg.next_id = reg.next_id.wrapping_add(1);
        reg.listeners.push((id, tx));
        tracing::trace!(id, listeners = reg.listeners.len(), "listener attached");
        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `sample` to every listener; returns how many accepted it.
    pub fn publish(&self, sample: Sample) -> usize {
        let mut reg = lock(&self.registry);
        let mut delivered = 0;
        reg.listeners.retain(|(id, tx)| match tx.try_send(sample) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(xch::TrySendError::Full(_)) => {
                tracing::trace!(id, "listener queue full, sample dropped");
                true
            }
            Err(xch::TrySendError::Disconnected(_)) => false,
        });
        delivered
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.registry).listeners.len()
    }
}

impl SampleFeed for SampleBus {
    type Source = Subscription;

    fn subscribe(&self) -> Subscription {
        Self::subscribe(self)
    }
}

/// One listener's view of the stream.
pub struct Subscription {
    id: u64,
    rx: xch::Receiver<Sample>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Samples already queued, without blocking.
    pub fn drain(&self) -> Vec<Sample> {
        self.rx.try_iter().collect()
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl SampleSource for Subscription {
    fn next_sample(&mut self, deadline: Instant) -> Option<Sample> {
        self.rx.recv_deadline(deadline).ok()
    }

    fn is_closed(&self) -> bool {
        self.rx.is_empty() && self.registry.strong_count() == 0
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut reg = lock(&registry);
            reg.listeners.retain(|(id, _)| *id != self.id);
            tracing::trace!(id = self.id, "listener detached");
        }
    }
}
