#![no_main]
use libfuzzer_sys::fuzz_target;
use loadcell_core::{FrameRouter, SampleBus};

fuzz_target!(|data: &str| {
    let bus = SampleBus::new();
    let sub = bus.subscribe();
    let router = FrameRouter::new(bus.clone());
    if let Ok(summary) = router.route(data) {
        assert!(sub.pending() <= summary.samples);
    }
});
