pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Outbound half of the connection to the load-cell device (gateway or firmware).
///
/// Implementations carry already-serialized JSON command payloads; framing and
/// transport are theirs to decide.
pub trait DeviceLink {
    fn is_connected(&self) -> bool;
    fn send(&mut self, payload: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<L: DeviceLink + ?Sized> DeviceLink for Box<L> {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn send(&mut self, payload: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).send(payload)
    }
}

impl<L: DeviceLink + ?Sized> DeviceLink for &mut L {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn send(&mut self, payload: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).send(payload)
    }
}
