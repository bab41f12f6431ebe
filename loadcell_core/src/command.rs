//! Device commands and their paced delivery over a `DeviceLink`.
//!
//! Commands are fire-and-forget: the firmware does not acknowledge them, so
//! every send is followed by a fixed settle delay before the next one.

use crate::error::{CalibrationError, Result};
use eyre::WrapErr;
use loadcell_traits::{Clock, DeviceLink};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Firmware configuration keys, named as the firmware expects them on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceParam {
    #[serde(rename = "tareOffset")]
    TareOffset,
    #[serde(rename = "conversionFactor")]
    ConversionFactor,
    #[serde(rename = "capacidadeMaximaGramas")]
    CapacityGrams,
    #[serde(rename = "percentualAcuracia")]
    AccuracyFraction,
    #[serde(rename = "toleranciaEstabilidade")]
    StabilityTolerance,
    #[serde(rename = "leiturasEstaveis")]
    StableReadings,
    #[serde(rename = "timeoutCalibracao")]
    CalibrationTimeoutMs,
    #[serde(rename = "gravity")]
    Gravity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum DeviceCommand {
    /// Zero the cell at its current load.
    #[serde(rename = "t")]
    Tare,
    /// Let the firmware derive its own factor from a known mass.
    #[serde(rename = "c")]
    Calibrate { massa_g: f64 },
    #[serde(rename = "set")]
    Set { param: DeviceParam, value: f64 },
    #[serde(rename = "get_config")]
    GetConfig,
}

impl DeviceCommand {
    pub const fn set(param: DeviceParam, value: f64) -> Self {
        Self::Set { param, value }
    }

    pub fn calibrate(mass_g: f64) -> Result<Self> {
        if !(mass_g.is_finite() && mass_g > 0.0) {
            return Err(eyre::Report::new(CalibrationError::InvalidPoint(format!(
                "calibration mass must be > 0 g, got {mass_g}"
            ))));
        }
        Ok(Self::Calibrate { massa_g: mass_g })
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Tare => "tare",
            Self::Calibrate { .. } => "calibrate",
            Self::Set { .. } => "set",
            Self::GetConfig => "get_config",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).wrap_err("encode device command")
    }
}

/// Relaxed stability settings applied while calibrating so the firmware's
/// own stability detector does not hold readings back.
pub fn safe_preset() -> [DeviceCommand; 3] {
    [
        DeviceCommand::set(DeviceParam::StabilityTolerance, 5000.0),
        DeviceCommand::set(DeviceParam::StableReadings, 5.0),
        DeviceCommand::set(DeviceParam::CalibrationTimeoutMs, 30_000.0),
    ]
}

/// Serializes commands onto a link and paces them with the settle delay.
pub struct Commander<L: DeviceLink> {
    link: L,
    clock: Arc<dyn Clock + Send + Sync>,
    settle: Duration,
    sent: usize,
}

impl<L: DeviceLink> Commander<L> {
    pub fn new(link: L, clock: Arc<dyn Clock + Send + Sync>, settle: Duration) -> Self {
        Self {
            link,
            clock,
            settle,
            sent: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Commands delivered so far.
    pub const fn sent(&self) -> usize {
        self.sent
    }

    pub const fn link(&self) -> &L {
        &self.link
    }

    pub fn send(&mut self, cmd: &DeviceCommand) -> Result<()> {
        if !self.link.is_connected() {
            return Err(eyre::Report::new(CalibrationError::DeviceUnreachable(
                "link is not connected".into(),
            )))
            .wrap_err_with(|| format!("send {}", cmd.name()));
        }
        let payload = cmd.to_json()?;
        self.link
            .send(&payload)
            .map_err(|e| eyre::Report::new(CalibrationError::DeviceUnreachable(e.to_string())))
            .wrap_err_with(|| format!("send {}", cmd.name()))?;
        self.sent += 1;
        tracing::debug!(%payload, "command sent");
        self.clock.sleep(self.settle);
        Ok(())
    }

    /// Send in order, stopping at the first failure.
    pub fn send_all<'a, I>(&mut self, cmds: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a DeviceCommand>,
    {
        let mut n = 0;
        for cmd in cmds {
            self.send(cmd)?;
            n += 1;
        }
        Ok(n)
    }

    pub fn into_link(self) -> L {
        self.link
    }
}
