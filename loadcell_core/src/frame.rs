//! Inbound gateway messages and their routing into the sample bus.
//!
//! A message is either one JSON object or an array of them. Elements that do
//! not decode are skipped; a message that is not JSON at all is an error.

use crate::bus::SampleBus;
use crate::error::Result;
use crate::types::Sample;
use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Firmware configuration as echoed by `get_config`. Absent or null keys stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceConfig {
    pub conversion_factor: Option<f64>,
    pub gravity: Option<f64>,
    pub leituras_estaveis: Option<f64>,
    pub tolerancia_estabilidade: Option<f64>,
    pub num_amostras_media: Option<f64>,
    pub timeout_calibracao: Option<f64>,
    pub tare_offset: Option<f64>,
    pub capacidade_maxima_gramas: Option<f64>,
    pub percentual_acuracia: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayFrame {
    Data {
        /// device seconds
        tempo: f64,
        /// newtons
        forca: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw: Option<f64>,
    },
    Config(DeviceConfig),
    Status {
        #[serde(default)]
        message: String,
    },
    Success {
        #[serde(default)]
        message: String,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    Info {
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Unknown,
}

impl GatewayFrame {
    pub fn sample(&self) -> Option<Sample> {
        match *self {
            Self::Data {
                tempo, forca, raw, ..
            } => Some(Sample {
                time: tempo,
                raw_count: raw.unwrap_or(forca),
                force_n: forca,
            }),
            _ => None,
        }
    }
}

pub fn parse_frames(text: &str) -> Result<Vec<GatewayFrame>> {
    let value: serde_json::Value =
        serde_json::from_str(text).wrap_err("decode gateway message")?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };
    let mut frames = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<GatewayFrame>(item) {
            Ok(GatewayFrame::Unknown) => tracing::debug!("skipping frame of unknown type"),
            Ok(frame) => frames.push(frame),
            Err(e) => tracing::debug!(error = %e, "skipping malformed frame"),
        }
    }
    Ok(frames)
}

/// What one gateway message contributed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteSummary {
    pub samples: usize,
    pub configs: usize,
    pub messages: usize,
}

/// Publishes data frames to the bus and keeps the latest device configuration.
#[derive(Clone, Debug)]
pub struct FrameRouter {
    bus: SampleBus,
    last_config: Arc<Mutex<Option<DeviceConfig>>>,
}

impl FrameRouter {
    pub fn new(bus: SampleBus) -> Self {
        Self {
            bus,
            last_config: Arc::new(Mutex::new(None)),
        }
    }

    pub const fn bus(&self) -> &SampleBus {
        &self.bus
    }

    pub fn last_config(&self) -> Option<DeviceConfig> {
        match self.last_config.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn route(&self, text: &str) -> Result<RouteSummary> {
        let mut summary = RouteSummary::default();
        for frame in parse_frames(text)? {
            if let Some(sample) = frame.sample() {
                self.bus.publish(sample);
                summary.samples += 1;
                continue;
            }
            match frame {
                GatewayFrame::Config(cfg) => {
                    tracing::info!(?cfg, "device configuration received");
                    match self.last_config.lock() {
                        Ok(mut g) => *g = Some(cfg),
                        Err(poisoned) => *poisoned.into_inner() = Some(cfg),
                    }
                    summary.configs += 1;
                }
                GatewayFrame::Error { message } => {
                    tracing::warn!(%message, "device reported error");
                    summary.messages += 1;
                }
                GatewayFrame::Status { message }
                | GatewayFrame::Success { message }
                | GatewayFrame::Info { message } => {
                    tracing::info!(%message, "device message");
                    summary.messages += 1;
                }
                GatewayFrame::Data { .. } | GatewayFrame::Unknown => {}
            }
        }
        Ok(summary)
    }
}
