//! Simulated load cell behind a simulated gateway.
//!
//! A producer thread emits JSON data frames at the configured rate and routes
//! them through a `FrameRouter`, exactly as a real gateway reader would. The
//! matching `SimLink` applies commands to the shared firmware state and queues
//! the gateway's replies, which ride along with the next data frame.
//!
//! Each `SimulatedDevice` spawns exactly one thread, joined on drop.
use crate::error::LinkError;
use crate::util::Xorshift;
use loadcell_core::command::{DeviceCommand, DeviceParam};
use loadcell_core::frame::{DeviceConfig, FrameRouter, GatewayFrame};
use loadcell_traits::DeviceLink;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Electrical behaviour of the simulated cell.
#[derive(Debug, Clone)]
pub struct CellModel {
    /// ADC reading with nothing on the cell
    pub zero_raw: f64,
    pub counts_per_kg: f64,
    /// Peak amplitude of ADC jitter (counts)
    pub noise_raw: f64,
    pub gravity: f64,
    pub seed: u64,
}

impl CellModel {
    pub fn from_config(cfg: &loadcell_config::Config) -> Self {
        Self {
            zero_raw: cfg.device.zero_raw,
            counts_per_kg: cfg.device.counts_per_kg,
            noise_raw: cfg.device.noise_raw,
            gravity: cfg.gravity,
            seed: cfg.device.seed,
        }
    }
}

impl Default for CellModel {
    fn default() -> Self {
        Self::from_config(&loadcell_config::Config::default())
    }
}

#[derive(Debug)]
struct Firmware {
    model: CellModel,
    rng: Xorshift,
    load_kg: f64,
    tare_offset: f64,
    /// raw counts per gram
    conversion_factor: f64,
    gravity: f64,
    params: HashMap<DeviceParam, f64>,
    connected: bool,
    outbox: Vec<GatewayFrame>,
}

impl Firmware {
    fn new(model: CellModel) -> Self {
        Self {
            rng: Xorshift::new(model.seed),
            load_kg: 0.0,
            tare_offset: model.zero_raw,
            conversion_factor: model.counts_per_kg / 1000.0,
            gravity: model.gravity,
            params: HashMap::new(),
            connected: true,
            outbox: Vec::new(),
            model,
        }
    }

    fn ideal_raw(&self) -> f64 {
        self.model.counts_per_kg.mul_add(self.load_kg, self.model.zero_raw)
    }

    fn read(&mut self) -> (f64, f64) {
        let raw = (self.ideal_raw() + self.rng.jitter(self.model.noise_raw)).round();
        let grams = if self.conversion_factor == 0.0 {
            0.0
        } else {
            (raw - self.tare_offset) / self.conversion_factor
        };
        (raw, grams / 1000.0 * self.gravity)
    }

    fn config_frame(&self) -> GatewayFrame {
        let p = |k: DeviceParam| self.params.get(&k).copied();
        GatewayFrame::Config(DeviceConfig {
            conversion_factor: Some(self.conversion_factor),
            gravity: Some(self.gravity),
            leituras_estaveis: p(DeviceParam::StableReadings),
            tolerancia_estabilidade: p(DeviceParam::StabilityTolerance),
            num_amostras_media: None,
            timeout_calibracao: p(DeviceParam::CalibrationTimeoutMs),
            tare_offset: Some(self.tare_offset),
            capacidade_maxima_gramas: p(DeviceParam::CapacityGrams),
            percentual_acuracia: p(DeviceParam::AccuracyFraction),
        })
    }

    fn reply(&mut self, message: String) {
        self.outbox.push(GatewayFrame::Success { message });
    }

    fn apply(&mut self, cmd: DeviceCommand) -> Result<(), LinkError> {
        match cmd {
            DeviceCommand::Tare => {
                self.tare_offset = self.ideal_raw().round();
                self.reply(format!("tare set to {}", self.tare_offset));
            }
            DeviceCommand::Calibrate { massa_g } => {
                if !(massa_g.is_finite() && massa_g > 0.0) {
                    return Err(LinkError::Rejected(format!("invalid mass {massa_g}")));
                }
                let span = self.ideal_raw() - self.tare_offset;
                if span == 0.0 {
                    return Err(LinkError::Rejected("no load on the cell".into()));
                }
                self.conversion_factor = span / massa_g;
                self.reply(format!("conversion factor {}", self.conversion_factor));
            }
            DeviceCommand::Set { param, value } => {
                if !value.is_finite() {
                    return Err(LinkError::Rejected(format!("non-finite value for {param:?}")));
                }
                match param {
                    DeviceParam::TareOffset => self.tare_offset = value,
                    DeviceParam::ConversionFactor if value == 0.0 => {
                        return Err(LinkError::Rejected("conversion factor of zero".into()));
                    }
                    DeviceParam::ConversionFactor => self.conversion_factor = value,
                    DeviceParam::Gravity => self.gravity = value,
                    _ => {}
                }
                self.params.insert(param, value);
                self.reply(format!("{param:?} = {value}"));
            }
            DeviceCommand::GetConfig => {
                let frame = self.config_frame();
                self.outbox.push(frame);
            }
        }
        Ok(())
    }
}

fn lock(fw: &Mutex<Firmware>) -> MutexGuard<'_, Firmware> {
    match fw.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Command side of the simulated gateway.
#[derive(Clone)]
pub struct SimLink {
    firmware: Arc<Mutex<Firmware>>,
}

impl DeviceLink for SimLink {
    fn is_connected(&self) -> bool {
        lock(&self.firmware).connected
    }

    fn send(&mut self, payload: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut fw = lock(&self.firmware);
        if !fw.connected {
            return Err(Box::new(LinkError::Disconnected));
        }
        let cmd: DeviceCommand = serde_json::from_str(payload).map_err(LinkError::from)?;
        tracing::trace!(?cmd, "simulated device command");
        fw.apply(cmd)?;
        Ok(())
    }
}

pub struct SimulatedDevice {
    firmware: Arc<Mutex<Firmware>>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl SimulatedDevice {
    /// Start streaming `hz` frames per second into `router`.
    pub fn spawn(model: CellModel, hz: u32, router: FrameRouter) -> Self {
        let firmware = Arc::new(Mutex::new(Firmware::new(model)));
        let shutdown = Arc::new(AtomicBool::new(false));
        let period = Duration::from_micros(loadcell_core::util::period_us(hz));
        let period_s = period.as_secs_f64();

        let fw = Arc::clone(&firmware);
        let stop = Arc::clone(&shutdown);
        let join_handle = std::thread::spawn(move || {
            let mut tick: u64 = 0;
            loop {
                if stop.load(Ordering::Relaxed) {
                    tracing::debug!("simulated device received shutdown signal");
                    break;
                }
                let text = {
                    let mut g = lock(&fw);
                    let (raw, forca) = g.read();
                    let mut frames = vec![GatewayFrame::Data {
                        tempo: tick as f64 * period_s,
                        forca,
                        status: Some(1),
                        raw: Some(raw),
                    }];
                    frames.append(&mut g.outbox);
                    if frames.len() == 1 {
                        serde_json::to_string(&frames[0])
                    } else {
                        serde_json::to_string(&frames)
                    }
                };
                match text {
                    Ok(text) => {
                        if let Err(e) = router.route(&text) {
                            tracing::warn!(error = %e, "simulated frame not routed");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "simulated frame not encoded"),
                }
                tick = tick.wrapping_add(1);

                if stop.load(Ordering::Relaxed) {
                    break;
                }
                std::thread::sleep(period);
            }
            tracing::trace!("simulated device thread exiting cleanly");
        });

        Self {
            firmware,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    pub fn link(&self) -> SimLink {
        SimLink {
            firmware: Arc::clone(&self.firmware),
        }
    }

    /// Put `kg` on the cell.
    pub fn set_load_kg(&self, kg: f64) {
        lock(&self.firmware).load_kg = kg;
    }

    pub fn set_connected(&self, connected: bool) {
        lock(&self.firmware).connected = connected;
    }

    pub fn tare_offset(&self) -> f64 {
        lock(&self.firmware).tare_offset
    }

    /// Raw counts per gram currently used by the firmware.
    pub fn conversion_factor(&self) -> f64 {
        lock(&self.firmware).conversion_factor
    }

    pub fn param(&self, p: DeviceParam) -> Option<f64> {
        lock(&self.firmware).params.get(&p).copied()
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("simulated device thread joined"),
                Err(e) => tracing::warn!(?e, "simulated device thread panicked during shutdown"),
            }
        }
    }
}
