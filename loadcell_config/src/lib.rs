#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and calibration-point parsing for the load-cell tool.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//!   Every table is optional; omitted keys fall back to the bench defaults.
//! - The calibration-point CSV loader enforces headers and value ranges but
//!   leaves fitting to `loadcell_core`.
use serde::Deserialize;

/// Standard gravity in m/s², used when the config does not override it.
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Calibration point CSV schema.
///
/// Expected headers:
/// mass_kg,raw
///
/// Example:
/// mass_kg,raw
/// 0.0,842913
/// 1.0,882913
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct CalibrationRow {
    pub mass_kg: f64,
    pub raw: f64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FilterCfg {
    /// EMA smoothing factor in (0.0, 1.0]; 1.0 passes samples through.
    pub ema_alpha: f64,
    /// Suppress readings below the cell's declared error to exactly zero.
    pub dead_zone: bool,
    /// Round readings to the decade resolution of the cell error.
    pub rounding: bool,
    /// Flag samples outside mean ± k·σ of the trailing buffer as unstable.
    pub anti_noise: bool,
    pub anti_noise_multiplier: f64,
    /// Trailing buffer capacity (samples) for the anti-noise statistics.
    pub noise_buffer: usize,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            ema_alpha: 0.2,
            dead_zone: true,
            rounding: true,
            anti_noise: false,
            anti_noise_multiplier: 2.0,
            noise_buffer: 50,
        }
    }
}

/// Declared load-cell rating.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CellCfg {
    pub capacity_kg: f64,
    /// Accuracy class in percent of full scale (0.05 means 0.05 %).
    pub accuracy_percent: f64,
}

impl Default for CellCfg {
    fn default() -> Self {
        Self {
            capacity_kg: 5.0,
            accuracy_percent: 0.05,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NoiseCfg {
    /// Length of the unloaded noise burst (ms)
    pub window_ms: u64,
    pub min_samples: usize,
}

impl Default for NoiseCfg {
    fn default() -> Self {
        Self {
            window_ms: 5_000,
            min_samples: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CaptureCfg {
    /// Averaging window for zero and known-mass captures (ms)
    pub window_ms: u64,
    pub min_samples: usize,
}

impl Default for CaptureCfg {
    fn default() -> Self {
        Self {
            window_ms: 3_000,
            min_samples: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ToleranceCfg {
    /// Multiplier applied to (cell error + noise) before conversion to raw units
    pub safety_margin: f64,
    /// Lower bound for the stability tolerance in raw units
    pub floor_raw: f64,
}

impl Default for ToleranceCfg {
    fn default() -> Self {
        Self {
            safety_margin: 1.5,
            floor_raw: 100.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LinkCfg {
    /// Delay after each device command before the next one (ms)
    pub settle_ms: u64,
    /// Longest wait for the gateway's first readings or its config echo (ms)
    pub connect_timeout_ms: u64,
    /// Relax the firmware stability detector when the wizard opens
    pub safe_preset: bool,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            settle_ms: 300,
            connect_timeout_ms: 5_000,
            safe_preset: true,
        }
    }
}

/// Parameters of the simulated load cell used by `calibrate`, `stream` and `self-check`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceCfg {
    pub sample_rate_hz: u32,
    /// ADC reading with nothing on the cell
    pub zero_raw: f64,
    pub counts_per_kg: f64,
    /// Peak amplitude of the simulated ADC noise (counts)
    pub noise_raw: f64,
    pub seed: u64,
}

impl Default for DeviceCfg {
    fn default() -> Self {
        Self {
            sample_rate_hz: 80,
            zero_raw: 842_913.0,
            counts_per_kg: 40_000.0,
            noise_raw: 4.0,
            seed: 7,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local gravity in m/s²
    pub gravity: f64,
    pub filter: FilterCfg,
    pub cell: CellCfg,
    pub noise: NoiseCfg,
    pub capture: CaptureCfg,
    pub tolerance: ToleranceCfg,
    pub link: LinkCfg,
    pub device: DeviceCfg,
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gravity: STANDARD_GRAVITY,
            filter: FilterCfg::default(),
            cell: CellCfg::default(),
            noise: NoiseCfg::default(),
            capture: CaptureCfg::default(),
            tolerance: ToleranceCfg::default(),
            link: LinkCfg::default(),
            device: DeviceCfg::default(),
            logging: Logging::default(),
        }
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Load known-mass calibration points from CSV.
///
/// Rows are returned in file order; fitting and the zero-point requirement are
/// enforced by the calibration engine.
pub fn load_points_csv(path: &std::path::Path) -> eyre::Result<Vec<CalibrationRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["mass_kg", "raw"];
    let actual: Vec<String> = headers.iter().map(ToString::to_string).collect();
    if actual != expected {
        eyre::bail!(
            "calibration CSV must have headers 'mass_kg,raw', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        let line = idx + 2;
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", line, e))?;
        if !row.mass_kg.is_finite() || row.mass_kg < 0.0 {
            eyre::bail!("invalid CSV row {line}: mass_kg must be a finite value >= 0");
        }
        if !row.raw.is_finite() {
            eyre::bail!("invalid CSV row {line}: raw must be finite");
        }
        rows.push(row);
    }

    if rows.len() < 2 {
        eyre::bail!(
            "calibration requires at least two rows, got {}",
            rows.len()
        );
    }
    Ok(rows)
}

/// Recorded force trace, one gateway reading per row.
///
/// Expected headers:
/// time,force_n
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct TraceRow {
    pub time: f64,
    pub force_n: f64,
}

/// Load a recorded force trace for offline filtering.
///
/// Non-finite forces are kept; the filter decides what to do with them.
pub fn load_trace_csv(path: &std::path::Path) -> eyre::Result<Vec<TraceRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open trace CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<String> = headers.iter().map(ToString::to_string).collect();
    if actual != ["time", "force_n"] {
        eyre::bail!(
            "trace CSV must have headers 'time,force_n', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<TraceRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        if !row.time.is_finite() {
            eyre::bail!("invalid CSV row {}: time must be finite", idx + 2);
        }
        rows.push(row);
    }
    Ok(rows)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        if !(self.gravity.is_finite() && self.gravity > 0.0) {
            eyre::bail!("gravity must be a finite value > 0");
        }

        // Filter
        if !(self.filter.ema_alpha > 0.0 && self.filter.ema_alpha <= 1.0) {
            eyre::bail!("filter.ema_alpha must be in (0.0, 1.0]");
        }
        if !(self.filter.anti_noise_multiplier.is_finite() && self.filter.anti_noise_multiplier > 0.0)
        {
            eyre::bail!("filter.anti_noise_multiplier must be > 0");
        }
        if self.filter.noise_buffer < 2 {
            eyre::bail!("filter.noise_buffer must be >= 2");
        }
        if self.filter.noise_buffer > 10_000 {
            eyre::bail!("filter.noise_buffer is unreasonably large (>10000)");
        }

        // Cell
        if !(self.cell.capacity_kg.is_finite() && self.cell.capacity_kg > 0.0) {
            eyre::bail!("cell.capacity_kg must be > 0");
        }
        if !(self.cell.accuracy_percent.is_finite() && self.cell.accuracy_percent > 0.0) {
            eyre::bail!("cell.accuracy_percent must be > 0");
        }
        if self.cell.accuracy_percent > 100.0 {
            eyre::bail!("cell.accuracy_percent must be <= 100");
        }

        // Measurement windows
        if self.noise.window_ms == 0 {
            eyre::bail!("noise.window_ms must be >= 1");
        }
        if self.noise.min_samples < 2 {
            eyre::bail!("noise.min_samples must be >= 2");
        }
        if self.capture.window_ms == 0 {
            eyre::bail!("capture.window_ms must be >= 1");
        }
        if self.capture.min_samples == 0 {
            eyre::bail!("capture.min_samples must be >= 1");
        }
        if self.noise.window_ms > 10 * 60 * 1000 || self.capture.window_ms > 10 * 60 * 1000 {
            eyre::bail!("measurement windows are unreasonably large (>10min)");
        }

        // Tolerance
        if !(self.tolerance.safety_margin.is_finite() && self.tolerance.safety_margin >= 1.0) {
            eyre::bail!("tolerance.safety_margin must be >= 1.0");
        }
        if !(self.tolerance.floor_raw.is_finite() && self.tolerance.floor_raw >= 0.0) {
            eyre::bail!("tolerance.floor_raw must be >= 0");
        }

        // Link
        if self.link.settle_ms > 60_000 {
            eyre::bail!("link.settle_ms is unreasonably large (>60s)");
        }
        if self.link.connect_timeout_ms == 0 {
            eyre::bail!("link.connect_timeout_ms must be >= 1");
        }

        // Simulated device
        if self.device.sample_rate_hz == 0 {
            eyre::bail!("device.sample_rate_hz must be > 0");
        }
        if !(self.device.counts_per_kg.is_finite() && self.device.counts_per_kg != 0.0) {
            eyre::bail!("device.counts_per_kg must be finite and non-zero");
        }
        if !(self.device.noise_raw.is_finite() && self.device.noise_raw >= 0.0) {
            eyre::bail!("device.noise_raw must be >= 0");
        }
        if !self.device.zero_raw.is_finite() {
            eyre::bail!("device.zero_raw must be finite");
        }

        // Logging
        if let Some(rotation) = self.logging.rotation.as_deref()
            && !matches!(rotation, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        Ok(())
    }
}
