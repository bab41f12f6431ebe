//! Guided calibration: noise burst, cell rating, zero and known-mass captures,
//! least-squares review, summary and commit of the derived firmware parameters.
//!
//! Forward moves run the current step's work and only change step when it
//! succeeds; backward moves are unconditional and keep captured data. Point
//! edits drop every result derived from the old point set.
//!
//! Windows borrow a fresh listener from the feed and release it when they
//! finish, fail or are cancelled through the handle from [`Wizard::cancel_handle`].
//! Each forward move or capture starts with a lowered flag, so a cancel raised
//! while nothing was measuring does not abort a later window.

use crate::bus::SampleFeed;
use crate::command::{Commander, DeviceCommand, DeviceParam, safe_preset};
use crate::config::WizardCfg;
use crate::error::{CalibrationError, Result};
use crate::noise::{self, NoiseProfile};
use crate::regression::{QualityWarning, RegressionResult, fit};
use crate::tolerance::{ToleranceSpec, derive_tolerance};
use crate::types::{CalibrationPoint, CellSpec};
use loadcell_traits::{Clock, DeviceLink};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WizardStep {
    NoiseMeasurement,
    SpecInput,
    ZeroCapture,
    KnownMassCapture,
    RegressionReview,
    Summary,
    Commit,
}

impl WizardStep {
    pub const ALL: [Self; 7] = [
        Self::NoiseMeasurement,
        Self::SpecInput,
        Self::ZeroCapture,
        Self::KnownMassCapture,
        Self::RegressionReview,
        Self::Summary,
        Self::Commit,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn next(self) -> Option<Self> {
        match self {
            Self::NoiseMeasurement => Some(Self::SpecInput),
            Self::SpecInput => Some(Self::ZeroCapture),
            Self::ZeroCapture => Some(Self::KnownMassCapture),
            Self::KnownMassCapture => Some(Self::RegressionReview),
            Self::RegressionReview => Some(Self::Summary),
            Self::Summary => Some(Self::Commit),
            Self::Commit => None,
        }
    }

    pub const fn prev(self) -> Option<Self> {
        match self {
            Self::NoiseMeasurement => None,
            Self::SpecInput => Some(Self::NoiseMeasurement),
            Self::ZeroCapture => Some(Self::SpecInput),
            Self::KnownMassCapture => Some(Self::ZeroCapture),
            Self::RegressionReview => Some(Self::KnownMassCapture),
            Self::Summary => Some(Self::RegressionReview),
            Self::Commit => Some(Self::Summary),
        }
    }

    pub const fn title(self) -> &'static str {
        match self {
            Self::NoiseMeasurement => "noise measurement",
            Self::SpecInput => "cell rating",
            Self::ZeroCapture => "zero capture",
            Self::KnownMassCapture => "known masses",
            Self::RegressionReview => "regression review",
            Self::Summary => "summary",
            Self::Commit => "commit",
        }
    }
}

/// Parameter groups to write on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommitSelection {
    /// `tareOffset` and `conversionFactor`
    pub offset_and_factor: bool,
    /// `capacidadeMaximaGramas` and `percentualAcuracia`
    pub cell_spec: bool,
    /// `toleranciaEstabilidade`
    pub tolerance: bool,
}

impl Default for CommitSelection {
    fn default() -> Self {
        Self {
            offset_and_factor: true,
            cell_spec: true,
            tolerance: true,
        }
    }
}

impl CommitSelection {
    pub const fn any(&self) -> bool {
        self.offset_and_factor || self.cell_spec || self.tolerance
    }
}

/// Firmware parameters derived from a finished calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CommitPlan {
    /// Zero reading in raw counts, rounded.
    pub tare_offset: f64,
    /// Raw counts per gram.
    pub conversion_factor: f64,
    /// Rounded stability tolerance in raw units.
    pub stability_tolerance: f64,
    pub capacity_grams: f64,
    /// Accuracy as a fraction (0.0005 for 0.05 %).
    pub accuracy_fraction: f64,
}

impl CommitPlan {
    pub fn derive(
        zero: &CalibrationPoint,
        regression: &RegressionResult,
        tolerance: &ToleranceSpec,
        spec: &CellSpec,
    ) -> Result<Self> {
        let plan = Self {
            tare_offset: zero.raw_reading.round(),
            conversion_factor: 1.0 / (regression.alpha * 1000.0),
            stability_tolerance: tolerance.tolerance_raw_units.round(),
            capacity_grams: spec.capacity_g(),
            accuracy_fraction: spec.accuracy_percent / 100.0,
        };
        let fields = [
            ("tare offset", plan.tare_offset),
            ("conversion factor", plan.conversion_factor),
            ("stability tolerance", plan.stability_tolerance),
            ("capacity", plan.capacity_grams),
            ("accuracy", plan.accuracy_fraction),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(eyre::Report::new(CalibrationError::NonFiniteResult(
                (*name).to_string(),
            )));
        }
        Ok(plan)
    }

    pub fn commands(&self, sel: CommitSelection) -> Vec<DeviceCommand> {
        let mut out = Vec::new();
        if sel.offset_and_factor {
            out.push(DeviceCommand::set(DeviceParam::TareOffset, self.tare_offset));
            out.push(DeviceCommand::set(
                DeviceParam::ConversionFactor,
                self.conversion_factor,
            ));
        }
        if sel.cell_spec {
            out.push(DeviceCommand::set(
                DeviceParam::CapacityGrams,
                self.capacity_grams,
            ));
            out.push(DeviceCommand::set(
                DeviceParam::AccuracyFraction,
                self.accuracy_fraction,
            ));
        }
        if sel.tolerance {
            out.push(DeviceCommand::set(
                DeviceParam::StabilityTolerance,
                self.stability_tolerance,
            ));
        }
        out
    }
}

/// Serializable snapshot for the UI.
#[derive(Debug, Clone, Serialize)]
pub struct WizardReport {
    pub step: WizardStep,
    pub preset_applied: bool,
    pub noise: Option<NoiseProfile>,
    pub spec: Option<CellSpec>,
    pub points: Vec<CalibrationPoint>,
    pub regression: Option<RegressionResult>,
    pub warnings: Vec<QualityWarning>,
    pub tolerance: Option<ToleranceSpec>,
    pub plan: Option<CommitPlan>,
    pub commands_sent: usize,
}

pub struct Wizard<L: DeviceLink, F: SampleFeed> {
    step: WizardStep,
    cfg: WizardCfg,
    commander: Commander<L>,
    feed: F,
    clock: Arc<dyn Clock + Send + Sync>,
    cancel: Arc<AtomicBool>,
    window: Option<F::Source>,
    preset_applied: bool,
    noise: Option<NoiseProfile>,
    spec_input: Option<(f64, f64)>,
    spec: Option<CellSpec>,
    zero: Option<CalibrationPoint>,
    known: Vec<CalibrationPoint>,
    regression: Option<RegressionResult>,
    warnings: Vec<QualityWarning>,
    tolerance: Option<ToleranceSpec>,
    plan: Option<CommitPlan>,
}

fn state_error(msg: impl Into<String>) -> eyre::Report {
    eyre::Report::new(CalibrationError::State(msg.into()))
}

fn is_cancelled(err: &eyre::Report) -> bool {
    matches!(
        err.downcast_ref::<CalibrationError>(),
        Some(CalibrationError::Cancelled)
    )
}

impl<L: DeviceLink, F: SampleFeed> Wizard<L, F> {
    /// Start a wizard at the noise step, applying the safe preset when configured.
    pub fn open(link: L, feed: F, cfg: WizardCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let mut commander = Commander::new(link, Arc::clone(&clock), cfg.link.settle);
        let mut preset_applied = false;
        if cfg.link.safe_preset {
            match commander.send_all(&safe_preset()) {
                Ok(_) => preset_applied = true,
                Err(e) => tracing::warn!(error = %e, "safe preset not applied"),
            }
        }
        tracing::info!(preset_applied, "calibration wizard opened");
        Self {
            step: WizardStep::NoiseMeasurement,
            cfg,
            commander,
            feed,
            clock,
            cancel: Arc::new(AtomicBool::new(false)),
            window: None,
            preset_applied,
            noise: None,
            spec_input: None,
            spec: None,
            zero: None,
            known: Vec::new(),
            regression: None,
            warnings: Vec::new(),
            tolerance: None,
            plan: None,
        }
    }

    pub const fn step(&self) -> WizardStep {
        self.step
    }

    /// Raising the returned flag aborts the running window with `Cancelled`.
    /// The flag is lowered again when the next forward move or capture begins.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub const fn window_active(&self) -> bool {
        self.window.is_some()
    }

    pub const fn noise(&self) -> Option<&NoiseProfile> {
        self.noise.as_ref()
    }

    pub const fn spec(&self) -> Option<&CellSpec> {
        self.spec.as_ref()
    }

    pub const fn regression(&self) -> Option<&RegressionResult> {
        self.regression.as_ref()
    }

    pub fn warnings(&self) -> &[QualityWarning] {
        &self.warnings
    }

    pub const fn tolerance(&self) -> Option<&ToleranceSpec> {
        self.tolerance.as_ref()
    }

    pub const fn link(&self) -> &L {
        self.commander.link()
    }

    /// Zero point first, then known masses in capture order.
    pub fn points(&self) -> Vec<CalibrationPoint> {
        self.zero.iter().chain(self.known.iter()).copied().collect()
    }

    /// Enter the cell rating; validated when leaving the rating step.
    pub fn set_spec(&mut self, capacity_kg: f64, accuracy_percent: f64) -> Result<()> {
        if self.step != WizardStep::SpecInput {
            return Err(state_error(format!(
                "cell rating is entered at the {} step, wizard is at {}",
                WizardStep::SpecInput.title(),
                self.step.title()
            )));
        }
        self.spec_input = Some((capacity_kg, accuracy_percent));
        Ok(())
    }

    pub fn advance(&mut self) -> Result<WizardStep> {
        self.cancel.store(false, Ordering::Relaxed);
        let next = match self.step {
            WizardStep::NoiseMeasurement => {
                self.noise = Some(self.measure_noise()?);
                WizardStep::SpecInput
            }
            WizardStep::SpecInput => {
                let (capacity, accuracy) = self.spec_input.ok_or_else(|| {
                    eyre::Report::new(CalibrationError::InvalidSpec(
                        "no cell rating entered".into(),
                    ))
                })?;
                let spec = CellSpec::new(capacity, accuracy)?;
                if self.spec != Some(spec) {
                    self.invalidate();
                }
                self.spec = Some(spec);
                WizardStep::ZeroCapture
            }
            WizardStep::ZeroCapture => {
                self.capture_zero()?;
                WizardStep::KnownMassCapture
            }
            WizardStep::KnownMassCapture => {
                self.review()?;
                WizardStep::RegressionReview
            }
            WizardStep::RegressionReview => {
                // Leave the cell zeroed for the operator after removing the masses.
                if let Err(e) = self.commander.send(&DeviceCommand::Tare) {
                    tracing::warn!(error = %e, "final tare not sent");
                }
                WizardStep::Summary
            }
            WizardStep::Summary => WizardStep::Commit,
            WizardStep::Commit => {
                return Err(state_error("commit is the last step"));
            }
        };
        tracing::info!(from = self.step.title(), to = next.title(), "wizard advanced");
        self.step = next;
        Ok(next)
    }

    pub fn back(&mut self) -> WizardStep {
        self.window = None;
        if let Some(prev) = self.step.prev() {
            tracing::info!(from = self.step.title(), to = prev.title(), "wizard back");
            self.step = prev;
        }
        self.step
    }

    /// Average the reading with `mass_kg` on the cell and add it as a point.
    pub fn capture_known_mass(&mut self, mass_kg: f64) -> Result<CalibrationPoint> {
        if self.step != WizardStep::KnownMassCapture {
            return Err(state_error(format!(
                "known masses are captured at the {} step, wizard is at {}",
                WizardStep::KnownMassCapture.title(),
                self.step.title()
            )));
        }
        if !(mass_kg.is_finite() && mass_kg > 0.0) {
            return Err(eyre::Report::new(CalibrationError::InvalidPoint(format!(
                "known mass must be > 0 kg, got {mass_kg}"
            ))));
        }
        self.cancel.store(false, Ordering::Relaxed);
        let raw = self.capture_mean()?;
        let point = CalibrationPoint::new(mass_kg, raw);
        self.known.push(point);
        self.invalidate();
        tracing::info!(mass_kg, raw, points = self.known.len() + 1, "known mass captured");
        Ok(point)
    }

    /// Remove a point by its position in [`Wizard::points`]. The zero point stays.
    /// Only allowed while known masses are being captured.
    pub fn remove_point(&mut self, index: usize) -> Result<CalibrationPoint> {
        if self.step != WizardStep::KnownMassCapture {
            return Err(state_error(format!(
                "points are removed at the {} step, wizard is at {}",
                WizardStep::KnownMassCapture.title(),
                self.step.title()
            )));
        }
        let offset = usize::from(self.zero.is_some());
        if self.zero.is_some() && index == 0 {
            return Err(eyre::Report::new(CalibrationError::InvalidPoint(
                "the zero point cannot be removed".into(),
            )));
        }
        let i = index
            .checked_sub(offset)
            .filter(|i| *i < self.known.len())
            .ok_or_else(|| {
                eyre::Report::new(CalibrationError::InvalidPoint(format!(
                    "no point at index {index}"
                )))
            })?;
        let removed = self.known.remove(i);
        self.invalidate();
        Ok(removed)
    }

    /// Write the selected parameter groups, then ask the device to echo its config.
    pub fn commit(&mut self, selection: CommitSelection) -> Result<CommitPlan> {
        if self.step != WizardStep::Commit {
            return Err(state_error(format!(
                "commit is only possible at the last step, wizard is at {}",
                self.step.title()
            )));
        }
        if !selection.any() {
            return Err(state_error("no parameter group selected"));
        }
        let (Some(zero), Some(regression), Some(tolerance), Some(spec)) = (
            self.zero.as_ref(),
            self.regression.as_ref(),
            self.tolerance.as_ref(),
            self.spec.as_ref(),
        ) else {
            return Err(state_error("calibration results are incomplete"));
        };
        let plan = CommitPlan::derive(zero, regression, tolerance, spec)?;
        let cmds = plan.commands(selection);
        self.commander.send_all(&cmds)?;
        self.commander.send(&DeviceCommand::GetConfig)?;
        tracing::info!(?plan, sent = cmds.len(), "calibration committed");
        self.plan = Some(plan);
        Ok(plan)
    }

    pub fn report(&self) -> WizardReport {
        WizardReport {
            step: self.step,
            preset_applied: self.preset_applied,
            noise: self.noise,
            spec: self.spec,
            points: self.points(),
            regression: self.regression,
            warnings: self.warnings.clone(),
            tolerance: self.tolerance,
            plan: self.plan,
            commands_sent: self.commander.sent(),
        }
    }

    /// Release the listener and return the final snapshot.
    pub fn close(mut self) -> WizardReport {
        self.window = None;
        let report = self.report();
        tracing::info!(step = self.step.title(), "calibration wizard closed");
        report
    }

    fn invalidate(&mut self) {
        self.regression = None;
        self.warnings.clear();
        self.tolerance = None;
        self.plan = None;
    }

    fn finish_window<T>(&mut self, out: Result<T>) -> Result<T> {
        self.window = None;
        if let Err(e) = &out
            && is_cancelled(e)
        {
            self.cancel.store(false, Ordering::Relaxed);
            tracing::info!(step = self.step.title(), "measurement cancelled");
        }
        out
    }

    fn measure_noise(&mut self) -> Result<NoiseProfile> {
        let clock = Arc::clone(&self.clock);
        let cancel = Arc::clone(&self.cancel);
        let source = self.window.insert(self.feed.subscribe());
        let out = noise::measure_noise(source, &self.cfg.noise, &*clock, Some(&cancel));
        self.finish_window(out)
    }

    fn capture_mean(&mut self) -> Result<f64> {
        let clock = Arc::clone(&self.clock);
        let cancel = Arc::clone(&self.cancel);
        let source = self.window.insert(self.feed.subscribe());
        let out = noise::collect_mean(source, &self.cfg.capture, &*clock, Some(&cancel));
        self.finish_window(out)
    }

    fn capture_zero(&mut self) -> Result<()> {
        self.commander.send(&DeviceCommand::Tare)?;
        let raw = self.capture_mean()?;
        self.zero = Some(CalibrationPoint::new(0.0, raw));
        self.invalidate();
        tracing::info!(raw, "zero captured");
        Ok(())
    }

    fn review(&mut self) -> Result<()> {
        if self.zero.is_none() || self.known.is_empty() {
            return Err(eyre::Report::new(CalibrationError::InvalidPoint(format!(
                "regression needs the zero point and at least one known mass, have {} point(s)",
                self.points().len()
            ))));
        }
        let (Some(noise), Some(spec)) = (self.noise, self.spec) else {
            return Err(state_error("noise profile and cell rating are required"));
        };
        let regression = fit(&self.points())?;
        let warnings = regression.quality(Some(&spec));
        for w in &warnings {
            tracing::warn!(%w, "calibration quality");
        }
        let tolerance = derive_tolerance(
            &spec,
            &noise,
            regression.alpha,
            &self.cfg.tolerance,
            self.cfg.gravity,
        )?;
        self.regression = Some(regression);
        self.warnings = warnings;
        self.tolerance = Some(tolerance);
        Ok(())
    }
}
