//! Commands that drive the simulated gateway: calibrate, stream, self-check.

use crate::cli::RatingArgs;
use crate::offline::rating;
use eyre::{Result, WrapErr};
use loadcell_config::Config;
use loadcell_core::util::{newtons_to_grams, period_us};
use loadcell_core::{
    CalibrationError, CommitSelection, DisplaySession, FilterCfg, FrameRouter, SampleBus, Wizard, WizardCfg,
    WizardStep,
};
use loadcell_device::{CellModel, SimulatedDevice};
use loadcell_traits::MonotonicClock;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

fn spawn_device(cfg: &Config) -> (SimulatedDevice, FrameRouter, SampleBus) {
    let bus = SampleBus::new();
    let router = FrameRouter::new(bus.clone());
    let device = SimulatedDevice::spawn(
        CellModel::from_config(cfg),
        cfg.device.sample_rate_hz,
        router.clone(),
    );
    (device, router, bus)
}

/// Time for frames read before a load change to clear the bus.
fn load_settle(cfg: &Config) -> Duration {
    Duration::from_micros(period_us(cfg.device.sample_rate_hz).saturating_mul(3))
}

fn say(json: bool, step: WizardStep, msg: &str) {
    if json {
        println!("{}", json!({ "step": step, "message": msg }));
    } else {
        println!("[{}] {msg}", step.title());
    }
}

/// Ctrl-C outside a capture window ends the run between steps.
fn check_stop(stop: &AtomicBool) -> Result<()> {
    if stop.load(Ordering::Relaxed) {
        return Err(eyre::Report::new(CalibrationError::Cancelled))
            .wrap_err("calibration interrupted");
    }
    Ok(())
}

pub struct CalibrateArgs {
    pub masses: Vec<f64>,
    pub rating: RatingArgs,
    pub selection: CommitSelection,
}

pub fn run_calibrate(cfg: &Config, args: &CalibrateArgs, json: bool) -> Result<()> {
    // Validate the rating before spending time on windows.
    let spec = rating(cfg, args.rating)?;
    let (device, router, bus) = spawn_device(cfg);
    let mut wizard = Wizard::open(
        device.link(),
        bus,
        WizardCfg::from(cfg),
        Arc::new(MonotonicClock::new()),
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        let cancel = wizard.cancel_handle();
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
            cancel.store(true, Ordering::Relaxed);
        })
        .wrap_err("install Ctrl-C handler")?;
    }

    say(json, wizard.step(), "keep the cell empty and still");
    wizard.advance()?;
    if let Some(n) = wizard.noise() {
        say(
            json,
            WizardStep::NoiseMeasurement,
            &format!(
                "σ = {:.3} g over {} readings",
                newtons_to_grams(n.std_dev, cfg.gravity),
                n.sample_count
            ),
        );
    }

    check_stop(&stop)?;
    wizard.set_spec(spec.capacity_kg, spec.accuracy_percent)?;
    wizard.advance()?;
    check_stop(&stop)?;
    wizard.advance()?;
    if let Some(zero) = wizard.points().first() {
        say(
            json,
            WizardStep::ZeroCapture,
            &format!("zero at {:.1} counts", zero.raw_reading),
        );
    }

    for &mass in &args.masses {
        device.set_load_kg(mass);
        std::thread::sleep(load_settle(cfg));
        check_stop(&stop)?;
        let p = wizard.capture_known_mass(mass)?;
        say(
            json,
            WizardStep::KnownMassCapture,
            &format!("{mass} kg at {:.1} counts", p.raw_reading),
        );
    }
    device.set_load_kg(0.0);

    check_stop(&stop)?;
    wizard.advance()?;
    if let Some(r) = wizard.regression() {
        say(
            json,
            WizardStep::RegressionReview,
            &format!("alpha {:.6e} kg/count, R² {:.6}", r.alpha, r.r_squared),
        );
    }
    for w in wizard.warnings() {
        say(json, WizardStep::RegressionReview, &format!("warning: {w}"));
    }

    check_stop(&stop)?;
    wizard.advance()?;
    wizard.advance()?;
    check_stop(&stop)?;
    let plan = wizard.commit(args.selection)?;

    // The configuration echo rides on the next data frame.
    let deadline = Instant::now() + Duration::from_millis(cfg.link.connect_timeout_ms);
    while router.last_config().is_none() && Instant::now() < deadline {
        check_stop(&stop)?;
        std::thread::sleep(load_settle(cfg));
    }
    let echo = router.last_config();
    if echo.is_none() {
        tracing::warn!("device did not echo its configuration");
    }

    let report = wizard.close();
    if json {
        println!(
            "{}",
            json!({ "report": report, "plan": plan, "device_config": echo })
        );
    } else {
        println!("tare offset:          {:.0}", plan.tare_offset);
        println!("conversion factor:    {:.4} counts/g", plan.conversion_factor);
        println!("stability tolerance:  {:.0}", plan.stability_tolerance);
        println!("capacity (g):         {:.0}", plan.capacity_grams);
        println!("accuracy fraction:    {}", plan.accuracy_fraction);
        println!("commands sent:        {}", report.commands_sent);
        println!("calibration complete");
    }
    Ok(())
}

pub fn run_stream(cfg: &Config, duration: Duration, load_kg: f64, json: bool) -> Result<()> {
    let fcfg = FilterCfg::try_from(cfg)?;
    let (device, _router, bus) = spawn_device(cfg);
    let mut session = DisplaySession::new(fcfg, bus.subscribe());
    device.set_load_kg(load_kg);

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))
            .wrap_err("install Ctrl-C handler")?;
    }

    let end = Instant::now() + duration;
    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= end {
            break;
        }
        let Some(row) = session.poll(end.min(now + Duration::from_millis(100))) else {
            continue;
        };
        let grams = newtons_to_grams(row.filtered.filtered_n, cfg.gravity);
        if json {
            println!(
                "{}",
                json!({
                    "time": row.sample.time,
                    "raw": row.sample.raw_count,
                    "filtered_g": grams,
                    "stability": row.filtered.stability,
                    "load_percent": row.load_percent,
                })
            );
        } else {
            println!(
                "{:>9.3} s  {:>10.2} g  {:>6.2} %  {:?}",
                row.sample.time, grams, row.load_percent, row.filtered.stability
            );
        }
    }

    let snap = session.snapshot();
    tracing::info!(samples = snap.samples, "stream stopped");
    if json {
        println!("{}", json!({ "summary": snap }));
    } else {
        println!(
            "{} readings, {:.1} readings/s",
            snap.samples,
            snap.readings_per_sec.unwrap_or(0.0)
        );
    }
    Ok(())
}

/// Two readings within `link.connect_timeout_ms` prove the gateway streams.
pub fn run_self_check(cfg: &Config) -> Result<()> {
    let fcfg = FilterCfg::try_from(cfg)?;
    let timeout_ms = cfg.link.connect_timeout_ms;
    let (device, _router, bus) = spawn_device(cfg);
    let mut session = DisplaySession::new(fcfg, bus.subscribe());

    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    let mut seen = 0usize;
    let mut last_raw = f64::NAN;
    while seen < 2 {
        let Some(row) = session.poll(deadline) else {
            break;
        };
        seen += 1;
        last_raw = row.sample.raw_count;
    }
    drop(device);
    if seen < 2 {
        return Err(eyre::Report::new(CalibrationError::Timeout)).wrap_err(format!(
            "simulated device produced {seen} of 2 readings within {timeout_ms} ms"
        ));
    }
    tracing::info!(raw = last_raw, "simulator streaming");
    println!("OK");
    Ok(())
}
