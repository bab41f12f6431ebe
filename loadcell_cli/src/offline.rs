//! Commands that work on files and numbers only: fit, tolerance, filter.

use crate::cli::RatingArgs;
use eyre::{Result, WrapErr};
use loadcell_config::Config;
use loadcell_core::monitor::StreamMonitor;
use loadcell_core::util::newtons_to_grams;
use loadcell_core::{
    CalibrationPoint, CellSpec, FilterCfg, FilterState, NoiseProfile, ToleranceCfg, derive_tolerance,
    filter, fit, require_single_zero,
};
use serde_json::json;
use std::path::Path;

pub fn rating(cfg: &Config, args: RatingArgs) -> Result<CellSpec> {
    CellSpec::new(
        args.capacity_kg.unwrap_or(cfg.cell.capacity_kg),
        args.accuracy_percent.unwrap_or(cfg.cell.accuracy_percent),
    )
}

pub fn run_fit(cfg: &Config, points_path: &Path, args: RatingArgs, json: bool) -> Result<()> {
    let rows = loadcell_config::load_points_csv(points_path)?;
    let points: Vec<CalibrationPoint> = rows.iter().map(CalibrationPoint::from).collect();
    require_single_zero(&points).wrap_err_with(|| format!("check {}", points_path.display()))?;
    let spec = rating(cfg, args)?;
    let reg = fit(&points).wrap_err("fit calibration points")?;
    let warnings = reg.quality(Some(&spec));
    for w in &warnings {
        tracing::warn!(%w, "calibration quality");
    }
    // Firmware wants raw counts per gram; the fit gives kg per count.
    let conversion_factor = 1.0 / (reg.alpha * 1000.0);

    if json {
        println!(
            "{}",
            json!({
                "regression": reg,
                "conversion_factor": conversion_factor,
                "spec": spec,
                "warnings": warnings,
            })
        );
    } else {
        println!("points:            {}", reg.point_count);
        println!("alpha (kg/count):  {:.6e}", reg.alpha);
        println!("beta (kg):         {:.6}", reg.beta);
        println!("R²:                {:.6}", reg.r_squared);
        println!("max residual (g):  {:.3}", reg.max_residual_kg * 1000.0);
        println!("conversion factor: {conversion_factor:.4} counts/g");
        if warnings.is_empty() {
            println!("quality: ok");
        }
        for w in &warnings {
            println!("warning: {w}");
        }
    }
    Ok(())
}

pub fn run_tolerance(
    cfg: &Config,
    args: RatingArgs,
    std_dev: f64,
    alpha: f64,
    json: bool,
) -> Result<()> {
    let spec = rating(cfg, args)?;
    if !(std_dev.is_finite() && std_dev >= 0.0) {
        eyre::bail!("--std-dev must be a finite value >= 0, got {std_dev}");
    }
    let noise = NoiseProfile {
        std_dev,
        mean: 0.0,
        sample_count: 0,
    };
    let t = derive_tolerance(
        &spec,
        &noise,
        alpha,
        &ToleranceCfg::from(&cfg.tolerance),
        cfg.gravity,
    )?;
    if json {
        println!("{}", json!({ "tolerance": t }));
    } else {
        println!("cell error (g):      {:.3}", t.cell_error_g);
        println!("noise (g):           {:.3}", t.noise_g);
        println!("min tolerance (g):   {:.3}", t.min_tolerance_g);
        println!("counts per gram:     {:.4}", t.conversion_factor);
        println!(
            "tolerance (raw):     {:.0}{}",
            t.tolerance_raw_units,
            if t.floored { " (floor)" } else { "" }
        );
    }
    Ok(())
}

pub fn run_filter(cfg: &Config, input: &Path, anti_noise: bool, json: bool) -> Result<()> {
    let rows = loadcell_config::load_trace_csv(input)?;
    let mut fcfg = FilterCfg::try_from(cfg)?;
    fcfg.anti_noise |= anti_noise;
    let mut state = FilterState::new(&fcfg);
    let mut monitor = StreamMonitor::new();

    for row in &rows {
        let out = filter(row.force_n, &mut state, &fcfg);
        monitor.record(row.time, out.filtered_n);
        if json {
            println!(
                "{}",
                json!({
                    "time": row.time,
                    "force_n": row.force_n,
                    "filtered_n": out.filtered_n,
                    "filtered_g": newtons_to_grams(out.filtered_n, fcfg.gravity),
                    "stability": out.stability,
                    "dead_zone": out.dead_zone,
                })
            );
        } else {
            println!(
                "{:>10.4}  {:>10.2} g  {:?}{}",
                row.time,
                newtons_to_grams(out.filtered_n, fcfg.gravity),
                out.stability,
                if out.dead_zone { "  dz" } else { "" }
            );
        }
    }

    let snap = monitor.snapshot();
    tracing::info!(samples = snap.samples, rps = ?snap.readings_per_sec, "trace filtered");
    if json {
        println!("{}", json!({ "summary": snap }));
    } else if let Some(rps) = snap.readings_per_sec {
        println!("{} samples, {rps:.1} readings/s", snap.samples);
    } else {
        println!("{} samples", snap.samples);
    }
    Ok(())
}
