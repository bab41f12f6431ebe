use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Short windows so simulator runs finish in about a second
fn write_fast_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[noise]
window_ms = 200
min_samples = 5

[capture]
window_ms = 200
min_samples = 5

[link]
settle_ms = 0

[device]
sample_rate_hz = 200
noise_raw = 4
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

fn loadcell() -> Command {
    Command::cargo_bin("loadcell").unwrap()
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["tolerance", "--capacity-kg", "5", "--accuracy-percent", "0.03", "--std-dev", "0.05", "--alpha", "0.00025"], 0, "tolerance (raw)", "stdout")]
#[case(&["tolerance", "--capacity-kg", "0", "--accuracy-percent", "0.03", "--std-dev", "0.05", "--alpha", "0.00025"], 5, "Invalid cell rating", "stderr")]
#[case(&["tolerance", "--std-dev", "0.05", "--alpha", "0"], 4, "cannot define a line", "stderr")]
#[case(&["calibrate"], 2, "required", "stderr")]
#[case(&["self-check"], 0, "OK", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let assert = loadcell().args(args).assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn fit_reports_slope_and_firmware_factor() {
    let dir = tempdir().unwrap();
    let points = write(&dir, "points.csv", "mass_kg,raw\n0.0,1000\n1.0,5000\n");

    let out = loadcell()
        .arg("--json")
        .arg("fit")
        .arg("--points")
        .arg(&points)
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert!((v["regression"]["alpha"].as_f64().unwrap() - 0.000_25).abs() < 1e-12);
    assert!((v["regression"]["beta"].as_f64().unwrap() + 0.25).abs() < 1e-9);
    assert!((v["conversion_factor"].as_f64().unwrap() - 4.0).abs() < 1e-9);
    assert_eq!(v["warnings"].as_array().unwrap().len(), 0);
}

#[rstest]
#[case("mass_kg,raw\n0.0,1000\n1.0,1000\n", 4, "cannot define a line")]
#[case("raw,grams\n1000,0\n5000,1000\n", 1, "exact header line")]
#[case("mass_kg,raw\n0.0,1000\n", 1, "at least two rows")]
#[case("mass_kg,raw\n1.0,5000\n2.0,9000\n", 6, "no zero point")]
#[case("mass_kg,raw\n0.0,1000\n0.0,1010\n1.0,5000\n", 6, "2 zero points")]
fn fit_rejects_bad_points(#[case] body: &str, #[case] code: i32, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let points = write(&dir, "points.csv", body);
    loadcell()
        .arg("fit")
        .arg("--points")
        .arg(&points)
        .assert()
        .code(code)
        .stderr(predicate::str::contains(needle));
}

#[rstest]
fn self_check_gives_up_after_connect_timeout() {
    let dir = tempdir().unwrap();
    let cfg = write(
        &dir,
        "slow.toml",
        "[link]\nconnect_timeout_ms = 100\n\n[device]\nsample_rate_hz = 1\n",
    );
    loadcell()
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .code(9)
        .stderr(predicate::str::contains("No reading arrived"));
}

#[rstest]
fn json_errors_are_structured() {
    let dir = tempdir().unwrap();
    let points = write(&dir, "points.csv", "mass_kg,raw\n0.0,1000\n1.0,1000\n");
    let out = loadcell()
        .args(["--json", "--log-level", "off", "fit", "--points"])
        .arg(&points)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(4));
    let line = String::from_utf8(out.stderr).unwrap();
    let v: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(v["reason"], "DegenerateInput");
}

#[rstest]
fn invalid_config_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = write(&dir, "bad.toml", "[filter]\nema_alpha = 1.5\n");
    loadcell()
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration is invalid"))
        .stderr(predicate::str::contains("ema_alpha"));
}

#[rstest]
fn filter_emits_one_line_per_reading() {
    let dir = tempdir().unwrap();
    let trace = write(
        &dir,
        "trace.csv",
        "time,force_n\n0.0,0.0\n0.0125,4.9\n0.025,4.9\n0.0375,NaN\n0.05,4.9\n",
    );
    let out = loadcell()
        .args(["--json", "filter", "--input"])
        .arg(&trace)
        .output()
        .unwrap();
    assert!(out.status.success());
    let lines: Vec<serde_json::Value> = String::from_utf8(out.stdout)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0]["filtered_n"], 0.0);
    assert_eq!(lines[0]["dead_zone"], true);
    assert_eq!(lines[1]["stability"], "Unchecked");
    assert_eq!(lines[5]["summary"]["samples"], 5);
}

#[rstest]
fn calibrate_commits_against_simulator() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);
    loadcell()
        .arg("--config")
        .arg(&cfg)
        .args(["calibrate", "--mass-kg", "1", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("calibration complete"))
        .stdout(predicate::str::contains("commands sent:        11"));
}

#[rstest]
fn calibrate_json_report_names_the_plan() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);
    let out = loadcell()
        .arg("--config")
        .arg(&cfg)
        .args(["--json", "calibrate", "--mass-kg", "1", "--skip-rating"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8(out.stdout).unwrap();
    let last: serde_json::Value = serde_json::from_str(stdout.lines().last().unwrap()).unwrap();
    let cf = last["plan"]["conversion_factor"].as_f64().unwrap();
    assert!((cf - 40.0).abs() < 0.1, "counts per gram {cf}");
    // preset(3) + two tares + offset/factor + tolerance + get_config
    assert_eq!(last["report"]["commands_sent"], 9);
    assert_eq!(last["report"]["step"], "Commit");
}

#[rstest]
fn stream_stops_after_duration() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);
    let out = loadcell()
        .arg("--config")
        .arg(&cfg)
        .args(["--json", "stream", "--duration-ms", "300", "--load-kg", "1"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    let summary: serde_json::Value =
        serde_json::from_str(stdout.lines().last().unwrap()).unwrap();
    let n = summary["summary"]["samples"].as_u64().unwrap();
    assert!(n > 10, "only {n} readings in 300 ms at 200 Hz");
}
