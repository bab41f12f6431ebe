//! Wizard flows driven by a scripted feed on a manual clock.

use loadcell_core::command::DeviceParam;
use loadcell_core::mocks::{RecordingLink, ScriptedFeed};
use loadcell_core::{
    CalibrationError, CommitSelection, DeviceCommand, Wizard, WizardCfg, WizardStep,
};
use loadcell_traits::ManualClock;
use rstest::{fixture, rstest};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

const G: f64 = 9.80665;

struct Bench {
    clock: ManualClock,
    feed: ScriptedFeed,
    link: RecordingLink,
}

#[fixture]
fn bench() -> Bench {
    let clock = ManualClock::new();
    let feed = ScriptedFeed::new(clock.clone(), Duration::from_millis(10), 0.01);
    feed.set_load(1000.0, 0.0);
    Bench {
        clock,
        feed,
        link: RecordingLink::new(),
    }
}

fn open(b: &Bench) -> Wizard<RecordingLink, ScriptedFeed> {
    Wizard::open(
        b.link.clone(),
        b.feed.clone(),
        WizardCfg::default(),
        Arc::new(b.clock.clone()),
    )
}

fn kind(err: &eyre::Report) -> Option<&CalibrationError> {
    err.downcast_ref::<CalibrationError>()
}

/// Drive a fresh wizard up to the known-mass step with the zero point captured.
fn to_known_mass(b: &Bench) -> Wizard<RecordingLink, ScriptedFeed> {
    let mut w = open(b);
    assert_eq!(w.advance().unwrap(), WizardStep::SpecInput);
    w.set_spec(5.0, 0.05).unwrap();
    assert_eq!(w.advance().unwrap(), WizardStep::ZeroCapture);
    assert_eq!(w.advance().unwrap(), WizardStep::KnownMassCapture);
    w
}

#[rstest]
fn full_calibration_commits_firmware_parameters(bench: Bench) {
    let mut w = open(&bench);
    assert_eq!(bench.link.commands().len(), 3, "safe preset on open");

    w.advance().unwrap();
    let noise = *w.noise().unwrap();
    assert!((noise.std_dev - 0.01).abs() < 1e-9);
    assert_eq!(noise.sample_count, 500);

    w.set_spec(5.0, 0.05).unwrap();
    w.advance().unwrap();
    w.advance().unwrap();
    assert!((w.points()[0].raw_reading - 1000.0).abs() < 1e-6);

    bench.feed.set_load(5000.0, G);
    let p = w.capture_known_mass(1.0).unwrap();
    assert!((p.raw_reading - 5000.0).abs() < 1e-6);

    assert_eq!(w.advance().unwrap(), WizardStep::RegressionReview);
    let r = *w.regression().unwrap();
    assert!((r.alpha - 0.000_25).abs() < 1e-12);
    assert!((r.beta + 0.25).abs() < 1e-6);
    assert!(w.warnings().is_empty());
    assert!(w.tolerance().unwrap().tolerance_raw_units > 100.0);

    assert_eq!(w.advance().unwrap(), WizardStep::Summary);
    assert_eq!(w.advance().unwrap(), WizardStep::Commit);

    let plan = w.commit(CommitSelection::default()).unwrap();
    assert_eq!(plan.tare_offset, 1000.0);
    assert!((plan.conversion_factor - 4.0).abs() < 1e-6);

    let cmds = bench.link.commands();
    // preset(3) + zero tare + final tare + 5 sets + get_config
    assert_eq!(cmds.len(), 11);
    assert_eq!(cmds[3], DeviceCommand::Tare);
    assert_eq!(cmds[4], DeviceCommand::Tare);
    assert_eq!(
        cmds[5],
        DeviceCommand::set(DeviceParam::TareOffset, 1000.0)
    );
    assert!(cmds.contains(&DeviceCommand::set(
        DeviceParam::StabilityTolerance,
        plan.stability_tolerance
    )));
    assert_eq!(cmds.last(), Some(&DeviceCommand::GetConfig));

    let report = w.close();
    assert_eq!(report.step, WizardStep::Commit);
    assert_eq!(report.commands_sent, 11);
    assert_eq!(bench.feed.live_sources(), 0);
    serde_json::to_string(&report).unwrap();
}

#[rstest]
fn advancing_with_only_zero_point_fails_without_fit(bench: Bench) {
    let mut w = to_known_mass(&bench);
    let err = w.advance().unwrap_err();
    assert!(matches!(kind(&err), Some(CalibrationError::InvalidPoint(_))));
    assert_eq!(w.step(), WizardStep::KnownMassCapture);
    assert!(w.regression().is_none());
}

#[rstest]
fn zero_point_cannot_be_removed(bench: Bench) {
    let mut w = to_known_mass(&bench);
    bench.feed.set_load(3000.0, G / 2.0);
    w.capture_known_mass(0.5).unwrap();
    let err = w.remove_point(0).unwrap_err();
    assert!(matches!(kind(&err), Some(CalibrationError::InvalidPoint(_))));
    assert!(w.remove_point(7).is_err());
    let removed = w.remove_point(1).unwrap();
    assert!((removed.mass_kg - 0.5).abs() < f64::EPSILON);
    assert_eq!(w.points().len(), 1);
}

#[rstest]
#[case(0.0)]
#[case(-2.0)]
#[case(f64::NAN)]
fn known_mass_must_be_positive(bench: Bench, #[case] mass: f64) {
    let mut w = to_known_mass(&bench);
    let opened = bench.feed.opened_sources();
    let err = w.capture_known_mass(mass).unwrap_err();
    assert!(matches!(kind(&err), Some(CalibrationError::InvalidPoint(_))));
    assert_eq!(bench.feed.opened_sources(), opened, "no window for a rejected mass");
}

#[rstest]
fn point_edit_drops_stale_regression(bench: Bench) {
    let mut w = to_known_mass(&bench);
    bench.feed.set_load(5000.0, G);
    w.capture_known_mass(1.0).unwrap();
    w.advance().unwrap();
    assert!(w.regression().is_some());

    assert_eq!(w.back(), WizardStep::KnownMassCapture);
    assert!(w.regression().is_some(), "going back keeps results");
    bench.feed.set_load(9000.0, 2.0 * G);
    w.capture_known_mass(2.0).unwrap();
    assert!(w.regression().is_none());
    assert!(w.tolerance().is_none());
    assert_eq!(w.points().len(), 3);
}

#[rstest]
fn invalid_rating_keeps_step(bench: Bench) {
    let mut w = open(&bench);
    w.advance().unwrap();
    let err = w.advance().unwrap_err();
    assert!(matches!(kind(&err), Some(CalibrationError::InvalidSpec(_))));
    w.set_spec(0.0, 0.05).unwrap();
    let err = w.advance().unwrap_err();
    assert!(matches!(kind(&err), Some(CalibrationError::InvalidSpec(_))));
    assert_eq!(w.step(), WizardStep::SpecInput);
}

#[rstest]
fn operations_out_of_step_are_state_errors(bench: Bench) {
    let mut w = open(&bench);
    let err = w.capture_known_mass(1.0).unwrap_err();
    assert!(matches!(kind(&err), Some(CalibrationError::State(_))));
    let err = w.set_spec(5.0, 0.05).unwrap_err();
    assert!(matches!(kind(&err), Some(CalibrationError::State(_))));
    let err = w.commit(CommitSelection::default()).unwrap_err();
    assert!(matches!(kind(&err), Some(CalibrationError::State(_))));
}

#[rstest]
fn cancelled_window_keeps_step_and_releases_listener(bench: Bench) {
    let mut w = open(&bench);
    let cancel = w.cancel_handle();
    bench.feed.raise_after(20, Arc::clone(&cancel));
    let err = w.advance().unwrap_err();
    assert!(matches!(kind(&err), Some(CalibrationError::Cancelled)));
    assert_eq!(w.step(), WizardStep::NoiseMeasurement);
    assert!(w.noise().is_none());
    assert!(!w.window_active());
    assert_eq!(bench.feed.live_sources(), 0);
    assert!(!cancel.load(Ordering::Relaxed), "flag consumed");
    assert_eq!(w.advance().unwrap(), WizardStep::SpecInput);
}

#[rstest]
fn cancel_raised_between_windows_is_ignored(bench: Bench) {
    let mut w = open(&bench);
    w.advance().unwrap();
    w.set_spec(5.0, 0.05).unwrap();
    w.cancel_handle().store(true, Ordering::Relaxed);
    assert_eq!(w.advance().unwrap(), WizardStep::ZeroCapture);
    assert_eq!(w.advance().unwrap(), WizardStep::KnownMassCapture);
    assert_eq!(w.points().len(), 1);

    w.cancel_handle().store(true, Ordering::Relaxed);
    bench.feed.set_load(5000.0, G);
    assert!(w.capture_known_mass(1.0).is_ok());
}

#[rstest]
fn points_are_only_removed_while_capturing(bench: Bench) {
    let mut w = to_known_mass(&bench);
    bench.feed.set_load(5000.0, G);
    w.capture_known_mass(1.0).unwrap();
    w.advance().unwrap();
    assert_eq!(w.advance().unwrap(), WizardStep::Summary);

    let err = w.remove_point(1).unwrap_err();
    assert!(matches!(kind(&err), Some(CalibrationError::State(_))));
    assert_eq!(w.step(), WizardStep::Summary);
    assert_eq!(w.points().len(), 2);
    assert!(w.regression().is_some());
    assert!(w.tolerance().is_some());
}

#[rstest]
fn sparse_stream_is_insufficient_for_noise() {
    let clock = ManualClock::new();
    let feed = ScriptedFeed::new(clock.clone(), Duration::from_secs(1), 0.0);
    let mut w = Wizard::open(
        RecordingLink::new(),
        feed,
        WizardCfg::default(),
        Arc::new(clock),
    );
    let err = w.advance().unwrap_err();
    assert!(matches!(
        kind(&err),
        Some(CalibrationError::InsufficientSamples { got: 5, need: 10 })
    ));
}

#[rstest]
fn unreachable_device_fails_zero_capture(bench: Bench) {
    bench.link.set_connected(false);
    let mut w = open(&bench);
    assert!(!w.report().preset_applied);
    w.advance().unwrap();
    w.set_spec(5.0, 0.05).unwrap();
    w.advance().unwrap();
    let err = w.advance().unwrap_err();
    assert!(matches!(kind(&err), Some(CalibrationError::DeviceUnreachable(_))));
    assert_eq!(w.step(), WizardStep::ZeroCapture);
}

#[rstest]
fn failed_commit_preserves_captures(bench: Bench) {
    let mut w = to_known_mass(&bench);
    bench.feed.set_load(5000.0, G);
    w.capture_known_mass(1.0).unwrap();
    w.advance().unwrap();
    w.advance().unwrap();
    w.advance().unwrap();

    let err = w
        .commit(CommitSelection {
            offset_and_factor: false,
            cell_spec: false,
            tolerance: false,
        })
        .unwrap_err();
    assert!(matches!(kind(&err), Some(CalibrationError::State(_))));

    bench.link.set_connected(false);
    let err = w.commit(CommitSelection::default()).unwrap_err();
    assert!(matches!(kind(&err), Some(CalibrationError::DeviceUnreachable(_))));
    let report = w.report();
    assert!(report.plan.is_none());
    assert_eq!(report.points.len(), 2);
    assert!(report.regression.is_some());
}

#[rstest]
fn settle_delay_runs_on_the_wizard_clock(bench: Bench) {
    let before = bench.clock.elapsed();
    let _w = open(&bench);
    assert_eq!(bench.clock.elapsed() - before, Duration::from_millis(900));
}
