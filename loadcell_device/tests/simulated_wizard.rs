//! The calibration wizard against the simulated gateway, in real time.

use loadcell_core::command::DeviceParam;
use loadcell_core::config::{CaptureCfg, LinkCfg, NoiseCfg};
use loadcell_core::{
    CalibrationError, CommitSelection, FrameRouter, SampleBus, Wizard, WizardCfg, WizardStep,
};
use loadcell_device::{CellModel, SimLink, SimulatedDevice};
use loadcell_traits::MonotonicClock;
use std::sync::Arc;
use std::time::Duration;

fn fast_cfg() -> WizardCfg {
    WizardCfg {
        noise: NoiseCfg {
            window: Duration::from_millis(200),
            min_samples: 5,
        },
        capture: CaptureCfg {
            window: Duration::from_millis(200),
            min_samples: 5,
        },
        link: LinkCfg {
            settle: Duration::ZERO,
            safe_preset: true,
        },
        ..WizardCfg::default()
    }
}

fn rig() -> (SimulatedDevice, FrameRouter, Wizard<SimLink, SampleBus>) {
    let bus = SampleBus::new();
    let router = FrameRouter::new(bus.clone());
    let device = SimulatedDevice::spawn(CellModel::default(), 200, router.clone());
    let wizard = Wizard::open(
        device.link(),
        bus,
        fast_cfg(),
        Arc::new(MonotonicClock::new()),
    );
    (device, router, wizard)
}

/// Change the load and let the frames already in flight pass.
fn place(device: &SimulatedDevice, kg: f64) {
    device.set_load_kg(kg);
    std::thread::sleep(Duration::from_millis(30));
}

#[test]
fn calibration_lands_in_firmware() {
    let (device, router, mut w) = rig();
    assert_eq!(device.param(DeviceParam::StabilityTolerance), Some(5000.0));

    w.advance().unwrap();
    assert!(w.noise().unwrap().sample_count >= 5);
    w.set_spec(5.0, 0.05).unwrap();
    w.advance().unwrap();
    assert_eq!(w.advance().unwrap(), WizardStep::KnownMassCapture);
    let zero = w.points()[0].raw_reading;
    assert!((zero - 842_913.0).abs() < 5.0, "zero raw {zero}");

    for kg in [1.0, 2.0, 3.0] {
        place(&device, kg);
        w.capture_known_mass(kg).unwrap();
    }
    place(&device, 0.0);

    assert_eq!(w.advance().unwrap(), WizardStep::RegressionReview);
    let r = *w.regression().unwrap();
    assert!((r.alpha - 2.5e-5).abs() / 2.5e-5 < 1e-3, "alpha {}", r.alpha);
    assert!(r.r_squared > 0.999);
    assert!(w.warnings().is_empty(), "{:?}", w.warnings());

    w.advance().unwrap();
    w.advance().unwrap();
    let plan = w.commit(CommitSelection::default()).unwrap();

    assert!((device.conversion_factor() - 40.0).abs() < 0.05);
    assert!((device.tare_offset() - plan.tare_offset).abs() < f64::EPSILON);
    assert_eq!(
        device.param(DeviceParam::StabilityTolerance),
        Some(plan.stability_tolerance)
    );

    // get_config echo rides along with the next data frame
    std::thread::sleep(Duration::from_millis(50));
    let echoed = router.last_config().unwrap();
    assert_eq!(echoed.tare_offset, Some(plan.tare_offset));
    assert_eq!(echoed.capacidade_maxima_gramas, Some(5000.0));

    let report = w.close();
    assert_eq!(report.commands_sent, 3 + 2 + 6);
}

#[test]
fn unplugged_gateway_fails_zero_capture() {
    let (device, _router, mut w) = rig();
    w.advance().unwrap();
    w.set_spec(5.0, 0.05).unwrap();
    w.advance().unwrap();

    device.set_connected(false);
    let err = w.advance().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CalibrationError>(),
        Some(CalibrationError::DeviceUnreachable(_))
    ));
    assert_eq!(w.step(), WizardStep::ZeroCapture);
    assert!(!w.window_active());

    device.set_connected(true);
    assert_eq!(w.advance().unwrap(), WizardStep::KnownMassCapture);
}
