use loadcell_core::util::{STANDARD_GRAVITY, grams_to_newtons};
use loadcell_core::{
    CalibrationPoint, CellSpec, FilterCfg, FilterState, NoiseProfile, ToleranceCfg,
    derive_tolerance, filter, fit,
};
use proptest::prelude::*;

prop_compose! {
    fn noisy_line()(
        alpha in 1e-6f64..1e-2,
        beta in -100.0f64..100.0,
        raws in prop::collection::vec(-1e6f64..1e6, 3..30),
        noise in prop::collection::vec(-0.5f64..0.5, 30),
    ) -> Vec<CalibrationPoint> {
        raws.iter()
            .zip(noise.iter())
            .map(|(&r, &e)| CalibrationPoint::new(alpha * r + beta + e, r))
            .collect()
    }
}

proptest! {
    #[test]
    fn residuals_sum_to_zero(points in noisy_line()) {
        // Skip draws whose raw values collapse onto one value.
        prop_assume!(points.windows(2).any(|w| (w[0].raw_reading - w[1].raw_reading).abs() > 1.0));
        let r = fit(&points).unwrap();
        let sum: f64 = points.iter().map(|p| p.mass_kg - r.predict(p.raw_reading)).sum();
        let scale: f64 = points.iter().map(|p| p.mass_kg.abs()).sum::<f64>().max(1.0);
        prop_assert!(sum.abs() / scale < 1e-9, "sum {sum}");
        prop_assert!(r.max_residual_kg >= 0.0);
        prop_assert!(r.r_squared <= 1.0 + 1e-12);
    }

    #[test]
    fn predict_is_the_line(raw in -1e7f64..1e7) {
        let r = fit(&[CalibrationPoint::new(0.0, 1000.0), CalibrationPoint::new(1.0, 5000.0)]).unwrap();
        prop_assert!((r.predict(raw) - (r.alpha * raw + r.beta)).abs() < 1e-9);
    }

    #[test]
    fn tolerance_never_below_floor(
        cap in 0.1f64..500.0,
        acc in 0.001f64..1.0,
        sd in 0.0f64..5.0,
        alpha in prop_oneof![1e-9f64..1e-3, 1e-3f64..1e3, -1e3f64..-1e-3],
        floor in 0.0f64..10_000.0,
    ) {
        let spec = CellSpec::new(cap, acc).unwrap();
        let noise = NoiseProfile { std_dev: sd, mean: 0.0, sample_count: 100 };
        let cfg = ToleranceCfg { safety_margin: 1.5, floor_raw: floor };
        let t = derive_tolerance(&spec, &noise, alpha, &cfg, STANDARD_GRAVITY).unwrap();
        prop_assert!(t.tolerance_raw_units >= floor);
        if t.min_tolerance_g * t.conversion_factor < floor {
            prop_assert_eq!(t.tolerance_raw_units, floor);
        }
    }

    #[test]
    fn dead_zone_output_is_exact_zero(
        frac in -0.999f64..0.999,
        cap in 0.5f64..100.0,
        acc in 0.01f64..0.5,
    ) {
        let cfg = FilterCfg { cell: CellSpec::new(cap, acc).unwrap(), ..FilterCfg::default() };
        let grams = frac * cfg.dead_zone_g();
        let mut st = FilterState::new(&cfg);
        let out = filter(grams_to_newtons(grams, STANDARD_GRAVITY), &mut st, &cfg);
        prop_assert!(out.dead_zone);
        prop_assert_eq!(out.conditioned_n.to_bits(), 0.0f64.to_bits());
        prop_assert_eq!(out.filtered_n.to_bits(), 0.0f64.to_bits());
    }

    #[test]
    fn first_sample_passes_ema_unchanged(x in -1e4f64..1e4, alpha in 0.01f64..1.0) {
        let cfg = FilterCfg { ema_alpha: alpha, dead_zone: false, rounding: false, ..FilterCfg::default() };
        let mut st = FilterState::new(&cfg);
        let out = filter(x, &mut st, &cfg);
        prop_assert_eq!(out.filtered_n.to_bits(), x.to_bits());
    }
}
