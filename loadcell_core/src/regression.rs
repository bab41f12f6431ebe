//! Least-squares fit of mass against raw reading, plus the advisory quality gate.

use crate::error::{CalibrationError, Result};
use crate::types::{CalibrationPoint, CellSpec};
use serde::Serialize;

/// Fits below this coefficient of determination are flagged as non-linear.
pub const MIN_R_SQUARED: f64 = 0.999;

/// `mass_kg = alpha * raw + beta`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegressionResult {
    /// kg per raw unit
    pub alpha: f64,
    /// kg
    pub beta: f64,
    pub max_residual_kg: f64,
    pub r_squared: f64,
    pub point_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityWarning {
    LowLinearity { r_squared: f64, threshold: f64 },
    ExceedsSpec { max_residual_kg: f64, max_error_kg: f64 },
}

impl std::fmt::Display for QualityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowLinearity {
                r_squared,
                threshold,
            } => write!(f, "low linearity: R² {r_squared:.6} < {threshold}"),
            Self::ExceedsSpec {
                max_residual_kg,
                max_error_kg,
            } => write!(
                f,
                "residual {:.3} g exceeds cell error {:.3} g",
                max_residual_kg * 1000.0,
                max_error_kg * 1000.0
            ),
        }
    }
}

impl RegressionResult {
    #[inline]
    pub fn predict(&self, raw: f64) -> f64 {
        self.alpha.mul_add(raw, self.beta)
    }

    /// Advisory checks; a poor fit is reported, never rejected.
    pub fn quality(&self, spec: Option<&CellSpec>) -> Vec<QualityWarning> {
        let mut out = Vec::new();
        if self.r_squared < MIN_R_SQUARED {
            out.push(QualityWarning::LowLinearity {
                r_squared: self.r_squared,
                threshold: MIN_R_SQUARED,
            });
        }
        if let Some(spec) = spec
            && self.max_residual_kg > spec.max_error_kg()
        {
            out.push(QualityWarning::ExceedsSpec {
                max_residual_kg: self.max_residual_kg,
                max_error_kg: spec.max_error_kg(),
            });
        }
        out
    }
}

/// A point set for the firmware needs exactly one zero-mass reading to take
/// the tare offset from.
pub fn require_single_zero(points: &[CalibrationPoint]) -> Result<()> {
    match points.iter().filter(|p| p.mass_kg == 0.0).count() {
        1 => Ok(()),
        0 => Err(eyre::Report::new(CalibrationError::InvalidPoint(
            "no zero point (mass_kg = 0) among the points".into(),
        ))),
        n => Err(eyre::Report::new(CalibrationError::InvalidPoint(format!(
            "{n} zero points (mass_kg = 0), expected exactly one"
        )))),
    }
}

/// Ordinary least squares over all points, computed in centered form.
pub fn fit(points: &[CalibrationPoint]) -> Result<RegressionResult> {
    if points.len() < 2 {
        return Err(eyre::Report::new(CalibrationError::InvalidPoint(format!(
            "regression requires at least two points, got {}",
            points.len()
        ))));
    }
    if points
        .iter()
        .any(|p| !(p.mass_kg.is_finite() && p.raw_reading.is_finite()))
    {
        return Err(eyre::Report::new(CalibrationError::InvalidPoint(
            "points must be finite".into(),
        )));
    }

    let n = points.len() as f64;
    let raw_mean = points.iter().map(|p| p.raw_reading).sum::<f64>() / n;
    let mass_mean = points.iter().map(|p| p.mass_kg).sum::<f64>() / n;

    let mut s_nn = 0.0f64;
    let mut s_nm = 0.0f64;
    for p in points {
        let dn = p.raw_reading - raw_mean;
        s_nn += dn * dn;
        s_nm += dn * (p.mass_kg - mass_mean);
    }
    if !s_nn.is_finite() {
        return Err(eyre::Report::new(CalibrationError::DegenerateInput(
            "raw reading spread overflows; readings are out of range".into(),
        )));
    }
    if s_nn == 0.0 {
        return Err(eyre::Report::new(CalibrationError::DegenerateInput(
            "all raw readings are identical".into(),
        )));
    }
    let alpha = s_nm / s_nn;
    if !alpha.is_finite() {
        return Err(eyre::Report::new(CalibrationError::NonFiniteResult(
            "slope".into(),
        )));
    }
    if alpha == 0.0 {
        return Err(eyre::Report::new(CalibrationError::DegenerateInput(
            "slope is zero; masses do not vary with the reading".into(),
        )));
    }
    let beta = alpha.mul_add(-raw_mean, mass_mean);

    let mut ss_res = 0.0f64;
    let mut ss_tot = 0.0f64;
    let mut max_residual = 0.0f64;
    for p in points {
        let e = p.mass_kg - alpha.mul_add(p.raw_reading, beta);
        ss_res += e * e;
        let dm = p.mass_kg - mass_mean;
        ss_tot += dm * dm;
        max_residual = max_residual.max(e.abs());
    }
    // ss_tot > 0 here: equal masses would have produced a zero slope above.
    let r_squared = 1.0 - ss_res / ss_tot;

    let result = RegressionResult {
        alpha,
        beta,
        max_residual_kg: max_residual,
        r_squared,
        point_count: points.len(),
    };
    tracing::debug!(alpha, beta, r_squared, max_residual, "regression fitted");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn pts(v: &[(f64, f64)]) -> Vec<CalibrationPoint> {
        v.iter()
            .map(|&(m, r)| CalibrationPoint::new(m, r))
            .collect()
    }

    #[test]
    fn two_point_fit_is_exact() {
        let r = fit(&pts(&[(0.0, 1000.0), (1.0, 5000.0)])).unwrap();
        assert!((r.alpha - 0.00025).abs() < 1e-15);
        assert!((r.beta + 0.25).abs() < 1e-12);
        assert!((r.predict(3000.0) - 0.5).abs() < 1e-12);
        assert!((r.r_squared - 1.0).abs() < 1e-12);
        assert!(r.max_residual_kg < 1e-12);
    }

    #[test]
    fn point_order_does_not_matter() {
        let a = fit(&pts(&[(0.0, 100.0), (1.0, 510.0), (2.0, 890.0)])).unwrap();
        let b = fit(&pts(&[(2.0, 890.0), (0.0, 100.0), (1.0, 510.0)])).unwrap();
        assert!((a.alpha - b.alpha).abs() < 1e-15);
        assert!((a.beta - b.beta).abs() < 1e-12);
    }

    #[rstest]
    #[case(&[(0.0, 1000.0), (1.0, 1000.0)])]
    #[case(&[(0.0, 7.0), (1.0, 7.0), (2.0, 7.0)])]
    fn identical_raw_is_degenerate(#[case] v: &[(f64, f64)]) {
        let err = fit(&pts(v)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CalibrationError>(),
            Some(CalibrationError::DegenerateInput(_))
        ));
    }

    #[test]
    fn overflowing_spread_is_not_called_identical() {
        let err = fit(&pts(&[(0.0, -1e200), (1.0, 1e200)])).unwrap_err();
        match err.downcast_ref::<CalibrationError>() {
            Some(CalibrationError::DegenerateInput(msg)) => {
                assert!(msg.contains("overflows"), "{msg}");
                assert!(!msg.contains("identical"), "{msg}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[rstest]
    #[case(&[(1.0, 5000.0), (2.0, 9000.0)], false)]
    #[case(&[(0.0, 1000.0), (0.0, 1010.0), (1.0, 5000.0)], false)]
    #[case(&[(0.0, 1000.0), (1.0, 5000.0), (2.0, 9000.0)], true)]
    fn exactly_one_zero_point(#[case] v: &[(f64, f64)], #[case] ok: bool) {
        let out = require_single_zero(&pts(v));
        assert_eq!(out.is_ok(), ok);
        if let Err(err) = out {
            assert!(matches!(
                err.downcast_ref::<CalibrationError>(),
                Some(CalibrationError::InvalidPoint(_))
            ));
        }
    }

    #[test]
    fn equal_masses_give_zero_slope() {
        let err = fit(&pts(&[(1.0, 100.0), (1.0, 200.0)])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CalibrationError>(),
            Some(CalibrationError::DegenerateInput(_))
        ));
    }

    #[test]
    fn single_point_is_rejected() {
        let err = fit(&pts(&[(0.0, 1.0)])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CalibrationError>(),
            Some(CalibrationError::InvalidPoint(_))
        ));
    }

    #[test]
    fn quality_gate_flags_scatter() {
        let r = fit(&pts(&[(0.0, 0.0), (1.0, 1000.0), (2.0, 2600.0), (3.0, 3000.0)])).unwrap();
        let spec = CellSpec::new(5.0, 0.05).unwrap();
        let w = r.quality(Some(&spec));
        assert!(w.iter().any(|x| matches!(x, QualityWarning::LowLinearity { .. })));
        assert!(w.iter().any(|x| matches!(x, QualityWarning::ExceedsSpec { .. })));
        assert!(r.quality(None).len() == 1);
    }

    #[test]
    fn clean_fit_has_no_warnings() {
        let r = fit(&pts(&[(0.0, 842_913.0), (1.0, 882_913.0), (2.0, 922_913.0)])).unwrap();
        let spec = CellSpec::new(5.0, 0.05).unwrap();
        assert!(r.quality(Some(&spec)).is_empty());
    }
}
