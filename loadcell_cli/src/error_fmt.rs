//! Human-readable error descriptions and structured JSON error formatting.

use loadcell_core::CalibrationError;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(ce) = err.downcast_ref::<CalibrationError>() {
        return match ce {
            CalibrationError::InsufficientSamples { got, need } => format!(
                "What happened: Only {got} reading(s) arrived during the window, {need} needed.\nLikely causes: Gateway not streaming, sample rate too low, or window too short.\nHow to fix: Check the gateway connection and raise noise.window_ms / capture.window_ms in the config."
            ),
            CalibrationError::DegenerateInput(msg) => format!(
                "What happened: The calibration points cannot define a line ({msg}).\nLikely causes: Every point read the same raw value; the mass was not on the cell or the ADC is saturated.\nHow to fix: Recapture the known masses and make sure the reading changes with load."
            ),
            CalibrationError::InvalidSpec(msg) => format!(
                "What happened: Invalid cell rating ({msg}).\nLikely causes: Capacity or accuracy left empty, zero or negative.\nHow to fix: Enter the values from the cell datasheet, e.g. --capacity-kg 5 --accuracy-percent 0.05."
            ),
            CalibrationError::InvalidPoint(msg) => format!(
                "What happened: Invalid calibration point ({msg}).\nLikely causes: Fewer than two points, a non-positive known mass, or a non-finite reading.\nHow to fix: Capture the zero point and at least one known mass greater than 0 kg."
            ),
            CalibrationError::NonFiniteResult(what) => format!(
                "What happened: The computed {what} is not a finite number.\nLikely causes: A near-zero slope or extreme readings.\nHow to fix: Recapture the points with heavier masses spread over the cell range."
            ),
            CalibrationError::DeviceUnreachable(msg) => format!(
                "What happened: The device could not be reached ({msg}).\nLikely causes: Gateway unplugged, powered off, or the link dropped.\nHow to fix: Reconnect the gateway and retry the step; captured data is kept."
            ),
            CalibrationError::Timeout => {
                "What happened: No reading arrived before the deadline.\nLikely causes: Gateway stalled or the stream was closed.\nHow to fix: Check the gateway and rerun with --log-level=debug.".to_string()
            }
            CalibrationError::Cancelled => {
                "What happened: The measurement was cancelled.\nLikely causes: Ctrl-C during a capture window or between calibration steps.\nHow to fix: Rerun the step when the cell is ready.".to_string()
            }
            CalibrationError::State(msg) => format!(
                "What happened: Operation not allowed right now ({msg}).\nLikely causes: A step was skipped or the results were invalidated by a point edit.\nHow to fix: Go back to the step named above and complete it."
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("must have headers") {
        return format!(
            "What happened: {msg}.\nLikely causes: Wrong file, or a spreadsheet export renamed the columns.\nHow to fix: Use the exact header line shown above."
        );
    }

    if lower.contains("invalid configuration") || lower.contains("parse config") {
        let cause = err.root_cause();
        return format!(
            "What happened: Configuration is invalid ({cause}).\nLikely causes: Out-of-range values or a misspelled key in the TOML.\nHow to fix: Edit the config file and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable machine-readable name for the error kind.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<CalibrationError>() {
        Some(CalibrationError::InsufficientSamples { .. }) => "InsufficientSamples",
        Some(CalibrationError::DegenerateInput(_)) => "DegenerateInput",
        Some(CalibrationError::InvalidSpec(_)) => "InvalidSpec",
        Some(CalibrationError::InvalidPoint(_)) => "InvalidPoint",
        Some(CalibrationError::NonFiniteResult(_)) => "NonFiniteResult",
        Some(CalibrationError::DeviceUnreachable(_)) => "DeviceUnreachable",
        Some(CalibrationError::Timeout) => "Timeout",
        Some(CalibrationError::Cancelled) => "Cancelled",
        Some(CalibrationError::State(_)) => "State",
        None => "Error",
    }
}

/// Typed calibration errors get stable exit codes; everything else returns 1.
/// Exit code 2 stays reserved for usage errors reported by clap.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<CalibrationError>() {
        Some(CalibrationError::InsufficientSamples { .. }) => 3,
        Some(CalibrationError::DegenerateInput(_)) => 4,
        Some(CalibrationError::InvalidSpec(_)) => 5,
        Some(CalibrationError::InvalidPoint(_)) => 6,
        Some(CalibrationError::NonFiniteResult(_)) => 7,
        Some(CalibrationError::DeviceUnreachable(_)) => 8,
        Some(CalibrationError::Timeout) => 9,
        Some(CalibrationError::Cancelled) => 10,
        Some(CalibrationError::State(_)) => 11,
        None => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_errors_keep_their_kind_through_context() {
        use eyre::WrapErr;
        let err: eyre::Result<()> = Err(eyre::Report::new(CalibrationError::InsufficientSamples {
            got: 3,
            need: 10,
        }));
        let err = err.wrap_err("capture zero").unwrap_err();
        assert_eq!(exit_code_for_error(&err), 3);
        assert!(humanize(&err).contains("Only 3 reading(s)"));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "InsufficientSamples");
    }

    #[test]
    fn untyped_errors_fall_back() {
        let err = eyre::eyre!("disk on fire");
        assert_eq!(exit_code_for_error(&err), 1);
        assert_eq!(reason_name(&err), "Error");
        assert!(humanize(&err).contains("Original: disk on fire"));
    }
}
