use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("insufficient samples: got {got}, need at least {need}")]
    InsufficientSamples { got: usize, need: usize },
    #[error("degenerate input: {0}")]
    DegenerateInput(String),
    #[error("invalid cell spec: {0}")]
    InvalidSpec(String),
    #[error("invalid calibration point: {0}")]
    InvalidPoint(String),
    #[error("non-finite result: {0}")]
    NonFiniteResult(String),
    #[error("device unreachable: {0}")]
    DeviceUnreachable(String),
    #[error("timed out waiting for samples")]
    Timeout,
    #[error("measurement cancelled")]
    Cancelled,
    #[error("invalid state: {0}")]
    State(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
