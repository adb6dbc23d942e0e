use thiserror::Error;

/// Setup-time failures. Per-frame numeric trouble is handled in place
/// (clamp, floor, zero-and-warn) and never surfaces as an `Error`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input dimension {got} for {stage}: {reason}")]
    BadDimension {
        stage: &'static str,
        got: usize,
        reason: &'static str,
    },

    #[error("invalid configuration for {stage}: {reason}")]
    BadConfig { stage: &'static str, reason: String },

    #[error("unsupported scale operation: {0}")]
    UnsupportedScale(&'static str),

    #[error("required upstream field '{field}' not available for {stage}")]
    MissingField {
        stage: &'static str,
        field: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
