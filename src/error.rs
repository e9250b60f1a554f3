use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the detection library.
///
/// Only `InvalidFrame` aborts a `detect_plates` call. Model and recognition
/// failures are absorbed by the stage that hit them (zero candidates or an
/// empty plate string) and show up here only at construction time.
#[derive(Debug, Error)]
pub enum PlateError {
    #[error("invalid frame: {width}x{height} (both dimensions must be non-zero)")]
    InvalidFrame { width: u32, height: u32 },

    #[error("model unavailable at {}: {reason}", path.display())]
    ModelUnavailable { path: PathBuf, reason: String },

    #[error("crop is empty or degenerate")]
    EmptyOrDegenerateCrop,

    #[error("text recognition failed: {0}")]
    RecognitionFailure(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PlateError {
    pub fn model_unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PlateError::ModelUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlateError>;
