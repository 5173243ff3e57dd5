use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the inference pipeline.
///
/// `EmptyBatch` and `BatchTooLarge` are admission errors: they reject a
/// request before any per-image work starts. Every other variant is a
/// per-item condition and is converted into an [`ErrorRecord`] in the
/// affected batch slot rather than aborting sibling items.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Batch is empty: at least one image is required")]
    EmptyBatch,

    #[error("Batch of {actual} images exceeds the limit of {limit}")]
    BatchTooLarge { limit: usize, actual: usize },

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),

    #[error("Classifier failure: {0}")]
    Classifier(String),

    #[error("Invalid classification result: {0}")]
    InvalidClassification(String),

    #[error("Unrecognized tumor label: {0}")]
    InvalidLabel(String),

    #[error("Batch deadline elapsed before the item finished")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl InferenceError {
    /// True for request-level rejections that abort before per-item work.
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            InferenceError::EmptyBatch | InferenceError::BatchTooLarge { .. }
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            InferenceError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            InferenceError::DecodeFailed(_) => ErrorKind::DecodeFailed,
            InferenceError::Classifier(_) => ErrorKind::Classifier,
            InferenceError::InvalidClassification(_) | InferenceError::InvalidLabel(_) => {
                ErrorKind::Validation
            }
            InferenceError::Timeout => ErrorKind::Timeout,
            InferenceError::EmptyBatch | InferenceError::BatchTooLarge { .. } => {
                ErrorKind::Admission
            }
            InferenceError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Wire-visible failure category for a single batch slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Request-level rejection. Admission errors abort before per-item work,
    /// so this kind never appears in a batch slot; it exists so an admission
    /// error converted to a record is still labeled accurately.
    Admission,
    UnsupportedFormat,
    DecodeFailed,
    Classifier,
    Validation,
    Timeout,
    Internal,
}

/// Tagged failure value attached to one batch slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<InferenceError> for ErrorRecord {
    fn from(err: InferenceError) -> Self {
        ErrorRecord {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, InferenceError>;
