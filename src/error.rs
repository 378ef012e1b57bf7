use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors raised by the analysis pipeline.
///
/// Numeric degeneracies (silent clips, zero maxima) are not errors: they
/// travel through the feature arrays as NaN or infinity.
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("task '{task}' did not finish within {after:?}")]
    Timeout { task: String, after: Duration },

    #[error("task '{task}' failed: {reason}")]
    TaskFailed { task: String, reason: String },

    #[error("stage ran out of order: {0}")]
    StageOrder(&'static str),
}
