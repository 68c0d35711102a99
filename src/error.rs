use std::io;

use crate::dataset::DatasetError;
use crate::persist::FormatError;

/// Errors surfaced by fitting, prediction and model persistence.
#[derive(Debug, thiserror::Error)]
pub enum FastBdtError {
    /// Inconsistent inputs or hyperparameters detected at `fit` time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Query point arity does not match the fitted feature count.
    #[error("dimension mismatch: expected {expected} features, got {got}")]
    Dimension { expected: usize, got: usize },

    /// Malformed, truncated or incompatible model artifact.
    #[error("serialization error: {0}")]
    Serialization(#[from] FormatError),

    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, FastBdtError>;

pub(crate) fn config_error(message: impl Into<String>) -> FastBdtError {
    FastBdtError::Configuration(message.into())
}
