use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the transcript engine.
///
/// Subtitle absence is not represented here: a source with no usable
/// subtitle track is a normal outcome and surfaces as `None`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unsupported speech provider: {0}")]
    ProviderUnsupported(String),

    #[error("acquisition failed: {0}")]
    Acquisition(String),

    #[error("recognition failed: {0}")]
    Recognition(String),

    /// User-initiated cancellation. A terminal outcome, not a failure.
    #[error("task cancelled by user")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
