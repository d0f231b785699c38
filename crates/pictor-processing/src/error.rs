use pictor_core::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Unrecognised image data")]
    UnknownFormat,

    #[error("{0} images cannot be decoded for transformation")]
    UnsupportedFormat(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Watermark font unavailable: {0}")]
    FontUnavailable(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),
}

pub type ProcessingResult<T> = Result<T, ProcessingError>;

impl From<ProcessingError> for AppError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::UnknownFormat
            | ProcessingError::UnsupportedFormat(_)
            | ProcessingError::Decode(_)
            | ProcessingError::InvalidOperation(_) => AppError::InvalidImage(err.to_string()),
            ProcessingError::FontUnavailable(_) => AppError::InvalidInput(err.to_string()),
            ProcessingError::Encode(_) => AppError::Internal(err.to_string()),
        }
    }
}
