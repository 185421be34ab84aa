//! Error taxonomy for the ingestion pipeline.

use thiserror::Error;

/// Everything that can stop an upload from being accepted or processed.
///
/// Validation variants are surfaced to the caller before any state is
/// created. `ExtractionFailed` and `Store` surface inside the background
/// task and move the document to `FAILED`.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("file is empty")]
    FileEmpty,

    #[error("filename is missing")]
    FilenameNull,

    #[error("file size {size} exceeds the limit of {limit} bytes")]
    SizeExceeded { size: u64, limit: u64 },

    #[error("unsupported content type: {0}")]
    UnsupportedType(String),

    #[error("text extraction failed: {0}")]
    ExtractionFailed(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::FileEmpty => "FILE_EMPTY",
            IngestError::FilenameNull => "FILENAME_NULL",
            IngestError::SizeExceeded { .. } => "SIZE_EXCEEDED",
            IngestError::UnsupportedType(_) => "UNSUPPORTED_TYPE",
            IngestError::ExtractionFailed(_) => "EXTRACTION_FAILED",
            IngestError::Store(_) => "STORE_ERROR",
            IngestError::Io(_) => "IO_ERROR",
        }
    }

    /// True for the errors raised by upload validation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            IngestError::FileEmpty
                | IngestError::FilenameNull
                | IngestError::SizeExceeded { .. }
                | IngestError::UnsupportedType(_)
        )
    }
}
