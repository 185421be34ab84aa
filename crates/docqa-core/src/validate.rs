//! Upload validation.
//!
//! The first gate of the ingestion pipeline. A rejected upload creates no
//! state anywhere: no blob on disk, no document row.
//!
//! Rules are checked in a fixed order and the first violation wins:
//!
//! | # | Rule | Error |
//! |---|------|-------|
//! | 1 | byte length > 0 | `FILE_EMPTY` |
//! | 2 | filename present and non-empty | `FILENAME_NULL` |
//! | 3 | byte length ≤ `max_bytes` | `SIZE_EXCEEDED` |
//! | 4 | content type in the allow-list | `UNSUPPORTED_TYPE` |

use crate::error::IngestError;
use crate::models::Upload;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOC: &str = "application/msword";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_XLS: &str = "application/vnd.ms-excel";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_TEXT: &str = "text/plain";

/// Content types accepted for ingestion.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    MIME_PDF, MIME_DOC, MIME_DOCX, MIME_XLS, MIME_XLSX, MIME_TEXT,
];

/// 50 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Strip MIME parameters (`; charset=...`) and normalize case.
pub fn media_type_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Guess a content type from a filename extension.
///
/// Returns `None` for extensions outside the allow-list.
pub fn content_type_for_filename(filename: &str) -> Option<&'static str> {
    let ext = filename.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(MIME_PDF),
        "doc" => Some(MIME_DOC),
        "docx" => Some(MIME_DOCX),
        "xls" => Some(MIME_XLS),
        "xlsx" => Some(MIME_XLSX),
        "txt" | "text" => Some(MIME_TEXT),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Validator {
    max_bytes: u64,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

impl Validator {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn validate(&self, upload: &Upload) -> Result<(), IngestError> {
        if upload.is_empty() {
            return Err(IngestError::FileEmpty);
        }

        match upload.filename.as_deref() {
            Some(name) if !name.trim().is_empty() => {}
            _ => return Err(IngestError::FilenameNull),
        }

        let size = upload.len();
        if size > self.max_bytes {
            return Err(IngestError::SizeExceeded {
                size,
                limit: self.max_bytes,
            });
        }

        let declared = upload.content_type.as_deref().unwrap_or("");
        let essence = media_type_essence(declared);
        if !ALLOWED_CONTENT_TYPES.contains(&essence.as_str()) {
            return Err(IngestError::UnsupportedType(declared.to_string()));
        }

        Ok(())
    }
}
