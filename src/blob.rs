//! Raw upload storage.
//!
//! Each accepted upload is written once to `<dir>/<uuid>_<filename>`. The
//! fresh uuid prefix keeps concurrent uploads of the same filename apart.
//! Nothing is deduplicated or garbage-collected.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use docqa_core::IngestError;

/// Common filesystem limit on one path component, in bytes.
const MAX_NAME_BYTES: usize = 255;
/// Uuid (36) plus the `_` separator.
const PREFIX_BYTES: usize = 37;
/// Longest extension kept intact when a name is shortened.
const MAX_EXT_BYTES: usize = 16;

#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` under a fresh name and return its absolute path.
    ///
    /// Path separators in `filename` are replaced so the blob always lands
    /// directly inside the upload directory, and long names are shortened
    /// to fit one path component.
    pub async fn put(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, IngestError> {
        fs::create_dir_all(&self.dir).await?;
        let dir = fs::canonicalize(&self.dir).await?;

        let name = format!("{}_{}", Uuid::new_v4(), sanitize_filename(filename));
        let path = dir.join(name);
        fs::write(&path, bytes).await?;

        debug!(path = %path.display(), bytes = bytes.len(), "blob written");
        Ok(path)
    }

    pub async fn read(&self, path: &Path) -> Result<Vec<u8>, IngestError> {
        Ok(fs::read(path).await?)
    }
}

fn sanitize_filename(filename: &str) -> String {
    let clean: String = filename
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    shorten(&clean, MAX_NAME_BYTES - PREFIX_BYTES)
}

/// Cut `name` to at most `max` bytes on a char boundary, keeping a short
/// extension.
fn shorten(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_string();
    }
    let ext = match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= MAX_EXT_BYTES => &name[dot..],
        _ => "",
    };
    let stem = &name[..name.len() - ext.len()];
    format!("{}{}", prefix_within(stem, max.saturating_sub(ext.len())), ext)
}

fn prefix_within(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
