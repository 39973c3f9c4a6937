//! Text extraction collaborator: turns a stored file into raw text.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while extracting text from a document file.
///
/// Every variant is treated as a recoverable task failure by the scheduler.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The file type has no registered extractor.
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
    /// The file could not be read from disk.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
    /// The file contents were not valid UTF-8.
    #[error("File is not valid UTF-8: {0}")]
    InvalidUtf8(PathBuf),
}

/// Interface implemented by text extraction backends.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract raw text from the file at `file_path` of the given `file_type`.
    async fn extract_text(
        &self,
        file_path: &Path,
        file_type: &str,
    ) -> Result<String, ExtractionError>;
}

/// Extractor for plain-text file types, reading files as UTF-8.
pub struct PlainTextExtractor;

const TEXT_FILE_TYPES: &[&str] = &["txt", "text", "md", "markdown", "csv", "log"];

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract_text(
        &self,
        file_path: &Path,
        file_type: &str,
    ) -> Result<String, ExtractionError> {
        let normalized = file_type.trim_start_matches('.').to_lowercase();
        if !TEXT_FILE_TYPES.contains(&normalized.as_str()) {
            return Err(ExtractionError::UnsupportedFileType(normalized));
        }

        let bytes = tokio::fs::read(file_path)
            .await
            .map_err(|source| ExtractionError::Io {
                path: file_path.to_path_buf(),
                source,
            })?;

        String::from_utf8(bytes)
            .map_err(|_| ExtractionError::InvalidUtf8(file_path.to_path_buf()))
    }
}
