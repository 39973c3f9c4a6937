//! Core data types and error definitions for the processing pipeline.

use crate::{embedding::EmbeddingError, extract::ExtractionError, store::StoreError};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Caller configured an impossible chunk window.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// A bounded, possibly-overlapping slice of a document's cleaned text.
///
/// Offsets are character indices into the cleaned text (end exclusive).
/// Chunks are immutable once produced; ownership moves to the persistence
/// collaborator.
#[derive(Debug, Clone)]
pub struct TextChunk {
    /// Chunk content, trimmed of surrounding whitespace.
    pub content: String,
    /// Character offset of the first content character.
    pub start_char: usize,
    /// Character offset one past the last content character.
    pub end_char: usize,
    /// 0-based position of the chunk within its document.
    pub chunk_index: usize,
    /// Opaque metadata attached by the caller (document id, title, language).
    pub metainfo: Value,
}

/// One persisted record per chunk, handed to the chunk sink.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// Document the chunk belongs to.
    pub document_id: Uuid,
    /// Chunk text.
    pub content: String,
    /// 0-based chunk position within the document.
    pub chunk_index: usize,
    /// Character offset of the chunk start in the cleaned text.
    pub start_offset: usize,
    /// Character offset of the chunk end in the cleaned text (exclusive).
    pub end_offset: usize,
    /// Token count of the chunk content.
    pub token_count: usize,
    /// Embedding vector produced for the chunk.
    pub embedding: Vec<f32>,
    /// Model identifier that produced the embedding.
    pub embedding_model: String,
    /// Language hint passed through from document metadata.
    pub language: Option<String>,
}

/// Errors emitted by one execution of a processing task.
///
/// Everything except [`TaskError::Cancelled`] is a recoverable failure: the
/// scheduler re-queues the task until `max_retries` is exhausted, then marks
/// it permanently failed.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Document store read or write failed.
    #[error("Document store request failed: {0}")]
    Document(#[source] StoreError),
    /// Text extraction failed for the document file.
    #[error("Text extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce a vector for a chunk.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Persisting finished chunks failed.
    #[error("Chunk persistence failed: {0}")]
    Persistence(#[source] StoreError),
    /// The task was cancelled at a checkpoint; not a failure.
    #[error("Task cancelled")]
    Cancelled,
}

impl TaskError {
    /// Whether this outcome is an explicit cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
