//! Persistence collaborators: document metadata store and chunk sink.
//!
//! The pipeline never owns a storage schema; it reads document metadata
//! through [`DocumentStore`], hands finished chunks to a [`ChunkSink`], and
//! writes final/failed status back. The in-memory implementations here back
//! the integration tests and let the crate run without external services.

use crate::processing::ChunkRecord;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Errors raised by storage collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced document does not exist.
    #[error("Document not found: {0}")]
    NotFound(Uuid),
    /// The storage backend rejected or failed the request.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Processing status recorded on the document entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Document uploaded but not yet processed.
    Pending,
    /// Document fully chunked, embedded, and persisted.
    Completed,
    /// Processing failed permanently after exhausting retries.
    Failed,
}

/// Document metadata supplied by the owning store.
#[derive(Debug, Clone)]
pub struct Document {
    /// Identifier of the externally-owned document entity.
    pub id: Uuid,
    /// Location of the uploaded file on disk.
    pub file_path: PathBuf,
    /// File type used to select an extractor (e.g. `txt`, `md`).
    pub file_type: String,
    /// Human-readable title.
    pub title: String,
    /// Opaque metadata passed through to chunk records (e.g. detected language).
    pub metainfo: Value,
}

/// Fields written back to the document entity when a task finishes.
#[derive(Debug, Clone)]
pub struct DocumentUpdate {
    /// Terminal processing status.
    pub status: DocumentStatus,
    /// Number of chunks produced, on success.
    pub chunk_count: Option<usize>,
    /// Wall-clock processing duration, on success.
    pub processing_time: Option<Duration>,
    /// Failure description, on permanent failure.
    pub error_message: Option<String>,
    /// Optional metadata merge.
    pub metainfo: Option<Value>,
}

impl DocumentUpdate {
    /// Update recorded after a successful pipeline run.
    pub fn completed(chunk_count: usize, processing_time: Duration) -> Self {
        Self {
            status: DocumentStatus::Completed,
            chunk_count: Some(chunk_count),
            processing_time: Some(processing_time),
            error_message: None,
            metainfo: None,
        }
    }

    /// Update recorded after retries are exhausted.
    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: DocumentStatus::Failed,
            chunk_count: None,
            processing_time: None,
            error_message: Some(error_message.into()),
            metainfo: None,
        }
    }
}

/// Interface to the externally-owned document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch document metadata for a processing task.
    async fn get_document(&self, id: Uuid) -> Result<Document, StoreError>;

    /// Record the final or failed status of a processing run.
    async fn update_document(&self, id: Uuid, update: DocumentUpdate) -> Result<(), StoreError>;
}

/// Interface accepting finished chunk records for persistence.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    /// Persist every chunk of a document in one batch.
    ///
    /// The pipeline only calls this after all chunks embedded successfully,
    /// so a sink never observes a half-embedded document.
    async fn store_chunks(
        &self,
        document_id: Uuid,
        records: Vec<ChunkRecord>,
    ) -> Result<(), StoreError>;
}

/// In-memory document store used by tests and standalone deployments.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: Mutex<HashMap<Uuid, Document>>,
    updates: Mutex<HashMap<Uuid, DocumentUpdate>>,
}

impl InMemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document so tasks can reference it.
    pub async fn insert(&self, document: Document) {
        self.documents.lock().await.insert(document.id, document);
    }

    /// Last status update recorded for a document, if any.
    pub async fn last_update(&self, id: Uuid) -> Option<DocumentUpdate> {
        self.updates.lock().await.get(&id).cloned()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_document(&self, id: Uuid) -> Result<Document, StoreError> {
        self.documents
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn update_document(&self, id: Uuid, update: DocumentUpdate) -> Result<(), StoreError> {
        if !self.documents.lock().await.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.updates.lock().await.insert(id, update);
        Ok(())
    }
}

/// In-memory chunk sink used by tests and standalone deployments.
#[derive(Default)]
pub struct InMemoryChunkSink {
    chunks: Mutex<HashMap<Uuid, Vec<ChunkRecord>>>,
}

impl InMemoryChunkSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Persisted chunk records for a document, in chunk order.
    pub async fn chunks_for(&self, document_id: Uuid) -> Vec<ChunkRecord> {
        self.chunks
            .lock()
            .await
            .get(&document_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChunkSink for InMemoryChunkSink {
    async fn store_chunks(
        &self,
        document_id: Uuid,
        records: Vec<ChunkRecord>,
    ) -> Result<(), StoreError> {
        self.chunks.lock().await.insert(document_id, records);
        Ok(())
    }
}
