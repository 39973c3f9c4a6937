//! Per-task execution path: extraction, chunking, embedding, persistence.
//!
//! One call to [`execute_task`] drives a single document through the whole
//! pipeline. Cancellation is cooperative: the body polls the task's status at
//! checkpoints between external calls and bails with [`TaskError::Cancelled`],
//! which the scheduler treats as a non-failure. Any other error aborts the run
//! with nothing persisted, so a retry starts from scratch.

use super::chunking::create_chunks;
use super::tokens::TokenCounter;
use super::types::{ChunkRecord, TaskError};
use crate::embedding::EmbeddingClient;
use crate::extract::TextExtractor;
use crate::queue::task::{ProcessingTask, TaskType};
use crate::store::{ChunkSink, DocumentStore, DocumentUpdate};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Collaborators shared by all task executions.
pub(crate) struct PipelineDeps {
    pub document_store: Arc<dyn DocumentStore>,
    pub extractor: Arc<dyn TextExtractor>,
    pub embedder: Arc<dyn EmbeddingClient>,
    pub chunk_sink: Arc<dyn ChunkSink>,
    pub token_counter: TokenCounter,
}

// Progress budget: extraction and chunking occupy the first 0.4, embedding the
// middle 0.5, persistence the rest.
const PROGRESS_FETCHED: f64 = 0.1;
const PROGRESS_EXTRACTED: f64 = 0.3;
const PROGRESS_CHUNKED: f64 = 0.4;
const EMBEDDING_SPAN: f64 = 0.5;
const PROGRESS_PERSISTED: f64 = 0.95;

/// Execute one task to completion, returning the number of chunks persisted.
pub(crate) async fn execute_task(
    deps: &PipelineDeps,
    task: &ProcessingTask,
) -> Result<usize, TaskError> {
    match task.task_type {
        TaskType::ProcessDocument => process_document(deps, task).await,
    }
}

async fn process_document(deps: &PipelineDeps, task: &ProcessingTask) -> Result<usize, TaskError> {
    let started = Instant::now();

    checkpoint(task)?;
    let document = deps
        .document_store
        .get_document(task.document_id)
        .await
        .map_err(TaskError::Document)?;
    task.set_progress(PROGRESS_FETCHED);

    let raw_text = deps
        .extractor
        .extract_text(&document.file_path, &document.file_type)
        .await?;
    checkpoint(task)?;
    task.set_progress(PROGRESS_EXTRACTED);

    let language = document
        .metainfo
        .get("language")
        .and_then(|value| value.as_str())
        .map(str::to_string);
    let metainfo = json!({
        "document_id": document.id,
        "title": document.title,
        "language": language,
    });
    let chunks = create_chunks(&raw_text, task.chunk_size, task.chunk_overlap, metainfo)?;
    task.set_progress(PROGRESS_CHUNKED);
    tracing::debug!(
        document_id = %document.id,
        chunks = chunks.len(),
        chunk_size = task.chunk_size,
        overlap = task.chunk_overlap,
        "Document chunked"
    );

    let total = chunks.len();
    let mut records = Vec::with_capacity(total);
    for chunk in chunks {
        checkpoint(task)?;
        let embedding = deps.embedder.generate_embedding(&chunk.content).await?;
        let token_count = (deps.token_counter)(&chunk.content);
        task.set_progress(
            PROGRESS_CHUNKED + ((chunk.chunk_index + 1) as f64 / total as f64) * EMBEDDING_SPAN,
        );
        records.push(ChunkRecord {
            document_id: document.id,
            content: chunk.content,
            chunk_index: chunk.chunk_index,
            start_offset: chunk.start_char,
            end_offset: chunk.end_char,
            token_count,
            embedding,
            embedding_model: deps.embedder.model_name().to_string(),
            language: language.clone(),
        });
        // Let sibling tasks and the dispatcher run between embedding calls.
        tokio::task::yield_now().await;
    }

    checkpoint(task)?;
    let chunk_count = records.len();
    deps.chunk_sink
        .store_chunks(document.id, records)
        .await
        .map_err(TaskError::Persistence)?;
    task.set_progress(PROGRESS_PERSISTED);

    deps.document_store
        .update_document(
            document.id,
            DocumentUpdate::completed(chunk_count, started.elapsed()),
        )
        .await
        .map_err(TaskError::Document)?;

    Ok(chunk_count)
}

fn checkpoint(task: &ProcessingTask) -> Result<(), TaskError> {
    if task.is_cancelled() {
        Err(TaskError::Cancelled)
    } else {
        Ok(())
    }
}
