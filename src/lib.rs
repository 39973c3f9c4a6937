#![deny(missing_docs)]

//! Core library for the docpipe background document-processing service.

/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text extraction from source files.
pub mod extract;
/// Structured logging and tracing setup.
pub mod logging;
/// Queue activity counters.
pub mod metrics;
/// Document chunking and task execution pipeline.
pub mod processing;
/// Priority task queue and scheduler.
pub mod queue;
/// Document and chunk persistence abstractions.
pub mod store;
