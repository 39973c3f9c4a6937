//! Document processing: text cleanup, chunking, token counting, task execution.

pub mod chunking;
pub(crate) mod pipeline;
pub mod tokens;
pub mod types;

pub use chunking::{chunk_stream, create_chunks};
pub use types::{ChunkRecord, ChunkingError, TaskError, TextChunk};
