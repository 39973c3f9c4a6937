use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Provider was unable to produce an embedding for the supplied input.
    #[error("Failed to generate embedding: {0}")]
    GenerationFailed(String),
}

/// Interface implemented by embedding backends.
///
/// The pipeline calls this once per chunk, sequentially, so implementations do
/// not need to batch. A failure here is a recoverable task failure and sends
/// the whole document back through the retry path.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for a single chunk of text.
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Model identifier recorded on persisted chunks.
    fn model_name(&self) -> &str;
}

/// Deterministic embedding client that folds bytes into a normalized vector.
///
/// Useful as a stand-in when no provider is configured, and for tests that
/// need stable vectors without network access.
pub struct HashEmbedder {
    dimension: usize,
    model: String,
}

impl HashEmbedder {
    /// Construct a deterministic embedder with the given output dimension.
    pub fn new(dimension: usize, model: impl Into<String>) -> Self {
        Self {
            dimension,
            model: model.into(),
        }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % dimension;
            // Basic hashing of content into the vector slot
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbedder {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if self.dimension == 0 {
            return Err(EmbeddingError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        Ok(Self::encode(text, self.dimension))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vectors_are_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(16, "hash-test");
        let a = embedder.generate_embedding("hello world").await.unwrap();
        let b = embedder.generate_embedding("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);

        let norm = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn zero_dimension_is_rejected() {
        let embedder = HashEmbedder::new(0, "hash-test");
        let error = embedder.generate_embedding("hello").await.unwrap_err();
        assert!(matches!(error, EmbeddingError::GenerationFailed(_)));
    }
}
