//! Token counting for persisted chunk records.
//!
//! Prefers `tiktoken-rs` for OpenAI/known encodings and falls back to a
//! whitespace counter when no encoder is available for the configured model
//! (common for locally aliased models).

use anyhow::Error as TokenizerError;
use std::sync::Arc;
use tiktoken_rs::{cl100k_base, get_bpe_from_model};

/// Counts tokens in a text segment.
pub type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Build a token counter for the given embedding model.
///
/// Falls back to `cl100k_base` for unknown models, and to whitespace counting
/// when no encoder can be constructed at all. Fallbacks are logged so a
/// surprising `token_count` can be diagnosed without stopping ingestion.
pub fn token_counter(model: &str) -> TokenCounter {
    match resolve_encoding(model) {
        Ok(encoding) => {
            let encoding = Arc::new(encoding);
            Arc::new(move |segment: &str| encoding.encode_ordinary(segment).len())
        }
        Err(error) => {
            tracing::warn!(
                model,
                error = %error,
                "Tokenizer unavailable; falling back to whitespace counter"
            );
            whitespace_counter()
        }
    }
}

fn resolve_encoding(model: &str) -> Result<tiktoken_rs::CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; using 'cl100k_base' encoding"
            );
            cl100k_base()
        }
    }
}

fn whitespace_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_counts_tokens() {
        let counter = token_counter("text-embedding-3-small");
        let count = counter("The quick brown fox jumps over the lazy dog.");
        assert!(count > 0);
        assert!(count <= 12);
    }

    #[test]
    fn unknown_model_still_counts() {
        let counter = token_counter("totally-local-model");
        assert!(counter("one two three") > 0);
    }

    #[test]
    fn whitespace_fallback_counts_words() {
        let counter = whitespace_counter();
        assert_eq!(counter("one two three"), 3);
        assert_eq!(counter(""), 0);
        assert_eq!(counter("…"), 1);
    }
}
