// Embeddings module
// Fixed-window chunking and the Ollama client that turns text into vectors

pub mod chunking;
pub mod ollama;

use thiserror::Error;
use tracing::debug;

pub use chunking::{ChunkingConfig, chunk_text, expected_chunk_count};
pub use ollama::{EmbeddingApi, OllamaClient};

/// Failure of a request to the model service, or of an embedding batch.
///
/// The transport variants are shared by every Ollama endpoint, chat
/// included. Any of these aborts the enclosing corpus build or query: a
/// missing vector would shift every later chunk out of alignment with its
/// embedding.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Invalid service URL: {0}")]
    Url(String),
    #[error("Request to model service failed: {0}")]
    Request(String),
    #[error("Model service returned HTTP {0}")]
    Status(u16),
    #[error("Invalid response from model service: {0}")]
    InvalidResponse(String),
    #[error("Expected {expected} embeddings, received {actual}")]
    CountMismatch { expected: usize, actual: usize },
    #[error("Embedding dimension {actual} does not match {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Anything that can turn text into fixed-dimension vectors
pub trait Embedder: Send + Sync {
    /// Name of the model behind the vectors. Vectors from different models
    /// are never compared with each other.
    fn embedding_model(&self) -> &str;

    /// Embed one batch of texts with a single round of calls to the backend.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed `texts` in order, `batch_size` at a time, and concatenate the results.
    fn embed(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());

        for batch in texts.chunks(batch_size.max(1)) {
            let embedded = self.embed_batch(batch)?;
            if embedded.len() != batch.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: batch.len(),
                    actual: embedded.len(),
                });
            }
            vectors.extend(embedded);
        }

        if let Some(first) = vectors.first() {
            let expected = first.len();
            if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
                return Err(EmbeddingError::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }

        debug!(
            "Embedded {} texts in {} batches",
            vectors.len(),
            texts.len().div_ceil(batch_size.max(1))
        );
        Ok(vectors)
    }

    /// Embed a single search query.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()])?;
        if vectors.len() != 1 {
            return Err(EmbeddingError::CountMismatch {
                expected: 1,
                actual: vectors.len(),
            });
        }
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }
}
