//! Embedding client seam. The production implementation is `LlmClient`;
//! the ranking pipeline only sees `dyn Embedder`.

use async_trait::async_trait;

use crate::llm_client::{LlmClient, LlmError};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the embedding vector for `text`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

#[async_trait]
impl Embedder for LlmClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embed_text(text).await
    }
}

/// Checks a vector against the configured dimension.
pub fn check_dimension(vector: &[f32], expected: usize) -> Result<(), String> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(format!(
            "Embedding dimension mismatch: expected {expected}, got {}",
            vector.len()
        ))
    }
}
