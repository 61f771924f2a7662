//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait and an Azure OpenAI implementation.
//! The provider is created via [`create_provider`] from configuration.

pub mod azure;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::HeirloomConfig;
use crate::error::EmbeddingError;

/// Trait for embedding text into vectors.
///
/// Implementations produce vectors of exactly [`EmbeddingProvider::dimensions`]
/// dimensions, one per input, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of text strings.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text string into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(EmbeddingError::CountMismatch {
                expected: 1,
                got: vectors.len(),
            });
        }
        Ok(vectors.remove(0))
    }

    /// Number of dimensions this provider produces.
    fn dimensions(&self) -> usize;

    /// Model identifier recorded alongside the vectors it produced.
    fn model(&self) -> &str;
}

/// Create an embedding provider from config.
///
/// Currently only `"azure"` is supported.
pub fn create_provider(config: &HeirloomConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.embedding.provider.as_str() {
        "azure" => {
            let provider = azure::AzureEmbeddingProvider::new(&config.azure, &config.embedding)?;
            Ok(Box::new(provider))
        }
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: azure"),
    }
}

/// Convert an f32 embedding slice to raw bytes for sqlite-vec.
pub fn embedding_to_bytes(embedding: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            embedding.as_ptr() as *const u8,
            embedding.len() * std::mem::size_of::<f32>(),
        )
    }
}
