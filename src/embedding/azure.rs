//! Azure OpenAI embedding provider.
//!
//! Implements [`EmbeddingProvider`] against the `embeddings` operation of an
//! Azure OpenAI deployment (default `text-embedding-3-large`).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::EmbeddingProvider;
use crate::config::{AzureConfig, EmbeddingConfig};
use crate::error::EmbeddingError;

/// Azure OpenAI embedding client.
pub struct AzureEmbeddingProvider {
    client: reqwest::Client,
    url: reqwest::Url,
    api_key: String,
    deployment: String,
    dimensions: usize,
    batch_size: usize,
    timeout: Duration,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl AzureEmbeddingProvider {
    pub fn new(azure: &AzureConfig, config: &EmbeddingConfig) -> Result<Self> {
        anyhow::ensure!(
            !azure.api_key.is_empty(),
            "Azure OpenAI API key is not set (AZURE_OPENAI_API_KEY)"
        );
        anyhow::ensure!(config.dimensions > 0, "embedding.dimensions must be positive");

        let url = azure.deployment_url(&config.deployment, "embeddings", &config.api_version)?;
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build embedding HTTP client")?;

        tracing::info!(deployment = %config.deployment, dims = config.dimensions, "embedding provider ready");

        Ok(Self {
            client,
            url,
            api_key: azure.api_key.clone(),
            deployment: config.deployment.clone(),
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let response = self
            .client
            .post(self.url.clone())
            .header("api-key", &self.api_key)
            .json(&EmbeddingRequest { input: texts })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let mut parsed: EmbeddingResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                got: parsed.data.len(),
            });
        }

        parsed.data.sort_by_key(|d| d.index);
        let mut vectors = Vec::with_capacity(parsed.data.len());
        for item in parsed.data {
            if item.embedding.len() != self.dimensions {
                return Err(EmbeddingError::Dimensions {
                    expected: self.dimensions,
                    got: item.embedding.len(),
                });
            }
            vectors.push(item.embedding);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for AzureEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let vectors = tokio::time::timeout(self.timeout, self.request(chunk))
                .await
                .map_err(|_| EmbeddingError::Timeout(self.timeout))??;
            results.extend(vectors);
        }
        Ok(results)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.deployment
    }
}
