//! Chat model client.
//!
//! [`ChatModel`] is the seam the response generator calls through; the Azure
//! OpenAI implementation lives in [`azure`].

pub mod azure;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::HeirloomConfig;
use crate::error::ModelError;

/// A single-turn text completion model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send `prompt` as one user message and return the reply text.
    async fn complete(&self, prompt: &str) -> Result<String, ModelError>;
}

/// Create the chat model client from config. Failure here is fatal at startup.
pub fn create_model(config: &HeirloomConfig) -> Result<Box<dyn ChatModel>> {
    let model = azure::AzureChatModel::new(&config.azure, &config.llm)?;
    Ok(Box::new(model))
}
