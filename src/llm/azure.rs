//! Azure OpenAI chat completions client.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ChatModel;
use crate::config::{AzureConfig, LlmConfig};
use crate::error::ModelError;

/// Chat completions against one Azure OpenAI deployment.
///
/// Every call is bounded by the configured timeout; expiry surfaces as
/// [`ModelError::Timeout`].
#[derive(Debug, Clone)]
pub struct AzureChatModel {
    client: reqwest::Client,
    url: reqwest::Url,
    api_key: String,
    temperature: f32,
    timeout: Duration,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    messages: [RequestMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl AzureChatModel {
    pub fn new(azure: &AzureConfig, config: &LlmConfig) -> Result<Self> {
        anyhow::ensure!(
            !azure.api_key.is_empty(),
            "Azure OpenAI API key is not set (AZURE_OPENAI_API_KEY)"
        );
        let url = azure.deployment_url(&config.deployment, "chat/completions", &config.api_version)?;
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build chat HTTP client")?;

        tracing::info!(deployment = %config.deployment, "chat model client ready");

        Ok(Self {
            client,
            url,
            api_key: azure.api_key.clone(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn send(&self, prompt: &str) -> Result<String, ModelError> {
        let request = CompletionRequest {
            messages: [RequestMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(self.url.clone())
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        debug!(status = %status, "completion response received");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ModelError::EmptyReply)
    }
}

#[async_trait]
impl ChatModel for AzureChatModel {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        tokio::time::timeout(self.timeout, self.send(prompt))
            .await
            .map_err(|_| ModelError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CHAT_PATH: &str = "/openai/deployments/gpt-4o-mini/chat/completions";

    fn test_model(base_url: &str, timeout_secs: u64) -> AzureChatModel {
        let azure = AzureConfig {
            endpoint: base_url.to_string(),
            api_key: "test-key".into(),
        };
        let config = LlmConfig {
            timeout_secs,
            ..LlmConfig::default()
        };
        AzureChatModel::new(&azure, &config).unwrap()
    }

    fn reply(text: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": text}}]
        })
    }

    #[tokio::test]
    async fn complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CHAT_PATH))
            .and(query_param("api-version", "2024-06-01"))
            .and(header("api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "messages": [{"role": "user", "content": "hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("Hi sweetheart")))
            .mount(&server)
            .await;

        let model = test_model(&server.uri(), 5);
        assert_eq!(model.complete("hello").await.unwrap(), "Hi sweetheart");
    }

    #[tokio::test]
    async fn server_error_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let model = test_model(&server.uri(), 5);
        let err = model.complete("hello").await.unwrap_err();
        assert!(matches!(err, ModelError::Api { status: 500, .. }), "got: {err}");
    }

    #[tokio::test]
    async fn empty_choices_is_empty_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let model = test_model(&server.uri(), 5);
        assert!(matches!(
            model.complete("hello").await.unwrap_err(),
            ModelError::EmptyReply
        ));
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(reply("too late"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let model = test_model(&server.uri(), 1);
        let err = model.complete("hello").await.unwrap_err();
        assert!(matches!(err, ModelError::Timeout(_)), "got: {err}");
    }
}
