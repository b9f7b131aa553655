//! Backend do daemon Ollama local.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::base::{classify_reqwest_error, CompletionOptions, LlmClient};
use crate::types::config::LocalConfig;
use crate::types::errors::ProviderError;

/// Cliente do endpoint `/api/chat` do Ollama.
#[derive(Debug, Clone)]
pub struct LocalClient {
    http: reqwest::Client,
    host: String,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

impl LocalClient {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            host: host.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &LocalConfig) -> Self {
        Self::new(config.host.clone())
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait]
impl LlmClient for LocalClient {
    fn name(&self) -> &str {
        "local"
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/api/chat", self.host);
        let request = OllamaChatRequest {
            model: &options.model,
            messages: vec![OllamaMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            options: OllamaOptions {
                temperature: options.temperature,
            },
        };

        let response = self
            .http
            .post(&url)
            .timeout(options.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(self.name(), &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        let body: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| classify_reqwest_error(self.name(), &e))?;

        tracing::debug!(
            model = %options.model,
            chars = body.message.content.len(),
            "Ollama response received"
        );
        Ok(body.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_normalized() {
        let client = LocalClient::new("http://localhost:11434/");
        assert_eq!(client.host(), "http://localhost:11434");
    }

    #[test]
    fn test_request_disables_streaming() {
        let request = OllamaChatRequest {
            model: "qwen2.5:72b",
            messages: vec![OllamaMessage {
                role: "user",
                content: "hi",
            }],
            stream: false,
            options: OllamaOptions { temperature: 0.0 },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["content"], "hi");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_retryable() {
        let client = LocalClient::new("http://127.0.0.1:9");
        let options = CompletionOptions::new("m").with_timeout(std::time::Duration::from_secs(2));

        let err = client.complete("hi", &options).await.unwrap_err();

        assert!(err.is_retryable());
    }
}
