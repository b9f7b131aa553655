//! Backend de chat completions compatível com OpenAI.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::base::{classify_reqwest_error, CompletionOptions, LlmClient};
use crate::types::config::RemoteConfig;
use crate::types::errors::ProviderError;
use crate::{ReformineError, ReformineResult};

/// Cliente da API remota autenticado por bearer key.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Cria o cliente lendo a chave da variável de ambiente configurada.
    ///
    /// Chave ausente ou vazia é erro de configuração.
    pub fn from_config(config: &RemoteConfig) -> ReformineResult<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ReformineError::config(format!(
                    "remote provider requires the {} environment variable",
                    config.api_key_env
                ))
            })?;
        Ok(Self::new(config.base_url.clone(), api_key))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl LlmClient for RemoteClient {
    fn name(&self) -> &str {
        "remote"
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &options.model,
            temperature: options.temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
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

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| classify_reqwest_error(self.name(), &e))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::unknown("remote response carried no message content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_config_error() {
        let config = RemoteConfig {
            base_url: "https://example.invalid/v1".to_string(),
            api_key_env: "REFORMINE_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
        };

        let result = RemoteClient::from_config(&config);

        assert!(matches!(result, Err(ReformineError::Config(_))));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = RemoteClient::new("https://api.example.com/v1/", "key");
        assert_eq!(client.base_url(), "https://api.example.com/v1");
    }

    #[test]
    fn test_response_shape() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"[]"}}]}"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.choices[0].message.content.as_deref(), Some("[]"));
    }
}
