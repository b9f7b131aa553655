//! A capacidade de completion comum a todos os backends de LLM.

use async_trait::async_trait;
use std::time::Duration;

use crate::types::config::RunConfig;
use crate::types::errors::ProviderError;

/// Parâmetros de cada chamada a [`LlmClient::complete`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl CompletionOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.0,
            timeout: Duration::from_secs(300),
        }
    }

    /// Opções de todas as chamadas de uma execução.
    pub fn from_run_config(config: &RunConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: config.timeout(),
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Backend capaz de transformar um prompt em texto de resposta.
///
/// Implementações fazem uma única requisição e nunca repetem; a política de
/// retry é de quem chama.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Nome do backend nos logs e nos metadados do checkpoint.
    fn name(&self) -> &str;

    /// Envia `prompt` e devolve o texto bruto da resposta.
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, ProviderError>;
}

/// Classifica uma falha de transporte do `reqwest`.
pub(crate) fn classify_reqwest_error(backend: &str, error: &reqwest::Error) -> ProviderError {
    let message = format!("{} request failed: {}", backend, error);
    if error.is_timeout() {
        ProviderError::timeout(message)
    } else if error.is_connect() || error.is_request() {
        ProviderError::transport(message)
    } else if let Some(status) = error.status() {
        ProviderError::from_status(status.as_u16(), &message)
    } else {
        ProviderError::unknown(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_run_config() {
        let run = RunConfig::new("d", "d.tsv", "out")
            .with_timeout(Duration::from_secs(12));

        let options = CompletionOptions::from_run_config(&run);

        assert_eq!(options.model, run.model);
        assert_eq!(options.timeout, Duration::from_secs(12));
    }

    #[test]
    fn test_options_builders() {
        let options = CompletionOptions::new("gpt-4o")
            .with_temperature(0.7)
            .with_timeout(Duration::from_millis(50));

        assert_eq!(options.model, "gpt-4o");
        assert_eq!(options.timeout, Duration::from_millis(50));
        assert!((options.temperature - 0.7).abs() < f32::EPSILON);
    }
}
