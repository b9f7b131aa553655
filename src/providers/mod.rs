//! Backends de LLM.
//!
//! Os dois backends implementam [`LlmClient`]. [`ProviderClient`] é o conjunto
//! fechado do qual a execução escolhe uma vez, no início, pelo seu [`RunConfig`].

mod base;
mod local;
mod remote;

pub use base::{CompletionOptions, LlmClient};
pub use local::LocalClient;
pub use remote::RemoteClient;

use async_trait::async_trait;

use crate::types::config::{ProviderKind, RunConfig};
use crate::types::errors::ProviderError;
use crate::ReformineResult;

/// Backend escolhido para a execução.
#[derive(Debug, Clone)]
pub enum ProviderClient {
    Remote(RemoteClient),
    Local(LocalClient),
}

impl ProviderClient {
    /// Cria o backend configurado.
    ///
    /// Falha com erro de configuração se a credencial remota estiver ausente.
    pub fn from_run_config(config: &RunConfig) -> ReformineResult<Self> {
        match config.provider {
            ProviderKind::Remote => Ok(Self::Remote(RemoteClient::from_config(&config.remote)?)),
            ProviderKind::Local => Ok(Self::Local(LocalClient::from_config(&config.local))),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Remote(_) => ProviderKind::Remote,
            Self::Local(_) => ProviderKind::Local,
        }
    }
}

#[async_trait]
impl LlmClient for ProviderClient {
    fn name(&self) -> &str {
        match self {
            Self::Remote(c) => c.name(),
            Self::Local(c) => c.name(),
        }
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        match self {
            Self::Remote(c) => c.complete(prompt, options).await,
            Self::Local(c) => c.complete(prompt, options).await,
        }
    }
}
