//! Tipos de erro do reformine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tipo de resultado padrão do reformine.
pub type ReformineResult<T> = Result<T, ReformineError>;

/// Erros possíveis no reformine.
#[derive(Error, Debug)]
pub enum ReformineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dataset error: {0}")]
    Data(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Checkpoint IO error at '{path}': {message}")]
    Checkpoint { path: String, message: String },

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Run aborted at iteration {iteration} ({kind}): {message}")]
    Aborted {
        iteration: usize,
        kind: String,
        message: String,
    },

    #[error("{0}")]
    Other(String),
}

impl ReformineError {
    /// Cria um erro genérico.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// Cria um erro de configuração.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Cria um erro de dataset.
    pub fn data<S: Into<String>>(msg: S) -> Self {
        Self::Data(msg.into())
    }

    /// Cria um erro de IO de checkpoint para `path`.
    pub fn checkpoint<P: AsRef<std::path::Path>, S: Into<String>>(path: P, msg: S) -> Self {
        Self::Checkpoint {
            path: path.as_ref().display().to_string(),
            message: msg.into(),
        }
    }

    /// Nome curto do tipo de erro, usado nos diagnósticos.
    pub fn kind_name(&self) -> String {
        match self {
            Self::Config(_) => "CONFIG".to_string(),
            Self::Data(_) | Self::Csv(_) => "DATA".to_string(),
            Self::Io(_) => "IO".to_string(),
            Self::Checkpoint { .. } => "CHECKPOINT_IO".to_string(),
            Self::TomlParse(_) | Self::TomlSerialize(_) => "CONFIG".to_string(),
            Self::Json(_) => "JSON".to_string(),
            Self::Provider(e) => format!("PROVIDER_{}", e.kind),
            Self::Parse(_) => "PARSE".to_string(),
            Self::InvariantViolation(_) => "INVARIANT".to_string(),
            Self::Aborted { kind, .. } => kind.clone(),
            Self::Other(_) => "OTHER".to_string(),
        }
    }
}

/// Categoria de uma falha do provider de LLM.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderErrorKind {
    /// Credencial rejeitada ou ausente.
    Auth,
    /// Provider pediu para reduzir o ritmo.
    RateLimit,
    /// Chamada excedeu o timeout configurado.
    Timeout,
    /// Falha de conexão, DNS ou do servidor.
    Transport,
    /// Qualquer falha reportada que não conseguimos classificar.
    Unknown,
}

impl ProviderErrorKind {
    /// Se o orquestrador pode repetir uma chamada que falhou com este tipo.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderErrorKind::Auth)
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderErrorKind::Auth => write!(f, "AUTH"),
            ProviderErrorKind::RateLimit => write!(f, "RATE_LIMIT"),
            ProviderErrorKind::Timeout => write!(f, "TIMEOUT"),
            ProviderErrorKind::Transport => write!(f, "TRANSPORT"),
            ProviderErrorKind::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Falha reportada por um backend de LLM.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Provider error {kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    /// Cria um erro de provider do tipo informado.
    pub fn new<S: Into<String>>(kind: ProviderErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::new(ProviderErrorKind::Auth, message)
    }

    pub fn rate_limit<S: Into<String>>(message: S) -> Self {
        Self::new(ProviderErrorKind::RateLimit, message)
    }

    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }

    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::new(ProviderErrorKind::Transport, message)
    }

    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::new(ProviderErrorKind::Unknown, message)
    }

    /// Se o orquestrador pode repetir esta falha.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Classifica um status HTTP devolvido por um backend.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = format!("HTTP {}: {}", status, body.trim());
        match status {
            401 | 403 => Self::auth(message),
            429 => Self::rate_limit(message),
            408 | 504 => Self::timeout(message),
            500..=599 => Self::transport(message),
            _ => Self::unknown(message),
        }
    }
}

/// Falha, no nível do lote, ao ler propostas da resposta do LLM.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("response contains no JSON array of patterns")]
    NoJsonArray,

    #[error("response JSON is malformed: {0}")]
    InvalidJson(String),

    #[error("all {0} proposals in the response were invalid")]
    NoValidProposals(usize),

    #[error("replacement library has {size} patterns, capacity is {max}")]
    CapacityExceeded { size: usize, max: usize },

    #[error("final consolidation returned no patterns")]
    EmptyFinalLibrary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_auth_is_fatal() {
        assert!(!ProviderErrorKind::Auth.is_retryable());
        assert!(ProviderErrorKind::RateLimit.is_retryable());
        assert!(ProviderErrorKind::Timeout.is_retryable());
        assert!(ProviderErrorKind::Transport.is_retryable());
        assert!(ProviderErrorKind::Unknown.is_retryable());
    }

    #[test]
    fn test_from_status() {
        assert_eq!(ProviderError::from_status(401, "").kind, ProviderErrorKind::Auth);
        assert_eq!(ProviderError::from_status(403, "").kind, ProviderErrorKind::Auth);
        assert_eq!(
            ProviderError::from_status(429, "slow down").kind,
            ProviderErrorKind::RateLimit
        );
        assert_eq!(ProviderError::from_status(504, "").kind, ProviderErrorKind::Timeout);
        assert_eq!(ProviderError::from_status(502, "").kind, ProviderErrorKind::Transport);
        assert_eq!(ProviderError::from_status(418, "").kind, ProviderErrorKind::Unknown);
    }

    #[test]
    fn test_kind_name() {
        let err: ReformineError = ProviderError::auth("bad key").into();
        assert_eq!(err.kind_name(), "PROVIDER_AUTH");
        assert_eq!(ReformineError::config("x").kind_name(), "CONFIG");
        assert_eq!(ReformineError::Parse(ParseError::NoJsonArray).kind_name(), "PARSE");
    }

    #[test]
    fn test_kind_display_is_screaming_case() {
        assert_eq!(ProviderErrorKind::RateLimit.to_string(), "RATE_LIMIT");
        let json = serde_json::to_string(&ProviderErrorKind::RateLimit).unwrap();
        assert_eq!(json, "\"RATE_LIMIT\"");
    }
}
