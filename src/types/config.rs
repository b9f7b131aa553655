//! Configuração do reformine.
//!
//! Duas camadas vivem aqui. [`Config`] espelha o arquivo TOML e tem um padrão
//! para cada campo. [`RunConfig`] é o valor imutável montado uma vez no início
//! da execução a partir do arquivo e dos overrides da linha de comando; todo
//! componente o recebe por referência e nada lê provider ou modelo de estado global.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{ReformineError, ReformineResult};

/// Configuração principal do reformine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configurações gerais.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Configurações dos backends de LLM.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Configurações do loop de extração.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Configurações de retry e backoff.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Configurações de saída.
    #[serde(default)]
    pub output: OutputConfig,

    /// Datasets registrados, `dataset_id -> caminho`.
    #[serde(default)]
    pub datasets: BTreeMap<String, PathBuf>,
}

/// Configurações gerais.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Nível de log (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Formato de log (text, json).
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Backend de LLM usado por uma execução.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// API de chat completions compatível com OpenAI.
    Remote,
    /// Daemon Ollama local.
    Local,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Remote => write!(f, "remote"),
            ProviderKind::Local => write!(f, "local"),
        }
    }
}

/// Como as propostas entram na biblioteca.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum ConsolidationPolicy {
    /// O LLM devolve a biblioteca completa de substituição a cada iteração.
    Consolidated,
    /// O LLM propõe padrões novos ou refinados; a fusão acontece localmente.
    NPattern,
}

impl std::fmt::Display for ConsolidationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsolidationPolicy::Consolidated => write!(f, "consolidated"),
            ConsolidationPolicy::NPattern => write!(f, "n-pattern"),
        }
    }
}

/// Configurações dos backends de LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider padrão.
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,

    /// Nome do modelo padrão.
    #[serde(default = "default_model")]
    pub model: String,

    /// Temperatura de amostragem.
    #[serde(default)]
    pub temperature: f32,

    /// Timeout por chamada (em segundos).
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Configurações da API remota.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Configurações do daemon local.
    #[serde(default)]
    pub local: LocalConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: 0.0,
            timeout_secs: default_llm_timeout(),
            remote: RemoteConfig::default(),
            local: LocalConfig::default(),
        }
    }
}

fn default_provider() -> ProviderKind {
    ProviderKind::Local
}

fn default_model() -> String {
    "qwen2.5:72b".to_string()
}

fn default_llm_timeout() -> u64 {
    300
}

/// Configurações da API remota.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    /// URL base da API de chat completions.
    #[serde(default = "default_remote_base_url")]
    pub base_url: String,

    /// Variável de ambiente com a chave da API.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_remote_base_url(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_remote_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Configurações do daemon local.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalConfig {
    /// URL do host Ollama.
    #[serde(default = "default_local_host")]
    pub host: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            host: default_local_host(),
        }
    }
}

fn default_local_host() -> String {
    std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost:11434".to_string())
}

/// Configurações do loop de extração.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Pares de consulta por lote.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Capacidade da biblioteca.
    #[serde(default = "default_max_patterns")]
    pub max_patterns: usize,

    /// Pares amostrados do dataset (todos quando ausente).
    #[serde(default)]
    pub sample_size: Option<usize>,

    /// Seed da amostragem.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Política de consolidação.
    #[serde(default = "default_policy")]
    pub policy: ConsolidationPolicy,

    /// Número alvo de padrões da consolidação final (desligada quando ausente).
    #[serde(default)]
    pub final_pattern_count: Option<usize>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_patterns: default_max_patterns(),
            sample_size: None,
            seed: default_seed(),
            policy: default_policy(),
            final_pattern_count: None,
        }
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_max_patterns() -> usize {
    10
}

fn default_seed() -> u64 {
    42
}

fn default_policy() -> ConsolidationPolicy {
    ConsolidationPolicy::Consolidated
}

/// Configurações de retry e backoff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Tentativas por lote, incluindo a primeira chamada.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Espera antes do primeiro retry (em milissegundos).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Teto de uma única espera (em milissegundos).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Espera extra aleatória como fração da espera calculada (0.0 - 1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Aborta a execução em vez de falhar o lote quando os retries de parse acabam.
    #[serde(default)]
    pub abort_on_parse_failure: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
            abort_on_parse_failure: false,
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_jitter() -> f64 {
    0.25
}

/// Configurações de saída.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Diretório dos checkpoints e artefatos FINAL.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

impl Config {
    /// Carrega configuração de um arquivo TOML.
    pub fn load<P: AsRef<Path>>(path: P) -> ReformineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Salva configuração em um arquivo TOML.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ReformineResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Cria configuração padrão.
    pub fn default_config() -> Self {
        Self {
            general: GeneralConfig::default(),
            llm: LlmConfig::default(),
            extraction: ExtractionConfig::default(),
            retry: RetryConfig::default(),
            output: OutputConfig::default(),
            datasets: BTreeMap::new(),
        }
    }

    /// Tenta carregar configuração do diretório atual ou usa padrão.
    pub fn load_or_default() -> Self {
        Self::load("reformine.toml").unwrap_or_else(|_| Self::default_config())
    }

    /// Resolve o id de um dataset para um caminho.
    ///
    /// Ids não registrados são tratados como caminhos.
    pub fn dataset_path(&self, dataset_id: &str) -> PathBuf {
        self.datasets
            .get(dataset_id)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(dataset_id))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

/// Valores da linha de comando que têm precedência sobre o arquivo.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub batch_size: Option<usize>,
    pub max_patterns: Option<usize>,
    pub sample_size: Option<usize>,
    pub seed: Option<u64>,
    pub policy: Option<ConsolidationPolicy>,
    pub output_dir: Option<PathBuf>,
    pub resume_tag: Option<String>,
    pub final_pattern_count: Option<usize>,
}

/// Configuração imutável de uma execução de extração.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    pub dataset_id: String,
    pub dataset_path: PathBuf,
    pub provider: ProviderKind,
    pub model: String,
    pub temperature: f32,
    pub timeout_ms: u64,
    pub batch_size: usize,
    pub max_patterns: usize,
    pub sample_size: Option<usize>,
    pub seed: u64,
    pub policy: ConsolidationPolicy,
    #[serde(default)]
    pub final_pattern_count: Option<usize>,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub resume_tag: Option<String>,
    pub retry: RetryConfig,
    pub remote: RemoteConfig,
    pub local: LocalConfig,
}

impl RunConfig {
    /// Cria uma configuração de execução com valores padrão para um dataset.
    pub fn new(
        dataset_id: impl Into<String>,
        dataset_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let defaults = Config::default_config();
        Self {
            dataset_id: dataset_id.into(),
            dataset_path: dataset_path.into(),
            provider: defaults.llm.provider,
            model: defaults.llm.model,
            temperature: defaults.llm.temperature,
            timeout_ms: defaults.llm.timeout_secs * 1000,
            batch_size: defaults.extraction.batch_size,
            max_patterns: defaults.extraction.max_patterns,
            sample_size: defaults.extraction.sample_size,
            seed: defaults.extraction.seed,
            policy: defaults.extraction.policy,
            final_pattern_count: defaults.extraction.final_pattern_count,
            output_dir: output_dir.into(),
            resume_tag: None,
            retry: defaults.retry,
            remote: defaults.llm.remote,
            local: defaults.llm.local,
        }
    }

    /// Combina a configuração do arquivo com os overrides da linha de comando.
    pub fn from_config(
        config: &Config,
        dataset_id: &str,
        overrides: RunOverrides,
    ) -> ReformineResult<Self> {
        let run = Self {
            dataset_id: dataset_id.to_string(),
            dataset_path: config.dataset_path(dataset_id),
            provider: overrides.provider.unwrap_or(config.llm.provider),
            model: overrides.model.unwrap_or_else(|| config.llm.model.clone()),
            temperature: config.llm.temperature,
            timeout_ms: config.llm.timeout_secs.saturating_mul(1000),
            batch_size: overrides.batch_size.unwrap_or(config.extraction.batch_size),
            max_patterns: overrides
                .max_patterns
                .unwrap_or(config.extraction.max_patterns),
            sample_size: overrides.sample_size.or(config.extraction.sample_size),
            seed: overrides.seed.unwrap_or(config.extraction.seed),
            policy: overrides.policy.unwrap_or(config.extraction.policy),
            final_pattern_count: overrides
                .final_pattern_count
                .or(config.extraction.final_pattern_count),
            output_dir: overrides
                .output_dir
                .unwrap_or_else(|| config.output.dir.clone()),
            resume_tag: overrides.resume_tag,
            retry: config.retry.clone(),
            remote: config.llm.remote.clone(),
            local: config.llm.local.clone(),
        };
        run.validate()?;
        Ok(run)
    }

    /// Verifica as restrições de parâmetros aplicadas no início da execução.
    pub fn validate(&self) -> ReformineResult<()> {
        if self.max_patterns == 0 {
            return Err(ReformineError::config("max_patterns must be greater than 0"));
        }
        if self.batch_size == 0 {
            return Err(ReformineError::config("batch_size must be greater than 0"));
        }
        if let Some(sample_size) = self.sample_size {
            if sample_size < self.batch_size {
                return Err(ReformineError::config(format!(
                    "sample_size ({}) must be at least batch_size ({})",
                    sample_size, self.batch_size
                )));
            }
        }
        if self.timeout_ms == 0 {
            return Err(ReformineError::config("llm.timeout_secs must be greater than 0"));
        }
        if self.final_pattern_count == Some(0) {
            return Err(ReformineError::config(
                "extraction.final_pattern_count must be greater than 0",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ReformineError::config("retry.max_attempts must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(ReformineError::config("retry.jitter must be within 0.0 and 1.0"));
        }
        if self.model.trim().is_empty() {
            return Err(ReformineError::config("model must not be empty"));
        }
        Ok(())
    }

    /// Timeout por chamada.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn with_provider(mut self, provider: ProviderKind, model: impl Into<String>) -> Self {
        self.provider = provider;
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_max_patterns(mut self, max_patterns: usize) -> Self {
        self.max_patterns = max_patterns;
        self
    }

    #[must_use]
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = Some(sample_size);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ConsolidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_final_pattern_count(mut self, count: usize) -> Self {
        self.final_pattern_count = Some(count);
        self
    }

    #[must_use]
    pub fn with_resume_tag(mut self, tag: impl Into<String>) -> Self {
        self.resume_tag = Some(tag.into());
        self
    }
}
