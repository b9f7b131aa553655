//! # reformine
//!
//! Minera padrões reutilizáveis de reformulação a partir de pares de consulta
//! original e consulta melhorada. Um LLM propõe padrões lote a lote; as propostas
//! entram numa biblioteca de tamanho limitado e o progresso é salvo em
//! checkpoint a cada lote, permitindo retomar execuções longas.
//!
//! ## Módulos
//!
//! - [`dataset`] - Leitura, amostragem e divisão em lotes dos pares
//! - [`providers`] - Backends de LLM (API remota, Ollama local)
//! - [`extraction`] - Parser, consolidador e o orquestrador
//! - [`checkpoint`] - Checkpoints e artefatos da execução
//! - [`hooks`] - Hooks da execução (logging, métricas, pedidos de parada)
//! - [`cli`] - Interface de linha de comando
//! - [`types`] - Tipos compartilhados

pub mod checkpoint;
#[cfg(feature = "cli")]
pub mod cli;
pub mod dataset;
pub mod extraction;
pub mod hooks;
pub mod providers;
pub mod types;

pub use types::config::{Config, RunConfig};
pub use types::errors::{ReformineError, ReformineResult};
