//! Interface de linha de comando do reformine.

pub mod commands;
mod progress;

pub use progress::ProgressHook;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::checkpoint::LIVE_TAG;
use crate::types::config::{ConsolidationPolicy, ProviderKind, RunOverrides};

/// reformine - mineração de padrões de reformulação de consultas com LLM.
#[derive(Parser, Debug)]
#[command(name = "reformine")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Arquivo de configuração.
    #[arg(short, long, default_value = "reformine.toml")]
    pub config: PathBuf,

    /// Modo verbose.
    #[arg(short, long)]
    pub verbose: bool,

    /// Modo silencioso.
    #[arg(short, long)]
    pub quiet: bool,

    /// Comando a executar.
    #[command(subcommand)]
    pub command: Commands,
}

/// Comandos disponíveis.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Cria o arquivo de configuração padrão.
    Init {
        /// Diretório de destino (padrão: diretório atual).
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Executa a extração de padrões sobre um dataset.
    Run(RunArgs),

    /// Mostra o progresso e a biblioteca de um checkpoint.
    Inspect {
        /// Diretório com os checkpoints.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Tag do checkpoint.
        #[arg(short, long, default_value = LIVE_TAG)]
        tag: String,

        /// Imprime o checkpoint em JSON.
        #[arg(long)]
        json: bool,
    },

    /// Mostra versão.
    Version,
}

/// Opções do comando `run`. O que não for informado vem do arquivo de configuração.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Id de dataset registrado na configuração, ou caminho de um arquivo.
    pub dataset: String,

    /// Backend do LLM.
    #[arg(long, value_enum)]
    pub provider: Option<ProviderKind>,

    /// Modelo.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Pares por lote.
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Capacidade da biblioteca.
    #[arg(long)]
    pub max_patterns: Option<usize>,

    /// Funde a biblioteca em até N padrões ao final da execução.
    #[arg(long, value_name = "N")]
    pub final_patterns: Option<usize>,

    /// Pares amostrados do dataset (todos, se omitido).
    #[arg(short, long)]
    pub sample_size: Option<usize>,

    /// Semente da amostragem.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Política de consolidação.
    #[arg(short, long, value_enum)]
    pub policy: Option<ConsolidationPolicy>,

    /// Diretório de saída.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Retoma de uma tag de checkpoint (LIVE se a tag for omitida).
    #[arg(long, value_name = "TAG", num_args = 0..=1, default_missing_value = LIVE_TAG)]
    pub resume: Option<String>,

    /// Esconde a barra de progresso.
    #[arg(long)]
    pub no_progress: bool,
}

impl RunArgs {
    pub fn overrides(&self) -> RunOverrides {
        RunOverrides {
            provider: self.provider,
            model: self.model.clone(),
            batch_size: self.batch_size,
            max_patterns: self.max_patterns,
            sample_size: self.sample_size,
            seed: self.seed,
            policy: self.policy,
            output_dir: self.output_dir.clone(),
            resume_tag: self.resume.clone(),
            final_pattern_count: self.final_patterns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "reformine",
            "run",
            "msmarco",
            "--provider",
            "remote",
            "--policy",
            "n-pattern",
            "-b",
            "5",
            "--resume",
        ]);

        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        let overrides = args.overrides();
        assert_eq!(args.dataset, "msmarco");
        assert_eq!(overrides.provider, Some(ProviderKind::Remote));
        assert_eq!(overrides.policy, Some(ConsolidationPolicy::NPattern));
        assert_eq!(overrides.batch_size, Some(5));
        assert_eq!(overrides.resume_tag.as_deref(), Some("LIVE"));
    }

    #[test]
    fn test_parse_final_patterns() {
        let cli = Cli::parse_from(["reformine", "run", "d.tsv", "--final-patterns", "10"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.overrides().final_pattern_count, Some(10));
    }

    #[test]
    fn test_parse_resume_with_tag() {
        let cli = Cli::parse_from(["reformine", "run", "d.tsv", "--resume", "FINAL"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.resume.as_deref(), Some("FINAL"));
    }

    #[test]
    fn test_parse_inspect_defaults() {
        let cli = Cli::parse_from(["reformine", "inspect"]);
        assert!(matches!(cli.command, Commands::Inspect { ref tag, .. } if tag == "LIVE"));
    }
}
