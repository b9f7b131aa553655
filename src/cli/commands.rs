//! Implementação dos comandos da CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::checkpoint::{format_summary, read_checkpoint};
use crate::extraction::{Orchestrator, RunStatus};
use crate::types::config::{Config, RunConfig};
use crate::ReformineResult;

use super::{ProgressHook, RunArgs};

/// Cria um `reformine.toml` padrão em `path`.
pub async fn init(path: Option<PathBuf>) -> ReformineResult<()> {
    let target_dir = path.unwrap_or_else(|| PathBuf::from("."));

    if !target_dir.exists() {
        std::fs::create_dir_all(&target_dir)?;
        tracing::info!("Directory created: {}", target_dir.display());
    }

    let config_path = target_dir.join("reformine.toml");

    if config_path.exists() {
        println!("Configuration already exists at: {}", config_path.display());
        return Ok(());
    }

    let config = Config::default_config();
    config.save(&config_path)?;

    println!("Configuration created at: {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Register datasets under [datasets] (id = \"path/to/pairs.tsv\")");
    println!("  2. Pick a backend under [llm] (remote needs {})", config.llm.remote.api_key_env);
    println!("  3. Run: reformine run <dataset>");

    Ok(())
}

/// Executa a extração e informa como ela terminou.
pub async fn run(args: RunArgs, config: &Config) -> ReformineResult<RunStatus> {
    let run_config = RunConfig::from_config(config, &args.dataset, args.overrides())?;
    let mut orchestrator = Orchestrator::from_run_config(run_config)?;
    if !args.no_progress {
        orchestrator = orchestrator.with_hook(Arc::new(ProgressHook::new()));
    }

    let cancel = orchestrator.cancellation_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping before the next batch");
            cancel.cancel();
        }
    });

    let report = orchestrator.run().await?;
    let state = &report.state;

    match report.status {
        RunStatus::Done => {
            println!(
                "Extraction finished: {} patterns from {} pairs ({} failed batches)",
                state.library.len(),
                state.pairs_processed_count,
                state.failed_batches()
            );
            println!("Results written to: {}", report.output_dir.display());
        }
        _ => {
            println!(
                "Extraction stopped after {} of {} batches",
                state.iteration_index, report.metadata.total_batches
            );
            println!(
                "Resume with: reformine run {} --resume --output-dir {}",
                report.metadata.dataset_id,
                report.output_dir.display()
            );
        }
    }

    Ok(report.status)
}

/// Imprime o progresso e a biblioteca de um checkpoint.
pub async fn inspect(output_dir: &Path, tag: &str, json: bool) -> ReformineResult<()> {
    let checkpoint = read_checkpoint(output_dir, tag)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&checkpoint)?);
        return Ok(());
    }

    println!(
        "Checkpoint {} (saved {})",
        checkpoint.tag,
        checkpoint.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();
    print!("{}", format_summary(&checkpoint));

    Ok(())
}

/// Mostra versão.
pub fn version() {
    println!("reformine {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Iterative query-reformulation pattern mining");
}
