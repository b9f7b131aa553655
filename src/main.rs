use std::process::ExitCode;

use clap::Parser;
use reformine::cli::{Cli, Commands};
use reformine::extraction::RunStatus;
use reformine::types::config::Config;
use reformine::{ReformineError, ReformineResult};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Código de saída de uma execução interrompida.
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Carrega a configuração antes do logging
    let config = if cli.config.exists() {
        match Config::load(&cli.config) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: cannot read {}: {}", cli.config.display(), e);
                return ExitCode::from(2);
            }
        }
    } else {
        Config::default_config()
    };

    init_logging(&cli, &config);
    tracing::debug!("Configuration loaded from: {}", cli.config.display());

    match dispatch(cli, &config).await {
        Ok(Some(RunStatus::Cancelled)) => ExitCode::from(EXIT_CANCELLED),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            report_failure(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli, config: &Config) {
    // Flags da CLI têm precedência sobre a configuração
    let log_level = if cli.quiet {
        "error".to_string()
    } else if cli.verbose {
        "debug".to_string()
    } else {
        config.general.log_level.clone()
    };

    let filter = EnvFilter::from_default_env().add_directive(
        format!("reformine={}", log_level)
            .parse()
            .unwrap_or_else(|_| "reformine=info".parse().expect("fallback directive is valid")),
    );

    if config.general.log_format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

async fn dispatch(cli: Cli, config: &Config) -> ReformineResult<Option<RunStatus>> {
    let quiet = cli.quiet;
    match cli.command {
        Commands::Init { path } => {
            reformine::cli::commands::init(path).await?;
        }
        Commands::Run(mut args) => {
            args.no_progress |= quiet;
            let status = reformine::cli::commands::run(args, config).await?;
            return Ok(Some(status));
        }
        Commands::Inspect {
            output_dir,
            tag,
            json,
        } => {
            let dir = output_dir.unwrap_or_else(|| config.output.dir.clone());
            reformine::cli::commands::inspect(&dir, &tag, json).await?;
        }
        Commands::Version => {
            reformine::cli::commands::version();
        }
    }

    Ok(None)
}

fn report_failure(error: &ReformineError) {
    match error {
        ReformineError::Aborted {
            iteration,
            kind,
            message,
        } => {
            eprintln!("error: run aborted at batch {} ({})", iteration, kind);
            eprintln!("  {}", message);
            eprintln!("  the last LIVE checkpoint is intact and can be resumed");
        }
        other => eprintln!("error [{}]: {}", other.kind_name(), other),
    }
}
