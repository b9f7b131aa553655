//! O laço de extração.
//!
//! Fases: `INIT -> RUNNING -> (RETRYING) -> FINALIZING -> DONE`, com `ABORTED`
//! como fase terminal de falha. Os lotes são processados estritamente em
//! ordem, com uma única chamada ao LLM em andamento, e o checkpoint LIVE é
//! gravado antes do próximo lote começar.
//!
//! Em FINALIZING, se `final_pattern_count` estiver definido e a biblioteca for
//! maior que ele, uma consolidação final funde os padrões antes dos artefatos
//! FINAL serem gravados.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::backoff::Backoff;
use super::consolidator::{resolve_mappings, Consolidator, DiscardedProposal, FinalOutcome};
use super::parser::{parse_response, PartialParseWarning};
use super::prompt::{PromptBuilder, TemplatePromptBuilder};
use super::state::{
    BatchOutcome, ExtractionState, FinalConsolidation, IterationRecord, MappingRecord,
};
use crate::checkpoint::{
    write_final_artifacts, write_live_snapshots, CheckpointManager, RunMetadata, FINAL_TAG,
    LIVE_TAG,
};
use crate::dataset::{Batch, BatchScheduler, QueryPairSource};
use crate::hooks::{Hook, HookResult, HookSystem, Metrics, MetricsHook};
use crate::providers::{CompletionOptions, LlmClient, ProviderClient};
use crate::types::config::RunConfig;
use crate::types::errors::ProviderError;
use crate::types::pattern::PatternLibrary;
use crate::{ReformineError, ReformineResult};

// ═══════════════════════════════════════════════════════════════════════════
// Status da execução
// ═══════════════════════════════════════════════════════════════════════════

/// Fase da máquina de estados da execução.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    Init,
    Running,
    Retrying,
    Finalizing,
    Done,
    Aborted,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Init => write!(f, "INIT"),
            RunPhase::Running => write!(f, "RUNNING"),
            RunPhase::Retrying => write!(f, "RETRYING"),
            RunPhase::Finalizing => write!(f, "FINALIZING"),
            RunPhase::Done => write!(f, "DONE"),
            RunPhase::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Como a execução terminou.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Todos os lotes processados e artefatos FINAL gravados.
    Done,
    /// Parada a pedido; o checkpoint LIVE guarda o progresso.
    Cancelled,
    Aborted,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Done => write!(f, "DONE"),
            RunStatus::Cancelled => write!(f, "CANCELLED"),
            RunStatus::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Pedido cooperativo de parada, verificado antes de cada lote.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Resultado de uma execução que não abortou.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub state: ExtractionState,
    pub metadata: RunMetadata,
    pub output_dir: PathBuf,
    pub artifacts: Vec<PathBuf>,
    pub metrics: Metrics,
}

/// Resultado de um lote antes de ser gravado no estado.
struct BatchStep {
    library: PatternLibrary,
    mappings: Vec<MappingRecord>,
    record: IterationRecord,
    discarded: Vec<DiscardedProposal>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Orquestrador
// ═══════════════════════════════════════════════════════════════════════════

/// Conduz uma execução da configuração até os artefatos FINAL.
pub struct Orchestrator<C: LlmClient> {
    config: RunConfig,
    client: C,
    prompts: Box<dyn PromptBuilder>,
    hooks: HookSystem,
    metrics: Arc<MetricsHook>,
    cancel: CancellationFlag,
    phase: RunPhase,
}

impl Orchestrator<ProviderClient> {
    /// Orquestrador ligado ao backend escolhido em `config`.
    ///
    /// Falha quando o backend remoto é escolhido sem credencial.
    pub fn from_run_config(config: RunConfig) -> ReformineResult<Self> {
        let client = ProviderClient::from_run_config(&config)?;
        Ok(Self::new(config, client))
    }
}

impl<C: LlmClient> Orchestrator<C> {
    pub fn new(config: RunConfig, client: C) -> Self {
        let metrics = Arc::new(MetricsHook::new());
        let mut hooks = HookSystem::with_defaults();
        hooks.register(metrics.clone());

        Self {
            config,
            client,
            prompts: Box::new(TemplatePromptBuilder::new()),
            hooks,
            metrics,
            cancel: CancellationFlag::new(),
            phase: RunPhase::Init,
        }
    }

    #[must_use]
    pub fn with_prompt_builder(mut self, prompts: Box<dyn PromptBuilder>) -> Self {
        self.prompts = prompts;
        self
    }

    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.register(hook);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.metrics()
    }

    fn transition(&mut self, phase: RunPhase) {
        if self.phase != phase {
            tracing::debug!(from = %self.phase, to = %phase, "Run phase changed");
            self.phase = phase;
        }
    }

    /// Executa até esgotar a amostra, receber um pedido de parada ou achar um erro fatal.
    ///
    /// Erros fatais voltam como [`ReformineError::Aborted`] com o lote que
    /// falhou; o último checkpoint LIVE fica intacto.
    pub async fn run(&mut self) -> ReformineResult<RunReport> {
        self.transition(RunPhase::Init);
        self.config.validate()?;

        let sampled =
            QueryPairSource::from_run_config(&self.config).load(self.config.sample_size)?;
        let scheduler = BatchScheduler::new(sampled.pairs, self.config.batch_size)?;
        let metadata = RunMetadata::new(
            &self.config,
            sampled.fingerprint,
            scheduler.total_pairs(),
            scheduler.total_batches(),
        );
        let mut checkpoints = CheckpointManager::new(&self.config.output_dir, metadata)?;

        let mut state = match self.config.resume_tag.clone() {
            Some(tag) => checkpoints.load(&tag)?,
            None => ExtractionState::new(),
        };
        self.metrics.restore(&state);

        let consolidator = Consolidator::new(self.config.policy, self.config.max_patterns);
        let options = CompletionOptions::from_run_config(&self.config);

        tracing::info!(
            run_id = %checkpoints.metadata().run_id,
            dataset = %self.config.dataset_id,
            provider = %self.client.name(),
            model = %self.config.model,
            policy = %self.config.policy,
            batches = scheduler.total_batches(),
            start_batch = state.iteration_index,
            "Starting pattern extraction"
        );

        self.transition(RunPhase::Running);

        while let Some(batch) = scheduler.next(&state) {
            if self.cancel.is_cancelled() {
                tracing::info!(
                    iteration = batch.iteration_index,
                    "Cancellation requested, stopping before batch"
                );
                return self.finish_cancelled(state, &checkpoints).await;
            }

            let step = match self.process_batch(&batch, &state, &consolidator, &options).await {
                Ok(step) => step,
                Err(e) => return Err(self.abort(&state, batch.iteration_index, e).await),
            };

            let record = step.record.clone();
            state.commit(step.library, step.mappings, step.record);

            if let Err(e) = self.check_invariants(&state) {
                return Err(self.abort(&state, batch.iteration_index, e).await);
            }

            let saved = checkpoints
                .save(&state, LIVE_TAG)
                .and_then(|_| write_live_snapshots(checkpoints.dir(), &state));
            if let Err(e) = saved {
                return Err(self.abort(&state, batch.iteration_index, e).await);
            }

            for discarded in &step.discarded {
                let notified = self
                    .hooks
                    .run_proposal_discarded(batch.iteration_index, discarded)
                    .await;
                if let Err(e) = notified {
                    return Err(self.abort(&state, batch.iteration_index, e).await);
                }
            }

            let hook_result = match self
                .hooks
                .run_batch_completed(&record, &state, scheduler.total_batches())
                .await
            {
                Ok(result) => result,
                Err(e) => return Err(self.abort(&state, batch.iteration_index, e).await),
            };
            if hook_result == HookResult::Stop {
                self.cancel.cancel();
            }
        }

        self.transition(RunPhase::Finalizing);
        if let Some(target) = self.config.final_pattern_count {
            if state.final_consolidation.is_none() && state.library.len() > target {
                let finalized = self
                    .finalize_library(&mut state, target, &consolidator, &options)
                    .await;
                if let Err(e) = finalized {
                    return Err(self.abort(&state, state.iteration_index, e).await);
                }
            }
        }

        let checkpoint = match checkpoints.save(&state, FINAL_TAG) {
            Ok(checkpoint) => checkpoint,
            Err(e) => return Err(self.abort(&state, state.iteration_index, e).await),
        };
        let metrics = Metrics::from_state(&state);
        let artifacts =
            match write_final_artifacts(checkpoints.dir(), &checkpoint, Some(&metrics)) {
                Ok(paths) => paths,
                Err(e) => return Err(self.abort(&state, state.iteration_index, e).await),
            };

        if let Err(e) = self.hooks.run_run_finished(RunStatus::Done, &state).await {
            return Err(self.abort(&state, state.iteration_index, e).await);
        }
        self.transition(RunPhase::Done);

        Ok(RunReport {
            status: RunStatus::Done,
            state,
            metadata: checkpoints.metadata().clone(),
            output_dir: checkpoints.dir().to_path_buf(),
            artifacts,
            metrics,
        })
    }

    /// Monta o prompt, faz o parse e consolida um lote, repetindo falhas transitórias.
    async fn process_batch(
        &mut self,
        batch: &Batch,
        state: &ExtractionState,
        consolidator: &Consolidator,
        options: &CompletionOptions,
    ) -> ReformineResult<BatchStep> {
        let prompt = self.prompts.build(
            &batch.pairs,
            &state.library,
            self.config.policy,
            self.config.max_patterns,
        );
        let backoff = Backoff::from_config(&self.config.retry);
        let max_attempts = self.config.retry.max_attempts;

        tracing::debug!(
            iteration = batch.iteration_index,
            pairs = batch.len(),
            prompt_chars = prompt.len(),
            "Processing batch"
        );

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.transition(RunPhase::Running);

            let error = match self.attempt(&prompt, options, batch, state, consolidator).await {
                Ok(step) => return Ok(step.with_attempts(attempt)),
                Err(e) => e,
            };

            if !is_retryable(&error) {
                return Err(error);
            }

            let kind = error.kind_name();
            if attempt >= max_attempts {
                if self.aborts_on(&error) {
                    return Err(error);
                }
                tracing::warn!(
                    iteration = batch.iteration_index,
                    attempts = attempt,
                    error_kind = %kind,
                    error = %error,
                    "Retries exhausted, marking batch as failed"
                );
                return Ok(failed_step(batch, state, attempt, kind));
            }

            let delay = backoff.delay(attempt);
            self.transition(RunPhase::Retrying);
            tracing::warn!(
                iteration = batch.iteration_index,
                attempt,
                error_kind = %kind,
                delay_ms = delay.as_millis() as u64,
                "Attempt failed, retrying"
            );
            self.hooks
                .run_retry_scheduled(
                    batch.iteration_index,
                    attempt,
                    delay,
                    &kind,
                    &error.to_string(),
                )
                .await?;
            tokio::time::sleep(delay).await;
        }
    }

    /// Uma chamada ao LLM seguida de parse e consolidação.
    async fn attempt(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        batch: &Batch,
        state: &ExtractionState,
        consolidator: &Consolidator,
    ) -> ReformineResult<BatchStep> {
        let response = self.complete(prompt, options).await?;
        let parsed = parse_response(&response)?;
        let outcome = consolidator.consolidate(&state.library, &parsed.proposals, &batch.pairs)?;
        let mappings = resolve_mappings(&batch.pairs, &parsed.individual, &outcome.library);

        let record = IterationRecord {
            iteration_index: batch.iteration_index,
            batch_outcome: BatchOutcome::Succeeded,
            library_size: outcome.library.len(),
            newly_added: outcome.newly_added,
            evicted: outcome.evicted,
            attempts: 1,
            retries: 0,
            pairs: batch.len(),
            discarded: outcome
                .discarded
                .iter()
                .map(|d| d.pattern_name.clone())
                .collect(),
            warnings: parsed.warnings.iter().map(|w| w.to_string()).collect(),
            error_kind: None,
        };

        Ok(BatchStep {
            library: outcome.library,
            mappings,
            record,
            discarded: outcome.discarded,
        })
    }

    /// Consolidação final: funde a biblioteca em no máximo `target` padrões.
    ///
    /// Esgotadas as tentativas, a biblioteca fica como estava.
    async fn finalize_library(
        &mut self,
        state: &mut ExtractionState,
        target: usize,
        consolidator: &Consolidator,
        options: &CompletionOptions,
    ) -> ReformineResult<()> {
        let prompt = self.prompts.build_final(&state.library, target);
        let backoff = Backoff::from_config(&self.config.retry);
        let max_attempts = self.config.retry.max_attempts;

        tracing::info!(
            patterns = state.library.len(),
            target,
            "Running final consolidation"
        );

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let result = self
                .final_attempt(&prompt, options, &state.library, consolidator, target)
                .await;

            let error = match result {
                Ok((outcome, warnings)) => {
                    let record = FinalConsolidation {
                        target,
                        patterns_before: state.library.len(),
                        patterns_after: outcome.library.len(),
                        attempts: attempt,
                        merged: outcome.merged,
                        dropped: outcome.dropped,
                        warnings: warnings.iter().map(|w| w.to_string()).collect(),
                    };
                    tracing::info!(
                        before = record.patterns_before,
                        after = record.patterns_after,
                        merged = record.merged.len(),
                        dropped = record.dropped.len(),
                        "Final consolidation applied"
                    );
                    state.apply_final_consolidation(outcome.library, record);
                    return Ok(());
                }
                Err(e) => e,
            };

            if !is_retryable(&error) {
                return Err(error);
            }

            let kind = error.kind_name();
            if attempt >= max_attempts {
                if self.aborts_on(&error) {
                    return Err(error);
                }
                tracing::warn!(
                    attempts = attempt,
                    error_kind = %kind,
                    error = %error,
                    "Final consolidation failed, keeping the library as is"
                );
                return Ok(());
            }

            let delay = backoff.delay(attempt);
            tracing::warn!(
                attempt,
                error_kind = %kind,
                delay_ms = delay.as_millis() as u64,
                "Final consolidation attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn final_attempt(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        library: &PatternLibrary,
        consolidator: &Consolidator,
        target: usize,
    ) -> ReformineResult<(FinalOutcome, Vec<PartialParseWarning>)> {
        let response = self.complete(prompt, options).await?;
        let parsed = parse_response(&response)?;
        let outcome = consolidator.finalize(library, &parsed.proposals, target)?;
        Ok((outcome, parsed.warnings))
    }

    /// Uma chamada ao LLM limitada pelo timeout da execução.
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> ReformineResult<String> {
        match tokio::time::timeout(options.timeout, self.client.complete(prompt, options)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ProviderError::timeout(format!(
                "{} gave no response within {} ms",
                self.client.name(),
                options.timeout.as_millis()
            ))
            .into()),
        }
    }

    fn aborts_on(&self, error: &ReformineError) -> bool {
        matches!(error, ReformineError::Parse(_)) && self.config.retry.abort_on_parse_failure
    }

    fn check_invariants(&self, state: &ExtractionState) -> ReformineResult<()> {
        if state.library.len() > self.config.max_patterns {
            return Err(ReformineError::InvariantViolation(format!(
                "library holds {} patterns, capacity is {}",
                state.library.len(),
                self.config.max_patterns
            )));
        }
        if !state.library.names_are_unique() {
            return Err(ReformineError::InvariantViolation(
                "library contains duplicate pattern names".to_string(),
            ));
        }
        Ok(())
    }

    async fn finish_cancelled(
        &mut self,
        state: ExtractionState,
        checkpoints: &CheckpointManager,
    ) -> ReformineResult<RunReport> {
        if let Err(e) = self.hooks.run_run_finished(RunStatus::Cancelled, &state).await {
            return Err(self.abort(&state, state.iteration_index, e).await);
        }
        let metrics = Metrics::from_state(&state);
        Ok(RunReport {
            status: RunStatus::Cancelled,
            state,
            metadata: checkpoints.metadata().clone(),
            output_dir: checkpoints.dir().to_path_buf(),
            artifacts: Vec::new(),
            metrics,
        })
    }

    /// Passa a ABORTED e embrulha `error` com o lote que falhou.
    async fn abort(
        &mut self,
        state: &ExtractionState,
        iteration: usize,
        error: ReformineError,
    ) -> ReformineError {
        self.transition(RunPhase::Aborted);
        let kind = error.kind_name();
        tracing::error!(iteration, error_kind = %kind, error = %error, "Run aborted");

        if let Err(hook_error) = self.hooks.run_run_finished(RunStatus::Aborted, state).await {
            tracing::warn!(error = %hook_error, "run_finished hook failed during abort");
        }

        ReformineError::Aborted {
            iteration,
            kind,
            message: error.to_string(),
        }
    }
}

impl BatchStep {
    fn with_attempts(mut self, attempts: u32) -> Self {
        self.record.attempts = attempts;
        self.record.retries = attempts.saturating_sub(1);
        self
    }
}

/// Falhas transitórias: erros de provedor recuperáveis e respostas inválidas.
fn is_retryable(error: &ReformineError) -> bool {
    match error {
        ReformineError::Provider(e) => e.is_retryable(),
        ReformineError::Parse(_) => true,
        _ => false,
    }
}

/// Lote com retries esgotados: a biblioteca fica e nenhum par é mapeado.
fn failed_step(
    batch: &Batch,
    state: &ExtractionState,
    attempts: u32,
    error_kind: String,
) -> BatchStep {
    BatchStep {
        library: state.library.clone(),
        mappings: batch
            .pairs
            .iter()
            .map(|p| MappingRecord::unmatched(p.id.clone()))
            .collect(),
        record: IterationRecord {
            iteration_index: batch.iteration_index,
            batch_outcome: BatchOutcome::Failed,
            library_size: state.library.len(),
            newly_added: Vec::new(),
            evicted: Vec::new(),
            attempts,
            retries: attempts.saturating_sub(1),
            pairs: batch.len(),
            discarded: Vec::new(),
            warnings: Vec::new(),
            error_kind: Some(error_kind),
        },
        discarded: Vec::new(),
    }
}
