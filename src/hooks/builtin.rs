//! Hooks embutidos.
//!
//! - `LoggingHook`: registra o resultado de cada lote e o fim da execução
//! - `MetricsHook`: contadores de lotes, retries e descartes

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::extraction::{BatchOutcome, ExtractionState};
use crate::ReformineResult;

use super::{Hook, HookContext, HookEvent, HookResult};

// ═══════════════════════════════════════════════════════════════════════════
// LoggingHook
// ═══════════════════════════════════════════════════════════════════════════

/// Registra cada lote concluído e o status final via `tracing`.
#[derive(Debug, Default)]
pub struct LoggingHook;

impl LoggingHook {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Hook for LoggingHook {
    fn name(&self) -> &str {
        "logging"
    }

    fn events(&self) -> &[HookEvent] {
        &[HookEvent::BatchCompleted, HookEvent::RunFinished]
    }

    async fn execute(&self, context: &HookContext<'_>) -> ReformineResult<HookResult> {
        match context {
            HookContext::BatchCompleted {
                record,
                total_batches,
                ..
            } => {
                tracing::info!(
                    iteration = record.iteration_index,
                    total_batches = *total_batches,
                    outcome = %record.batch_outcome,
                    library_size = record.library_size,
                    added = record.newly_added.len(),
                    evicted = record.evicted.len(),
                    retries = record.retries,
                    "Batch completed"
                );

                if record.batch_outcome == BatchOutcome::Failed {
                    tracing::warn!(
                        iteration = record.iteration_index,
                        error_kind = record.error_kind.as_deref().unwrap_or("UNKNOWN"),
                        "Batch failed, its pairs are left unmapped"
                    );
                }
            }
            HookContext::RunFinished { status, state } => {
                tracing::info!(
                    status = %status,
                    batches = state.iteration_index,
                    pairs = state.pairs_processed_count,
                    patterns = state.library.len(),
                    "Run finished"
                );
            }
            _ => {}
        }

        Ok(HookResult::Continue)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// MetricsHook
// ═══════════════════════════════════════════════════════════════════════════

/// Contadores da execução para o resumo.
///
/// Numa retomada, [`MetricsHook::restore`] recarrega o histórico do checkpoint.
#[derive(Debug, Default)]
pub struct MetricsHook {
    batches: AtomicU64,
    failed_batches: AtomicU64,
    retries: AtomicU64,
    discarded: AtomicU64,
    patterns_added: AtomicU64,
    patterns_evicted: AtomicU64,
}

impl MetricsHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Substitui os contadores pelos totais registrados em `state`.
    pub fn restore(&self, state: &ExtractionState) {
        let metrics = Metrics::from_state(state);
        self.batches.store(metrics.batches, Ordering::Relaxed);
        self.failed_batches
            .store(metrics.failed_batches, Ordering::Relaxed);
        self.retries.store(metrics.retries, Ordering::Relaxed);
        self.discarded.store(metrics.discarded, Ordering::Relaxed);
        self.patterns_added
            .store(metrics.patterns_added, Ordering::Relaxed);
        self.patterns_evicted
            .store(metrics.patterns_evicted, Ordering::Relaxed);
    }

    pub fn total_batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn failed_batches(&self) -> u64 {
        self.failed_batches.load(Ordering::Relaxed)
    }

    pub fn total_retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn total_discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Fração de lotes bem-sucedidos.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_batches();
        if total == 0 {
            0.0
        } else {
            (total - self.failed_batches()) as f64 / total as f64
        }
    }

    pub fn metrics(&self) -> Metrics {
        Metrics {
            batches: self.total_batches(),
            failed_batches: self.failed_batches(),
            retries: self.total_retries(),
            discarded: self.total_discarded(),
            patterns_added: self.patterns_added.load(Ordering::Relaxed),
            patterns_evicted: self.patterns_evicted.load(Ordering::Relaxed),
            success_rate: self.success_rate(),
        }
    }
}

/// Fotografia dos contadores de [`MetricsHook`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub batches: u64,
    pub failed_batches: u64,
    pub retries: u64,
    pub discarded: u64,
    pub patterns_added: u64,
    pub patterns_evicted: u64,
    pub success_rate: f64,
}

impl Metrics {
    /// Totais de todo o histórico de `state`, incluindo lotes de processos anteriores.
    pub fn from_state(state: &ExtractionState) -> Self {
        let batches = state.iterations.len() as u64;
        let failed_batches = state.failed_batches() as u64;
        let patterns_added: usize = state.iterations.iter().map(|r| r.newly_added.len()).sum();
        let patterns_evicted: usize = state.iterations.iter().map(|r| r.evicted.len()).sum();

        Self {
            batches,
            failed_batches,
            retries: u64::from(state.total_retries()),
            discarded: state.total_discarded() as u64,
            patterns_added: patterns_added as u64,
            patterns_evicted: patterns_evicted as u64,
            success_rate: if batches == 0 {
                0.0
            } else {
                (batches - failed_batches) as f64 / batches as f64
            },
        }
    }
}

#[async_trait]
impl Hook for MetricsHook {
    fn name(&self) -> &str {
        "metrics"
    }

    fn events(&self) -> &[HookEvent] {
        &[
            HookEvent::BatchCompleted,
            HookEvent::RetryScheduled,
            HookEvent::ProposalDiscarded,
        ]
    }

    async fn execute(&self, context: &HookContext<'_>) -> ReformineResult<HookResult> {
        match context {
            HookContext::BatchCompleted { record, .. } => {
                self.batches.fetch_add(1, Ordering::Relaxed);
                if record.batch_outcome == BatchOutcome::Failed {
                    self.failed_batches.fetch_add(1, Ordering::Relaxed);
                }
                self.patterns_added
                    .fetch_add(record.newly_added.len() as u64, Ordering::Relaxed);
                self.patterns_evicted
                    .fetch_add(record.evicted.len() as u64, Ordering::Relaxed);
            }
            HookContext::RetryScheduled { .. } => {
                self.retries.fetch_add(1, Ordering::Relaxed);
            }
            HookContext::ProposalDiscarded { .. } => {
                self.discarded.fetch_add(1, Ordering::Relaxed);
            }
            HookContext::RunFinished { .. } => {}
        }

        Ok(HookResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{DiscardedProposal, ExtractionState, IterationRecord, RunStatus};
    use std::time::Duration;

    fn create_test_record(outcome: BatchOutcome) -> IterationRecord {
        IterationRecord {
            iteration_index: 0,
            batch_outcome: outcome,
            library_size: 2,
            newly_added: vec!["A".to_string(), "B".to_string()],
            evicted: vec!["C".to_string()],
            attempts: 1,
            retries: 0,
            pairs: 5,
            discarded: vec![],
            warnings: vec![],
            error_kind: None,
        }
    }

    #[test]
    fn test_logging_hook_subscriptions() {
        let hook = LoggingHook::new();
        assert_eq!(hook.name(), "logging");
        assert!(hook.events().contains(&HookEvent::RunFinished));
    }

    #[tokio::test]
    async fn test_logging_hook_execute() {
        let hook = LoggingHook::new();
        let state = ExtractionState::new();

        let result = hook
            .execute(&HookContext::RunFinished {
                status: RunStatus::Done,
                state: &state,
            })
            .await
            .unwrap();

        assert_eq!(result, HookResult::Continue);
    }

    #[tokio::test]
    async fn test_metrics_hook_counts() {
        let hook = MetricsHook::new();
        let state = ExtractionState::new();
        let ok = create_test_record(BatchOutcome::Succeeded);
        let failed = create_test_record(BatchOutcome::Failed);
        let discarded = DiscardedProposal {
            pattern_name: "D".to_string(),
            implied_coverage: 1,
            blocking_pattern: "A".to_string(),
            blocking_coverage: 5,
        };

        for record in [&ok, &ok, &ok, &failed] {
            hook.execute(&HookContext::BatchCompleted {
                record,
                state: &state,
                total_batches: 4,
            })
            .await
            .unwrap();
        }
        hook.execute(&HookContext::RetryScheduled {
            iteration_index: 1,
            attempt: 1,
            delay: Duration::from_millis(1),
            error_kind: "PROVIDER_TIMEOUT",
            message: "timed out",
        })
        .await
        .unwrap();
        hook.execute(&HookContext::ProposalDiscarded {
            iteration_index: 2,
            proposal: &discarded,
        })
        .await
        .unwrap();

        let metrics = hook.metrics();
        assert_eq!(metrics.batches, 4);
        assert_eq!(metrics.failed_batches, 1);
        assert_eq!(metrics.retries, 1);
        assert_eq!(metrics.discarded, 1);
        assert_eq!(metrics.patterns_added, 8);
        assert_eq!(metrics.patterns_evicted, 4);
        assert!((metrics.success_rate - 0.75).abs() < 0.01);
    }

    #[test]
    fn test_restore_matches_state_history() {
        let mut state = ExtractionState::new();
        let mut failed = create_test_record(BatchOutcome::Failed);
        failed.retries = 2;
        failed.discarded = vec!["X".to_string(), "Y".to_string()];
        state.commit(Default::default(), vec![], create_test_record(BatchOutcome::Succeeded));
        state.commit(Default::default(), vec![], failed);

        let hook = MetricsHook::new();
        hook.restore(&state);
        let metrics = hook.metrics();

        assert_eq!(metrics, Metrics::from_state(&state));
        assert_eq!(metrics.batches, 2);
        assert_eq!(metrics.failed_batches, 1);
        assert_eq!(metrics.retries, 2);
        assert_eq!(metrics.discarded, 2);
        assert_eq!(metrics.patterns_added, 4);
        assert!((metrics.success_rate - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_metrics_hook_empty() {
        let hook = MetricsHook::new();
        assert_eq!(hook.total_batches(), 0);
        assert_eq!(hook.success_rate(), 0.0);
    }
}
