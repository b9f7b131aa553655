//! Hooks da execução.
//!
//! Hooks observam a execução em pontos fixos do laço de extração:
//!
//! - `batch_completed`: depois que um lote é consolidado e salvo
//! - `retry_scheduled`: antes da espera por uma nova tentativa
//! - `proposal_discarded`: quando uma proposta não cabe na biblioteca
//! - `run_finished`: uma vez, quando o laço para por qualquer motivo
//!
//! Um hook de `batch_completed` pode devolver [`HookResult::Stop`] para encerrar
//! a execução antes do próximo lote.

mod builtin;

pub use builtin::{LoggingHook, Metrics, MetricsHook};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::extraction::{DiscardedProposal, ExtractionState, IterationRecord, RunStatus};
use crate::ReformineResult;

// ═══════════════════════════════════════════════════════════════════════════
// Tipos de eventos
// ═══════════════════════════════════════════════════════════════════════════

/// Ponto do laço que dispara um hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    BatchCompleted,
    RetryScheduled,
    ProposalDiscarded,
    RunFinished,
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookEvent::BatchCompleted => write!(f, "batch_completed"),
            HookEvent::RetryScheduled => write!(f, "retry_scheduled"),
            HookEvent::ProposalDiscarded => write!(f, "proposal_discarded"),
            HookEvent::RunFinished => write!(f, "run_finished"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Contexto de hooks
// ═══════════════════════════════════════════════════════════════════════════

/// Dados entregues a um hook.
pub enum HookContext<'a> {
    BatchCompleted {
        record: &'a IterationRecord,
        state: &'a ExtractionState,
        total_batches: usize,
    },

    RetryScheduled {
        iteration_index: usize,
        /// Tentativa que acabou de falhar (a partir de 1).
        attempt: u32,
        delay: Duration,
        error_kind: &'a str,
        message: &'a str,
    },

    ProposalDiscarded {
        iteration_index: usize,
        proposal: &'a DiscardedProposal,
    },

    RunFinished {
        status: RunStatus,
        state: &'a ExtractionState,
    },
}

impl<'a> HookContext<'a> {
    /// Evento correspondente ao contexto.
    pub fn event(&self) -> HookEvent {
        match self {
            HookContext::BatchCompleted { .. } => HookEvent::BatchCompleted,
            HookContext::RetryScheduled { .. } => HookEvent::RetryScheduled,
            HookContext::ProposalDiscarded { .. } => HookEvent::ProposalDiscarded,
            HookContext::RunFinished { .. } => HookEvent::RunFinished,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Resultado de hooks
// ═══════════════════════════════════════════════════════════════════════════

/// O que o hook pede ao laço.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HookResult {
    #[default]
    Continue,

    /// Para antes do próximo lote. Só vale para `batch_completed`.
    Stop,
}

// ═══════════════════════════════════════════════════════════════════════════
// Trait de hook
// ═══════════════════════════════════════════════════════════════════════════

#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    /// Eventos que o hook assina.
    fn events(&self) -> &[HookEvent];

    async fn execute(&self, context: &HookContext<'_>) -> ReformineResult<HookResult>;
}

// ═══════════════════════════════════════════════════════════════════════════
// Sistema de hooks
// ═══════════════════════════════════════════════════════════════════════════

/// Registro de hooks, disparados por evento na ordem de registro.
pub struct HookSystem {
    batch_completed: Vec<Arc<dyn Hook>>,
    retry_scheduled: Vec<Arc<dyn Hook>>,
    proposal_discarded: Vec<Arc<dyn Hook>>,
    run_finished: Vec<Arc<dyn Hook>>,
}

impl HookSystem {
    pub fn new() -> Self {
        Self {
            batch_completed: Vec::new(),
            retry_scheduled: Vec::new(),
            proposal_discarded: Vec::new(),
            run_finished: Vec::new(),
        }
    }

    /// Sistema com o hook de logging registrado.
    pub fn with_defaults() -> Self {
        let mut system = Self::new();
        system.register(Arc::new(LoggingHook::new()));
        system
    }

    /// Registra o hook em cada evento que ele assina.
    pub fn register(&mut self, hook: Arc<dyn Hook>) {
        for event in hook.events() {
            tracing::debug!(hook_name = hook.name(), event = %event, "Registering hook");

            match event {
                HookEvent::BatchCompleted => self.batch_completed.push(hook.clone()),
                HookEvent::RetryScheduled => self.retry_scheduled.push(hook.clone()),
                HookEvent::ProposalDiscarded => self.proposal_discarded.push(hook.clone()),
                HookEvent::RunFinished => self.run_finished.push(hook.clone()),
            }
        }
    }

    /// Executa os hooks de `batch_completed`; `Stop` vence se algum devolvê-lo.
    pub async fn run_batch_completed(
        &self,
        record: &IterationRecord,
        state: &ExtractionState,
        total_batches: usize,
    ) -> ReformineResult<HookResult> {
        let context = HookContext::BatchCompleted {
            record,
            state,
            total_batches,
        };

        let mut outcome = HookResult::Continue;
        for hook in &self.batch_completed {
            if hook.execute(&context).await? == HookResult::Stop {
                tracing::info!(hook_name = hook.name(), "Hook requested stop");
                outcome = HookResult::Stop;
            }
        }

        Ok(outcome)
    }

    pub async fn run_retry_scheduled(
        &self,
        iteration_index: usize,
        attempt: u32,
        delay: Duration,
        error_kind: &str,
        message: &str,
    ) -> ReformineResult<()> {
        let context = HookContext::RetryScheduled {
            iteration_index,
            attempt,
            delay,
            error_kind,
            message,
        };

        for hook in &self.retry_scheduled {
            hook.execute(&context).await?;
        }

        Ok(())
    }

    pub async fn run_proposal_discarded(
        &self,
        iteration_index: usize,
        proposal: &DiscardedProposal,
    ) -> ReformineResult<()> {
        let context = HookContext::ProposalDiscarded {
            iteration_index,
            proposal,
        };

        for hook in &self.proposal_discarded {
            hook.execute(&context).await?;
        }

        Ok(())
    }

    pub async fn run_run_finished(
        &self,
        status: RunStatus,
        state: &ExtractionState,
    ) -> ReformineResult<()> {
        let context = HookContext::RunFinished { status, state };

        for hook in &self.run_finished {
            hook.execute(&context).await?;
        }

        Ok(())
    }

    /// Total de registros somando todos os eventos.
    pub fn count(&self) -> usize {
        self.batch_completed.len()
            + self.retry_scheduled.len()
            + self.proposal_discarded.len()
            + self.run_finished.len()
    }

    pub fn count_for_event(&self, event: HookEvent) -> usize {
        match event {
            HookEvent::BatchCompleted => self.batch_completed.len(),
            HookEvent::RetryScheduled => self.retry_scheduled.len(),
            HookEvent::ProposalDiscarded => self.proposal_discarded.len(),
            HookEvent::RunFinished => self.run_finished.len(),
        }
    }
}

impl Default for HookSystem {
    fn default() -> Self {
        Self::new()
    }
}
