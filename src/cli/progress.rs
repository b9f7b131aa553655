//! Barra de progresso alimentada pelos hooks da execução.

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};

use crate::extraction::RunStatus;
use crate::hooks::{Hook, HookContext, HookEvent, HookResult};
use crate::ReformineResult;

/// Mostra o progresso dos lotes no stderr.
pub struct ProgressHook {
    bar: ProgressBar,
}

impl ProgressHook {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} batches {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar }
    }
}

impl Default for ProgressHook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Hook for ProgressHook {
    fn name(&self) -> &str {
        "progress"
    }

    fn events(&self) -> &[HookEvent] {
        &[
            HookEvent::BatchCompleted,
            HookEvent::RetryScheduled,
            HookEvent::RunFinished,
        ]
    }

    async fn execute(&self, context: &HookContext<'_>) -> ReformineResult<HookResult> {
        match context {
            HookContext::BatchCompleted {
                state,
                total_batches,
                ..
            } => {
                self.bar.set_length(*total_batches as u64);
                self.bar.set_position(state.iteration_index as u64);
                self.bar
                    .set_message(format!("{} patterns", state.library.len()));
            }
            HookContext::RetryScheduled {
                iteration_index,
                error_kind,
                ..
            } => {
                self.bar
                    .set_message(format!("retrying batch {} ({})", iteration_index, error_kind));
            }
            HookContext::RunFinished { status, .. } => match status {
                RunStatus::Done => self.bar.finish_with_message("done"),
                _ => self.bar.abandon_with_message(status.to_string()),
            },
            HookContext::ProposalDiscarded { .. } => {}
        }

        Ok(HookResult::Continue)
    }
}
