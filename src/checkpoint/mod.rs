//! Fotografias duráveis do estado da extração.
//!
//! Toda escrita vai para um arquivo temporário no diretório de destino e
//! depois é renomeada sobre o arquivo final; um leitor só vê arquivos completos.

mod artifacts;

pub use artifacts::{
    format_summary, write_final_artifacts, write_live_snapshots, ExperimentMetadata,
};

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::extraction::ExtractionState;
use crate::types::config::{ConsolidationPolicy, ProviderKind, RunConfig};
use crate::{ReformineError, ReformineResult};

/// Versão do formato gravada em todo checkpoint.
pub const CHECKPOINT_VERSION: &str = "1.0";

/// Tag do checkpoint regravado a cada lote.
pub const LIVE_TAG: &str = "LIVE";

/// Tag do checkpoint gravado quando a execução termina.
pub const FINAL_TAG: &str = "FINAL";

/// Dados da execução guardados junto ao estado.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMetadata {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub dataset_id: String,
    pub dataset_fingerprint: String,
    pub sampled_pairs: usize,
    pub total_batches: usize,
    pub provider: ProviderKind,
    pub model: String,
    pub policy: ConsolidationPolicy,
    pub config: RunConfig,
}

impl RunMetadata {
    /// Metadados de uma execução nova.
    pub fn new(
        config: &RunConfig,
        dataset_fingerprint: impl Into<String>,
        sampled_pairs: usize,
        total_batches: usize,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            dataset_id: config.dataset_id.clone(),
            dataset_fingerprint: dataset_fingerprint.into(),
            sampled_pairs,
            total_batches,
            provider: config.provider,
            model: config.model.clone(),
            policy: config.policy,
            config: config.clone(),
        }
    }

    /// Verifica se um checkpoint gravado sob `other` pode ser continuado por esta execução.
    pub fn ensure_resumable_from(&self, other: &RunMetadata) -> ReformineResult<()> {
        if self.dataset_fingerprint != other.dataset_fingerprint {
            return Err(ReformineError::config(format!(
                "checkpoint was taken on a different sample of '{}' (dataset, sample_size or seed changed)",
                other.dataset_id
            )));
        }
        if self.config.batch_size != other.config.batch_size {
            return Err(ReformineError::config(format!(
                "checkpoint used batch_size {}, this run uses {}",
                other.config.batch_size, self.config.batch_size
            )));
        }
        if self.policy != other.policy {
            return Err(ReformineError::config(format!(
                "checkpoint used the {} policy, this run uses {}",
                other.policy, self.policy
            )));
        }
        if self.config.max_patterns < other.config.max_patterns {
            return Err(ReformineError::config(format!(
                "checkpoint used max_patterns {}, this run cannot shrink it to {}",
                other.config.max_patterns, self.config.max_patterns
            )));
        }
        Ok(())
    }
}

/// Fotografia com tag e data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub version: String,
    pub tag: String,
    pub created_at: DateTime<Utc>,
    pub metadata: RunMetadata,
    pub state: ExtractionState,
}

// ═══════════════════════════════════════════════════════════════════════════
// CheckpointManager
// ═══════════════════════════════════════════════════════════════════════════

/// Salva e restaura os checkpoints de uma execução no seu diretório de saída.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
    metadata: RunMetadata,
}

impl CheckpointManager {
    /// Cria o gerenciador e, se preciso, o diretório `dir`.
    pub fn new(dir: impl Into<PathBuf>, metadata: RunMetadata) -> ReformineResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| ReformineError::checkpoint(&dir, e.to_string()))?;
        Ok(Self { dir, metadata })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    pub fn path_for(&self, tag: &str) -> PathBuf {
        checkpoint_path(&self.dir, tag)
    }

    pub fn exists(&self, tag: &str) -> bool {
        self.path_for(tag).exists()
    }

    /// Grava `state` sob `tag` de forma atômica, substituindo o checkpoint anterior.
    pub fn save(&self, state: &ExtractionState, tag: &str) -> ReformineResult<Checkpoint> {
        let checkpoint = Checkpoint {
            version: CHECKPOINT_VERSION.to_string(),
            tag: tag.to_string(),
            created_at: Utc::now(),
            metadata: self.metadata.clone(),
            state: state.clone(),
        };

        let path = self.path_for(tag);
        write_json_atomic(&path, &checkpoint)?;

        tracing::debug!(
            path = %path.display(),
            iteration = state.iteration_index,
            patterns = state.library.len(),
            "Checkpoint saved"
        );

        Ok(checkpoint)
    }

    /// Restaura o estado salvo sob `tag`.
    ///
    /// O checkpoint precisa vir de uma execução compatível. O run id e o
    /// horário de início dele são adotados, e a retomada segue o mesmo histórico.
    pub fn load(&mut self, tag: &str) -> ReformineResult<ExtractionState> {
        let checkpoint = read_checkpoint(&self.dir, tag)?;
        self.metadata.ensure_resumable_from(&checkpoint.metadata)?;

        if checkpoint.state.iteration_index > self.metadata.total_batches {
            return Err(ReformineError::checkpoint(
                self.path_for(tag),
                format!(
                    "checkpoint is at batch {} but the run only has {}",
                    checkpoint.state.iteration_index, self.metadata.total_batches
                ),
            ));
        }

        self.metadata.run_id = checkpoint.metadata.run_id;
        self.metadata.started_at = checkpoint.metadata.started_at;

        tracing::info!(
            tag,
            iteration = checkpoint.state.iteration_index,
            patterns = checkpoint.state.library.len(),
            "Resuming from checkpoint"
        );

        Ok(checkpoint.state)
    }
}

/// Caminho do checkpoint com tag `tag` em `dir`.
pub fn checkpoint_path(dir: &Path, tag: &str) -> PathBuf {
    dir.join(format!("checkpoint_{}.json", tag))
}

/// Lê um checkpoint sem compará-lo a uma execução.
pub fn read_checkpoint(dir: &Path, tag: &str) -> ReformineResult<Checkpoint> {
    let path = checkpoint_path(dir, tag);
    let content = std::fs::read_to_string(&path)
        .map_err(|e| ReformineError::checkpoint(&path, e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| ReformineError::checkpoint(&path, e.to_string()))
}

/// Grava `bytes` em `path` via arquivo temporário no mesmo diretório.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> ReformineResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let fail = |e: std::io::Error| ReformineError::checkpoint(path, e.to_string());

    let mut file = NamedTempFile::new_in(dir).map_err(fail)?;
    file.write_all(bytes).map_err(fail)?;
    file.as_file().sync_all().map_err(fail)?;
    file.persist(path).map_err(|e| fail(e.error))?;
    Ok(())
}

/// Serializa `value` como JSON formatado e grava de forma atômica.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> ReformineResult<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::pattern::{Pattern, PatternLibrary};
    use tempfile::tempdir;

    fn create_test_metadata(fingerprint: &str) -> RunMetadata {
        let config = RunConfig::new("pairs", "pairs.tsv", "out").with_batch_size(5);
        RunMetadata::new(&config, fingerprint, 20, 4)
    }

    fn create_test_state() -> ExtractionState {
        let mut state = ExtractionState::new();
        state.library = PatternLibrary::from_patterns(vec![Pattern::new("A", "d", "r")]);
        state.iteration_index = 2;
        state.pairs_processed_count = 10;
        state
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path(), create_test_metadata("abc")).unwrap();
        let state = create_test_state();

        let checkpoint = manager.save(&state, LIVE_TAG).unwrap();
        assert_eq!(checkpoint.tag, "LIVE");
        assert!(dir.path().join("checkpoint_LIVE.json").exists());

        let mut resumed = CheckpointManager::new(dir.path(), create_test_metadata("abc")).unwrap();
        let loaded = resumed.load(LIVE_TAG).unwrap();

        assert_eq!(loaded, state);
        assert_eq!(resumed.metadata().run_id, manager.metadata().run_id);
    }

    #[test]
    fn test_load_rejects_other_sample() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path(), create_test_metadata("abc")).unwrap();
        manager.save(&create_test_state(), LIVE_TAG).unwrap();

        let mut other = CheckpointManager::new(dir.path(), create_test_metadata("xyz")).unwrap();

        assert!(matches!(other.load(LIVE_TAG), Err(ReformineError::Config(_))));
    }

    #[test]
    fn test_load_missing_is_checkpoint_error() {
        let dir = tempdir().unwrap();
        let mut manager = CheckpointManager::new(dir.path(), create_test_metadata("abc")).unwrap();

        let err = manager.load("nope").unwrap_err();
        assert_eq!(err.kind_name(), "CHECKPOINT_IO");
    }

    #[test]
    fn test_save_replaces_previous() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path(), create_test_metadata("abc")).unwrap();
        let mut state = create_test_state();

        manager.save(&state, LIVE_TAG).unwrap();
        state.iteration_index = 3;
        manager.save(&state, LIVE_TAG).unwrap();

        let checkpoint = read_checkpoint(dir.path(), LIVE_TAG).unwrap();
        assert_eq!(checkpoint.state.iteration_index, 3);

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_write_atomic_into_missing_dir_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("file.json");

        let err = write_atomic(&path, b"{}").unwrap_err();
        assert!(matches!(err, ReformineError::Checkpoint { .. }));
    }
}
