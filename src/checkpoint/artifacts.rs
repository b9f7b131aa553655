//! Artefatos da execução: fotografias LIVE de progresso e os arquivos FINAL.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{write_atomic, write_json_atomic, Checkpoint, RunMetadata};
use crate::extraction::{BatchOutcome, ExtractionState, FinalConsolidation};
use crate::hooks::Metrics;
use crate::ReformineResult;

/// Registro de reprodutibilidade gravado junto aos resultados FINAL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentMetadata {
    #[serde(flatten)]
    pub run: RunMetadata,
    pub finished_at: DateTime<Utc>,
    pub batches_processed: usize,
    pub failed_batches: usize,
    pub pairs_processed: usize,
    pub matched_pairs: usize,
    pub final_library_size: usize,
    pub total_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_consolidation: Option<FinalConsolidation>,
}

/// Grava as fotografias de progresso atualizadas a cada lote.
pub fn write_live_snapshots(dir: &Path, state: &ExtractionState) -> ReformineResult<()> {
    write_json_atomic(&dir.join("extracted_patterns_LIVE.json"), &state.library)?;
    write_json_atomic(
        &dir.join("individual_patterns_LIVE.json"),
        &state.individual_mappings,
    )?;
    write_json_atomic(
        &dir.join(format!(
            "extracted_patterns_{}_queries.json",
            state.pairs_processed_count
        )),
        &state.library,
    )?;
    Ok(())
}

/// Grava todos os artefatos FINAL e devolve seus caminhos.
pub fn write_final_artifacts(
    dir: &Path,
    checkpoint: &Checkpoint,
    metrics: Option<&Metrics>,
) -> ReformineResult<Vec<PathBuf>> {
    let state = &checkpoint.state;
    let mut written = Vec::new();

    let path = dir.join("extracted_patterns_FINAL.json");
    write_json_atomic(&path, &state.library)?;
    written.push(path);

    let path = dir.join("individual_patterns_FINAL.json");
    write_json_atomic(&path, &state.individual_mappings)?;
    written.push(path);

    let path = dir.join("individual_patterns_FINAL.csv");
    write_atomic(&path, &mappings_csv(state)?)?;
    written.push(path);

    let path = dir.join("extraction_results_FINAL.json");
    write_json_atomic(&path, &state.iterations)?;
    written.push(path);

    let metadata = ExperimentMetadata {
        run: checkpoint.metadata.clone(),
        finished_at: checkpoint.created_at,
        batches_processed: state.iteration_index,
        failed_batches: state.failed_batches(),
        pairs_processed: state.pairs_processed_count,
        matched_pairs: state.matched_pairs(),
        final_library_size: state.library.len(),
        total_retries: state.total_retries(),
        metrics: metrics.cloned(),
        final_consolidation: state.final_consolidation.clone(),
    };
    let path = dir.join("experiment_metadata_FINAL.json");
    write_json_atomic(&path, &metadata)?;
    written.push(path);

    let path = dir.join("run_summary_FINAL.md");
    write_atomic(&path, format_summary(checkpoint).as_bytes())?;
    written.push(path);

    tracing::info!(
        dir = %dir.display(),
        files = written.len(),
        patterns = state.library.len(),
        "FINAL artifacts written"
    );

    Ok(written)
}

fn mappings_csv(state: &ExtractionState) -> ReformineResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["query_id", "matched_pattern"])?;
    for mapping in &state.individual_mappings {
        writer.write_record([
            mapping.query_id.as_str(),
            mapping.matched_pattern.as_deref().unwrap_or(""),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| crate::ReformineError::other(format!("failed to flush CSV: {}", e)))
}

/// Monta o resumo legível da execução.
///
/// Os totais vêm do histórico do estado, então uma execução retomada conta
/// também os lotes dos processos anteriores.
pub fn format_summary(checkpoint: &Checkpoint) -> String {
    let meta = &checkpoint.metadata;
    let state = &checkpoint.state;
    let mut output = String::new();

    output.push_str("# Pattern Extraction Summary\n\n");

    output.push_str(&format!("**Run:** {}\n", meta.run_id));
    output.push_str(&format!("**Dataset:** {}\n", meta.dataset_id));
    output.push_str(&format!(
        "**Provider:** {} ({})\n",
        meta.provider, meta.model
    ));
    output.push_str(&format!("**Policy:** {}\n", meta.policy));
    output.push_str(&format!(
        "**Batches:** {}/{} ({} failed)\n",
        state.iteration_index,
        meta.total_batches,
        state.failed_batches()
    ));
    output.push_str(&format!(
        "**Pairs:** {} processed, {} mapped to a pattern\n",
        state.pairs_processed_count,
        state.matched_pairs()
    ));
    output.push_str(&format!(
        "**Library:** {}/{} patterns\n",
        state.library.len(),
        meta.config.max_patterns
    ));
    output.push_str(&format!("**Retries:** {}\n", state.total_retries()));
    output.push_str(&format!(
        "**Discarded proposals:** {}\n",
        state.total_discarded()
    ));
    output.push('\n');

    if let Some(fc) = &state.final_consolidation {
        output.push_str("## Final Consolidation\n\n");
        output.push_str(&format!(
            "{} patterns merged into {} (target {}) after {} attempt(s)\n",
            fc.patterns_before, fc.patterns_after, fc.target, fc.attempts
        ));
        for merged in &fc.merged {
            output.push_str(&format!("- {} -> {}\n", merged.source, merged.into));
        }
        for dropped in &fc.dropped {
            output.push_str(&format!("- {} dropped\n", dropped));
        }
        output.push('\n');
    }

    if !state.library.is_empty() {
        output.push_str("## Patterns\n\n");
        for (i, pattern) in state.library.iter().enumerate() {
            output.push_str(&format!(
                "{}. **{}** (coverage: {}, examples: {})\n",
                i + 1,
                pattern.pattern_name,
                pattern.coverage_count,
                pattern.examples.len()
            ));
            output.push_str(&format!("   - {}\n", pattern.description));
            output.push_str(&format!("   - Rule: {}\n", pattern.transformation_rule));
        }
        output.push('\n');
    }

    let failed: Vec<_> = state
        .iterations
        .iter()
        .filter(|r| r.batch_outcome == BatchOutcome::Failed)
        .collect();
    if !failed.is_empty() {
        output.push_str("## Failed Batches\n\n");
        for record in failed {
            output.push_str(&format!(
                "- Batch {}: {} after {} attempt(s)\n",
                record.iteration_index,
                record.error_kind.as_deref().unwrap_or("UNKNOWN"),
                record.attempts
            ));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{CheckpointManager, FINAL_TAG};
    use crate::extraction::{IterationRecord, MappingRecord};
    use crate::types::config::RunConfig;
    use crate::types::pattern::{Pattern, PatternLibrary};
    use tempfile::tempdir;

    fn create_test_state() -> ExtractionState {
        let mut state = ExtractionState::new();
        let library = PatternLibrary::from_patterns(vec![Pattern::new(
            "Synonym Substitution",
            "swaps terms for clearer ones",
            "replace with synonym",
        )
        .with_examples(vec![("cheap flights".into(), "low cost airfare".into())])
        .with_coverage(1)]);
        let record = IterationRecord {
            iteration_index: 0,
            batch_outcome: BatchOutcome::Failed,
            library_size: 1,
            newly_added: vec![],
            evicted: vec![],
            attempts: 4,
            retries: 3,
            pairs: 2,
            discarded: vec![],
            warnings: vec![],
            error_kind: Some("PROVIDER_RATE_LIMIT".to_string()),
        };
        state.commit(
            library,
            vec![
                MappingRecord::new("q1", Some("Synonym Substitution".to_string())),
                MappingRecord::unmatched("q2"),
            ],
            record,
        );
        state
    }

    fn create_test_checkpoint(dir: &Path) -> Checkpoint {
        let config = RunConfig::new("pairs", "pairs.tsv", dir);
        let metadata = RunMetadata::new(&config, "fp", 2, 1);
        let manager = CheckpointManager::new(dir, metadata).unwrap();
        manager.save(&create_test_state(), FINAL_TAG).unwrap()
    }

    #[test]
    fn test_final_artifacts_written() {
        let dir = tempdir().unwrap();
        let checkpoint = create_test_checkpoint(dir.path());

        let written = write_final_artifacts(dir.path(), &checkpoint, None).unwrap();

        assert_eq!(written.len(), 6);
        for path in &written {
            assert!(path.exists(), "{} missing", path.display());
        }

        let csv =
            std::fs::read_to_string(dir.path().join("individual_patterns_FINAL.csv")).unwrap();
        assert_eq!(
            csv,
            "query_id,matched_pattern\nq1,Synonym Substitution\nq2,\n"
        );

        let meta: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("experiment_metadata_FINAL.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(meta["dataset_id"], "pairs");
        assert_eq!(meta["failed_batches"], 1);
    }

    #[test]
    fn test_live_snapshots() {
        let dir = tempdir().unwrap();
        write_live_snapshots(dir.path(), &create_test_state()).unwrap();

        assert!(dir.path().join("extracted_patterns_LIVE.json").exists());
        assert!(dir.path().join("individual_patterns_LIVE.json").exists());
        assert!(dir.path().join("extracted_patterns_2_queries.json").exists());
    }

    #[test]
    fn test_summary_mentions_failures() {
        let dir = tempdir().unwrap();
        let summary = format_summary(&create_test_checkpoint(dir.path()));

        assert!(summary.contains("# Pattern Extraction Summary"));
        assert!(summary.contains("Synonym Substitution"));
        assert!(summary.contains("Batch 0: PROVIDER_RATE_LIMIT after 4 attempt(s)"));
    }

    #[test]
    fn test_summary_counts_discards_from_history() {
        let dir = tempdir().unwrap();
        let mut checkpoint = create_test_checkpoint(dir.path());
        checkpoint.state.iterations[0].discarded = vec!["X".to_string(), "Y".to_string()];
        checkpoint.state.final_consolidation = Some(FinalConsolidation {
            target: 1,
            patterns_before: 2,
            patterns_after: 1,
            attempts: 1,
            merged: vec![crate::extraction::MergedPattern {
                source: "Old".to_string(),
                into: "Synonym Substitution".to_string(),
            }],
            dropped: vec![],
            warnings: vec![],
        });

        let summary = format_summary(&checkpoint);

        assert!(summary.contains("**Discarded proposals:** 2"));
        assert!(summary.contains("## Final Consolidation"));
        assert!(summary.contains("- Old -> Synonym Substitution"));
    }
}
