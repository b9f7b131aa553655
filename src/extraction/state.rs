//! Estado da extração e o log por iteração.

use serde::{Deserialize, Serialize};

use crate::types::pattern::{name_key, PatternLibrary};

/// Mapeamento de um par para o padrão que o explica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub query_id: String,
    pub matched_pattern: Option<String>,
}

impl MappingRecord {
    pub fn new(query_id: impl Into<String>, matched_pattern: Option<String>) -> Self {
        Self {
            query_id: query_id.into(),
            matched_pattern,
        }
    }

    pub fn unmatched(query_id: impl Into<String>) -> Self {
        Self::new(query_id, None)
    }
}

/// Como um lote terminou.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchOutcome {
    Succeeded,
    Failed,
}

impl std::fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchOutcome::Succeeded => write!(f, "SUCCEEDED"),
            BatchOutcome::Failed => write!(f, "FAILED"),
        }
    }
}

/// O que aconteceu numa iteração.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration_index: usize,
    pub batch_outcome: BatchOutcome,
    pub library_size: usize,
    pub newly_added: Vec<String>,
    pub evicted: Vec<String>,

    /// Chamadas ao LLM feitas para o lote, contando a primeira.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub pairs: usize,

    /// Nomes das propostas que não couberam na biblioteca.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discarded: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

/// Padrão da biblioteca absorvido por outro na consolidação final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedPattern {
    pub source: String,
    pub into: String,
}

/// Resultado da consolidação final aplicada ao fim da execução.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalConsolidation {
    pub target: usize,
    pub patterns_before: usize,
    pub patterns_after: usize,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged: Vec<MergedPattern>,

    /// Padrões que não entraram em nenhum padrão final.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Progresso completo de uma execução.
///
/// Só o orquestrador o possui e o avança, via [`ExtractionState::commit`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionState {
    pub library: PatternLibrary,

    /// Índice do próximo lote a processar.
    pub iteration_index: usize,
    pub pairs_processed_count: usize,
    pub individual_mappings: Vec<MappingRecord>,
    #[serde(default)]
    pub iterations: Vec<IterationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_consolidation: Option<FinalConsolidation>,
}

impl ExtractionState {
    /// Estado vazio para uma execução nova.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra um lote concluído e avança para o próximo.
    pub fn commit(
        &mut self,
        library: PatternLibrary,
        mappings: Vec<MappingRecord>,
        record: IterationRecord,
    ) {
        self.library = library;
        self.pairs_processed_count += mappings.len();
        self.individual_mappings.extend(mappings);
        self.iterations.push(record);
        self.iteration_index += 1;
    }

    pub fn failed_batches(&self) -> usize {
        self.iterations
            .iter()
            .filter(|r| r.batch_outcome == BatchOutcome::Failed)
            .count()
    }

    pub fn total_retries(&self) -> u32 {
        self.iterations.iter().map(|r| r.retries).sum()
    }

    pub fn total_discarded(&self) -> usize {
        self.iterations.iter().map(|r| r.discarded.len()).sum()
    }

    /// Troca a biblioteca pela consolidação final e remapeia os pares.
    ///
    /// Um par mapeado para um padrão fundido passa ao padrão que o absorveu;
    /// um par mapeado para um padrão descartado fica sem padrão.
    pub fn apply_final_consolidation(
        &mut self,
        library: PatternLibrary,
        record: FinalConsolidation,
    ) {
        for mapping in &mut self.individual_mappings {
            mapping.matched_pattern = mapping.matched_pattern.take().and_then(|name| {
                if let Some(pattern) = library.get(&name) {
                    return Some(pattern.pattern_name.clone());
                }
                record
                    .merged
                    .iter()
                    .find(|m| name_key(&m.source) == name_key(&name))
                    .map(|m| m.into.clone())
            });
        }
        self.library = library;
        self.final_consolidation = Some(record);
    }

    pub fn matched_pairs(&self) -> usize {
        self.individual_mappings
            .iter()
            .filter(|m| m.matched_pattern.is_some())
            .count()
    }
}
