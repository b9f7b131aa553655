//! Divisão da sequência amostrada em lotes de tamanho fixo.

use crate::extraction::ExtractionState;
use crate::types::pattern::QueryPair;
use crate::{ReformineError, ReformineResult};

/// Fatia contígua da sequência amostrada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub iteration_index: usize,
    pub pairs: Vec<QueryPair>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|p| p.id.as_str())
    }
}

/// Particiona os pares amostrados em lotes de `batch_size`.
///
/// Os limites dependem só da sequência e de `batch_size`; uma retomada vê os
/// mesmos lotes da execução que gravou o checkpoint.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    pairs: Vec<QueryPair>,
    batch_size: usize,
}

impl BatchScheduler {
    pub fn new(pairs: Vec<QueryPair>, batch_size: usize) -> ReformineResult<Self> {
        if batch_size == 0 {
            return Err(ReformineError::config("batch_size must be greater than 0"));
        }
        Ok(Self { pairs, batch_size })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn total_pairs(&self) -> usize {
        self.pairs.len()
    }

    pub fn total_batches(&self) -> usize {
        self.pairs.len().div_ceil(self.batch_size)
    }

    /// O lote em `iteration_index`, ou `None` depois do fim.
    pub fn batch_at(&self, iteration_index: usize) -> Option<Batch> {
        let start = iteration_index.checked_mul(self.batch_size)?;
        if start >= self.pairs.len() {
            return None;
        }
        let end = (start + self.batch_size).min(self.pairs.len());

        Some(Batch {
            iteration_index,
            pairs: self.pairs[start..end].to_vec(),
        })
    }

    /// Próximo lote ainda não processado em `state`.
    pub fn next(&self, state: &ExtractionState) -> Option<Batch> {
        self.batch_at(state.iteration_index)
    }

    /// Todos os lotes, em ordem.
    pub fn batches(&self) -> impl Iterator<Item = Batch> + '_ {
        (0..self.total_batches()).filter_map(|i| self.batch_at(i))
    }
}
