//! Incorporação das propostas na biblioteca limitada de padrões.
//!
//! [`Consolidator::consolidate`] é uma transição pura: lê a biblioteca atual
//! e devolve a próxima. Nas duas políticas o resultado tem no máximo
//! `max_patterns` padrões e nenhum padrão sobrevivente perde exemplos ou
//! cobertura.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::parser::{AppliedPatterns, ProposedPattern};
use super::state::{MappingRecord, MergedPattern};
use crate::types::config::ConsolidationPolicy;
use crate::types::errors::ParseError;
use crate::types::pattern::{name_key, Example, Pattern, PatternLibrary, QueryPair};

/// Proposta que só entraria removendo um padrão mais forte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardedProposal {
    pub pattern_name: String,
    pub implied_coverage: usize,
    pub blocking_pattern: String,
    pub blocking_coverage: usize,
}

impl std::fmt::Display for DiscardedProposal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}' (coverage {}) blocked by '{}' (coverage {})",
            self.pattern_name, self.implied_coverage, self.blocking_pattern, self.blocking_coverage
        )
    }
}

/// Resultado de um passo de consolidação.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationOutcome {
    pub library: PatternLibrary,
    pub newly_added: Vec<String>,
    pub evicted: Vec<String>,
    pub refined: Vec<String>,
    pub discarded: Vec<DiscardedProposal>,
}

/// Resultado da consolidação final.
#[derive(Debug, Clone, Default)]
pub struct FinalOutcome {
    pub library: PatternLibrary,
    pub merged: Vec<MergedPattern>,
    pub dropped: Vec<String>,
}

impl ConsolidationOutcome {
    /// Registra a entrada de `name`; um padrão que já estava em `prior` volta como refinado.
    fn record_insert(&mut self, prior: &PatternLibrary, name: &str) {
        if prior.position(name).is_some() {
            self.evicted.retain(|n| name_key(n) != name_key(name));
            self.refined.push(name.to_string());
        } else {
            self.newly_added.push(name.to_string());
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Consolidator
// ═══════════════════════════════════════════════════════════════════════════

/// Aplica uma política de consolidação sob capacidade fixa.
#[derive(Debug, Clone, Copy)]
pub struct Consolidator {
    policy: ConsolidationPolicy,
    max_patterns: usize,
}

impl Consolidator {
    pub fn new(policy: ConsolidationPolicy, max_patterns: usize) -> Self {
        Self {
            policy,
            max_patterns,
        }
    }

    pub fn policy(&self) -> ConsolidationPolicy {
        self.policy
    }

    pub fn max_patterns(&self) -> usize {
        self.max_patterns
    }

    /// Calcula a biblioteca que sucede `library` depois de `proposals`.
    ///
    /// `batch` é a evidência de onde as propostas vieram e decide quais pares
    /// contam como contribuidores. Só a política consolidada pode falhar,
    /// quando a biblioteca substituta passa da capacidade.
    pub fn consolidate(
        &self,
        library: &PatternLibrary,
        proposals: &[ProposedPattern],
        batch: &[QueryPair],
    ) -> Result<ConsolidationOutcome, ParseError> {
        if proposals.is_empty() {
            return Ok(ConsolidationOutcome {
                library: library.clone(),
                ..Default::default()
            });
        }

        match self.policy {
            ConsolidationPolicy::Consolidated => self.replace(library, proposals, batch),
            ConsolidationPolicy::NPattern => Ok(self.merge(library, proposals, batch)),
        }
    }

    /// Política consolidada: as propostas são a próxima biblioteca inteira.
    fn replace(
        &self,
        library: &PatternLibrary,
        proposals: &[ProposedPattern],
        batch: &[QueryPair],
    ) -> Result<ConsolidationOutcome, ParseError> {
        let proposals = merge_duplicate_names(proposals);
        if proposals.len() > self.max_patterns {
            return Err(ParseError::CapacityExceeded {
                size: proposals.len(),
                max: self.max_patterns,
            });
        }

        let mut outcome = ConsolidationOutcome::default();
        let mut next = PatternLibrary::new();

        for proposal in &proposals {
            let pattern = match library.get(&proposal.pattern_name) {
                Some(prior) => {
                    let mut pattern = prior.clone();
                    absorb_proposal(&mut pattern, proposal, batch);
                    outcome.refined.push(pattern.pattern_name.clone());
                    pattern
                }
                None => {
                    let mut pattern = new_pattern(proposal, batch);
                    pattern.coverage_count = pattern.examples.len();
                    outcome.newly_added.push(pattern.pattern_name.clone());
                    pattern
                }
            };
            next.push(pattern);
        }

        outcome.evicted = library
            .iter()
            .filter(|p| next.position(&p.pattern_name).is_none())
            .map(|p| p.pattern_name.clone())
            .collect();
        outcome.library = next;
        Ok(outcome)
    }

    /// Política N-pattern: funde por nome, insere enquanto houver espaço e depois remove.
    fn merge(
        &self,
        library: &PatternLibrary,
        proposals: &[ProposedPattern],
        batch: &[QueryPair],
    ) -> ConsolidationOutcome {
        let mut outcome = ConsolidationOutcome {
            library: library.clone(),
            ..Default::default()
        };
        // Removidos neste passo; uma proposta com o mesmo nome os traz de volta.
        let mut removed_here: Vec<Pattern> = Vec::new();

        for proposal in proposals {
            if let Some(index) = outcome.library.position(&proposal.pattern_name) {
                if let Some(pattern) = outcome.library.get_mut_at(index) {
                    absorb_proposal(pattern, proposal, batch);
                    let name = pattern.pattern_name.clone();
                    if !outcome.newly_added.contains(&name) && !outcome.refined.contains(&name) {
                        outcome.refined.push(name);
                    }
                }
                continue;
            }

            let key = name_key(&proposal.pattern_name);
            let candidate = match removed_here.iter().position(|p| p.key() == key) {
                Some(i) => {
                    let mut revived = removed_here.remove(i);
                    absorb_proposal(&mut revived, proposal, batch);
                    revived
                }
                None => new_pattern(proposal, batch),
            };

            if outcome.library.len() < self.max_patterns {
                outcome.record_insert(library, &candidate.pattern_name);
                outcome.library.push(candidate);
                continue;
            }

            let Some(victim_index) = outcome.library.eviction_candidate() else {
                continue;
            };
            let victim = &outcome.library.patterns()[victim_index];

            if victim.coverage_count > candidate.coverage_count {
                let discarded = DiscardedProposal {
                    pattern_name: candidate.pattern_name.clone(),
                    implied_coverage: candidate.coverage_count,
                    blocking_pattern: victim.pattern_name.clone(),
                    blocking_coverage: victim.coverage_count,
                };
                tracing::warn!(discarded = %discarded, "Discarding proposal, library is full");
                outcome.discarded.push(discarded);
                continue;
            }

            let removed = outcome.library.remove_at(victim_index);
            tracing::debug!(
                evicted = %removed.pattern_name,
                coverage = removed.coverage_count,
                replacement = %candidate.pattern_name,
                "Evicting pattern"
            );

            // Adicionado e removido no mesmo passo: nunca existiu fora dele.
            match outcome
                .newly_added
                .iter()
                .position(|n| name_key(n) == removed.key())
            {
                Some(i) => {
                    outcome.newly_added.remove(i);
                }
                None => {
                    outcome.refined.retain(|n| name_key(n) != removed.key());
                    outcome.evicted.push(removed.pattern_name.clone());
                }
            }
            removed_here.push(removed);

            outcome.record_insert(library, &candidate.pattern_name);
            outcome.library.push(candidate);
        }

        outcome
    }

    /// Funde a biblioteca em no máximo `target` padrões finais.
    ///
    /// Cada padrão final herda exemplos e contribuidores dos padrões que
    /// absorve (mesmo nome ou `merged_from`). Sua cobertura nunca fica abaixo
    /// da maior cobertura entre eles.
    pub fn finalize(
        &self,
        library: &PatternLibrary,
        proposals: &[ProposedPattern],
        target: usize,
    ) -> Result<FinalOutcome, ParseError> {
        let proposals = merge_duplicate_names(proposals);
        if proposals.is_empty() {
            return Err(ParseError::EmptyFinalLibrary);
        }
        if proposals.len() > target {
            return Err(ParseError::CapacityExceeded {
                size: proposals.len(),
                max: target,
            });
        }

        let mut outcome = FinalOutcome::default();
        let mut claimed: BTreeSet<String> = BTreeSet::new();

        for proposal in &proposals {
            let final_key = name_key(&proposal.pattern_name);
            let source_keys: BTreeSet<String> = std::iter::once(final_key.clone())
                .chain(proposal.merged_from.iter().map(|n| name_key(n)))
                .collect();

            let mut pattern = Pattern::new(
                proposal.pattern_name.clone(),
                proposal.description.clone(),
                proposal.transformation_rule.clone(),
            );
            let mut floor = 0;

            for source in library.iter().filter(|p| source_keys.contains(&p.key())) {
                pattern.absorb_examples(&source.examples);
                pattern.absorb_contributors(source.contributors.iter().cloned());
                floor = floor.max(source.coverage_count);

                if claimed.insert(source.key()) && source.key() != final_key {
                    outcome.merged.push(MergedPattern {
                        source: source.pattern_name.clone(),
                        into: proposal.pattern_name.clone(),
                    });
                }
            }

            let fresh: Vec<Example> = proposal
                .examples
                .iter()
                .filter(|e| !pattern.has_example(e))
                .cloned()
                .collect();
            pattern.absorb_examples(&fresh);
            pattern.absorb_contributors(contributors_for(&fresh, &[]));
            pattern.coverage_count = pattern.coverage_count.max(floor);

            outcome.library.push(pattern);
        }

        outcome.dropped = library
            .iter()
            .filter(|p| !claimed.contains(&p.key()))
            .map(|p| p.pattern_name.clone())
            .collect();
        Ok(outcome)
    }
}

/// Funde uma proposta num padrão existente.
///
/// Descrição e regra não vazias substituem as atuais. A cobertura cresce com
/// os contribuidores inéditos; um exemplo que o padrão já tem só conta quando
/// vem de um par deste lote.
fn absorb_proposal(pattern: &mut Pattern, proposal: &ProposedPattern, batch: &[QueryPair]) {
    if !proposal.description.trim().is_empty() {
        pattern.description = proposal.description.clone();
    }
    if !proposal.transformation_rule.trim().is_empty() {
        pattern.transformation_rule = proposal.transformation_rule.clone();
    }

    let contributors: BTreeSet<String> = proposal
        .examples
        .iter()
        .filter_map(|example| {
            let key = contributor_key(example, batch);
            let from_batch = !key.starts_with(SYNTHETIC_PREFIX);
            (from_batch || !pattern.has_example(example)).then_some(key)
        })
        .collect();

    pattern.absorb_examples(&proposal.examples);
    pattern.absorb_contributors(contributors);
}

fn new_pattern(proposal: &ProposedPattern, batch: &[QueryPair]) -> Pattern {
    let mut pattern = Pattern::new(
        proposal.pattern_name.clone(),
        proposal.description.clone(),
        proposal.transformation_rule.clone(),
    );
    pattern.absorb_examples(&proposal.examples);
    pattern.absorb_contributors(contributors_for(&proposal.examples, batch));
    pattern
}

/// Junta propostas de mesmo nome, mantendo a primeira posição.
fn merge_duplicate_names(proposals: &[ProposedPattern]) -> Vec<ProposedPattern> {
    let mut merged: Vec<ProposedPattern> = Vec::with_capacity(proposals.len());
    for proposal in proposals {
        let key = name_key(&proposal.pattern_name);
        match merged.iter_mut().find(|p| name_key(&p.pattern_name) == key) {
            Some(existing) => {
                for example in &proposal.examples {
                    if !existing.examples.contains(example) {
                        existing.examples.push(example.clone());
                    }
                }
                for source in &proposal.merged_from {
                    if !existing.merged_from.contains(source) {
                        existing.merged_from.push(source.clone());
                    }
                }
            }
            None => merged.push(proposal.clone()),
        }
    }
    merged
}

const SYNTHETIC_PREFIX: &str = "ex:";

/// Identidade do par por trás de um exemplo.
///
/// Prefere o par do lote com os mesmos textos, depois um com a mesma consulta
/// original. Exemplos sem par no lote recebem uma chave derivada dos textos.
pub fn contributor_key(example: &Example, batch: &[QueryPair]) -> String {
    batch
        .iter()
        .find(|p| p.matches_example(example))
        .or_else(|| batch.iter().find(|p| p.original_query == example.0))
        .map(|p| p.id.clone())
        .unwrap_or_else(|| format!("{}{}\u{2192}{}", SYNTHETIC_PREFIX, example.0, example.1))
}

/// Contribuidores distintos de um conjunto de exemplos.
pub fn contributors_for(examples: &[Example], batch: &[QueryPair]) -> BTreeSet<String> {
    examples.iter().map(|e| contributor_key(e, batch)).collect()
}

/// Mapeia cada par do lote para um padrão da biblioteca resultante.
///
/// Vence o primeiro padrão reportado pelo LLM que ainda existe; senão, o
/// primeiro padrão que tem os textos do par como exemplo.
pub fn resolve_mappings(
    batch: &[QueryPair],
    applied: &[AppliedPatterns],
    library: &PatternLibrary,
) -> Vec<MappingRecord> {
    batch
        .iter()
        .map(|pair| {
            let reported = applied
                .iter()
                .filter(|a| a.query_id == pair.id)
                .flat_map(|a| a.applied_patterns.iter())
                .find_map(|name| library.get(name));

            let matched = reported
                .or_else(|| library.find_by_example(pair))
                .map(|p| p.pattern_name.clone());

            MappingRecord::new(pair.id.clone(), matched)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex(o: &str, r: &str) -> Example {
        (o.to_string(), r.to_string())
    }

    fn proposal(name: &str, examples: Vec<Example>) -> ProposedPattern {
        ProposedPattern::new(name, format!("{} description", name), "rule", examples)
    }

    fn pattern(name: &str, coverage: usize) -> Pattern {
        Pattern::new(name, "d", "r")
            .with_examples(vec![ex(&format!("{}-o", name), &format!("{}-r", name))])
            .with_coverage(coverage)
    }

    fn create_test_batch() -> Vec<QueryPair> {
        vec![
            QueryPair::new("q1", "cheap flights", "low cost airfare"),
            QueryPair::new("q2", "python list", "python list comprehension tutorial"),
        ]
    }

    #[test]
    fn test_npattern_evicts_lowest_coverage() {
        let library = PatternLibrary::from_patterns(vec![pattern("A", 5), pattern("B", 1)]);
        let consolidator = Consolidator::new(ConsolidationPolicy::NPattern, 2);

        let outcome = consolidator
            .consolidate(
                &library,
                &[proposal("C", vec![ex("cheap flights", "low cost airfare")])],
                &create_test_batch(),
            )
            .unwrap();

        assert_eq!(outcome.library.names(), vec!["A", "C"]);
        assert_eq!(outcome.evicted, vec!["B"]);
        assert_eq!(outcome.newly_added, vec!["C"]);
        assert_eq!(outcome.library.get("C").unwrap().coverage_count, 1);
    }

    #[test]
    fn test_npattern_discards_when_all_stronger() {
        let library = PatternLibrary::from_patterns(vec![pattern("A", 5), pattern("B", 6)]);
        let consolidator = Consolidator::new(ConsolidationPolicy::NPattern, 2);

        let outcome = consolidator
            .consolidate(
                &library,
                &[proposal("D", vec![ex("cheap flights", "low cost airfare")])],
                &create_test_batch(),
            )
            .unwrap();

        assert_eq!(outcome.library, library);
        assert_eq!(outcome.discarded.len(), 1);
        assert_eq!(outcome.discarded[0].pattern_name, "D");
        assert_eq!(outcome.discarded[0].blocking_pattern, "A");
    }

    #[test]
    fn test_npattern_evicts_on_equal_coverage() {
        let library = PatternLibrary::from_patterns(vec![pattern("A", 1), pattern("B", 1)]);
        let consolidator = Consolidator::new(ConsolidationPolicy::NPattern, 2);

        let outcome = consolidator
            .consolidate(
                &library,
                &[proposal("C", vec![ex("cheap flights", "low cost airfare")])],
                &create_test_batch(),
            )
            .unwrap();

        assert_eq!(outcome.library.names(), vec!["B", "C"]);
    }

    #[test]
    fn test_npattern_restores_pattern_evicted_in_same_step() {
        let library = PatternLibrary::from_patterns(vec![pattern("A", 2), pattern("B", 2)]);
        let consolidator = Consolidator::new(ConsolidationPolicy::NPattern, 2);
        let batch = create_test_batch();

        let outcome = consolidator
            .consolidate(
                &library,
                &[
                    proposal("C", vec![ex("x1", "y1"), ex("x2", "y2"), ex("x3", "y3")]),
                    proposal("A", vec![ex("cheap flights", "low cost airfare")]),
                ],
                &batch,
            )
            .unwrap();

        let restored = outcome.library.get("A").unwrap();
        assert_eq!(outcome.library.names(), vec!["C", "A"]);
        assert!(restored.has_example(&ex("A-o", "A-r")));
        assert!(restored.has_example(&ex("cheap flights", "low cost airfare")));
        assert_eq!(restored.coverage_count, 3);
        assert_eq!(outcome.evicted, vec!["B"]);
        assert_eq!(outcome.refined, vec!["A"]);
        assert_eq!(outcome.newly_added, vec!["C"]);
    }

    #[test]
    fn test_npattern_match_appends_and_counts_distinct_pairs() {
        let library = PatternLibrary::from_patterns(vec![pattern("Expansion", 2)]);
        let consolidator = Consolidator::new(ConsolidationPolicy::NPattern, 3);

        let outcome = consolidator
            .consolidate(
                &library,
                &[proposal(
                    "expansion",
                    vec![
                        ex("Expansion-o", "Expansion-r"),
                        ex("cheap flights", "low cost airfare"),
                        ex("python list", "python list comprehension tutorial"),
                    ],
                )],
                &create_test_batch(),
            )
            .unwrap();

        let merged = outcome.library.get("Expansion").unwrap();
        assert_eq!(outcome.library.len(), 1);
        assert_eq!(merged.pattern_name, "Expansion");
        assert_eq!(merged.examples.len(), 3);
        assert_eq!(merged.coverage_count, 4);
        assert_eq!(merged.description, "expansion description");
        assert_eq!(outcome.refined, vec!["Expansion"]);
    }

    #[test]
    fn test_npattern_inserts_while_room() {
        let consolidator = Consolidator::new(ConsolidationPolicy::NPattern, 5);
        let outcome = consolidator
            .consolidate(
                &PatternLibrary::new(),
                &[
                    proposal("A", vec![ex("cheap flights", "low cost airfare")]),
                    proposal("B", vec![ex("x", "y")]),
                ],
                &create_test_batch(),
            )
            .unwrap();

        assert_eq!(outcome.library.names(), vec!["A", "B"]);
        assert_eq!(outcome.library.get("A").unwrap().contributors.iter().next().unwrap(), "q1");
    }

    #[test]
    fn test_empty_proposals_are_identity() {
        let library = PatternLibrary::from_patterns(vec![pattern("A", 5), pattern("B", 1)]);

        for policy in [ConsolidationPolicy::Consolidated, ConsolidationPolicy::NPattern] {
            let outcome = Consolidator::new(policy, 2)
                .consolidate(&library, &[], &create_test_batch())
                .unwrap();
            assert_eq!(outcome.library, library);
            assert!(outcome.evicted.is_empty());
        }
    }

    #[test]
    fn test_consolidated_rejects_oversized_replacement() {
        let consolidator = Consolidator::new(ConsolidationPolicy::Consolidated, 1);
        let result = consolidator.consolidate(
            &PatternLibrary::new(),
            &[proposal("A", vec![ex("a", "b")]), proposal("B", vec![ex("c", "d")])],
            &[],
        );

        assert_eq!(result.unwrap_err(), ParseError::CapacityExceeded { size: 2, max: 1 });
    }

    #[test]
    fn test_consolidated_carries_coverage_and_examples() {
        let library = PatternLibrary::from_patterns(vec![pattern("A", 4), pattern("B", 2)]);
        let consolidator = Consolidator::new(ConsolidationPolicy::Consolidated, 2);

        let outcome = consolidator
            .consolidate(
                &library,
                &[
                    proposal("a", vec![ex("cheap flights", "low cost airfare")]),
                    proposal("New", vec![ex("x1", "y1"), ex("x2", "y2")]),
                ],
                &create_test_batch(),
            )
            .unwrap();

        let a = outcome.library.get("A").unwrap();
        assert_eq!(a.coverage_count, 5);
        assert_eq!(a.examples[0], ex("A-o", "A-r"));
        assert_eq!(a.examples.len(), 2);
        assert_eq!(outcome.library.get("New").unwrap().coverage_count, 2);
        assert_eq!(outcome.evicted, vec!["B"]);
        assert_eq!(outcome.newly_added, vec!["New"]);
    }

    #[test]
    fn test_consolidated_merges_duplicate_names() {
        let consolidator = Consolidator::new(ConsolidationPolicy::Consolidated, 1);
        let outcome = consolidator
            .consolidate(
                &PatternLibrary::new(),
                &[proposal("A", vec![ex("a", "b")]), proposal("a", vec![ex("c", "d")])],
                &[],
            )
            .unwrap();

        assert_eq!(outcome.library.len(), 1);
        assert_eq!(outcome.library.get("A").unwrap().examples.len(), 2);
    }

    #[test]
    fn test_finalize_merges_sources() {
        let library = PatternLibrary::from_patterns(vec![
            pattern("A", 4).with_examples(vec![ex("a1", "b1"), ex("a2", "b2")]),
            pattern("B", 2),
            pattern("C", 1),
        ]);
        let consolidator = Consolidator::new(ConsolidationPolicy::NPattern, 3);

        let outcome = consolidator
            .finalize(
                &library,
                &[proposal("Merged", vec![ex("a1", "b1"), ex("new", "one")])
                    .with_merged_from(vec!["a".to_string(), "B".to_string()])],
                1,
            )
            .unwrap();

        let merged = outcome.library.get("Merged").unwrap();
        assert_eq!(outcome.library.len(), 1);
        assert_eq!(merged.examples.len(), 4);
        assert_eq!(merged.examples[0], ex("a1", "b1"));
        assert!(merged.coverage_count >= 4);
        assert_eq!(
            outcome.merged,
            vec![
                MergedPattern {
                    source: "A".to_string(),
                    into: "Merged".to_string()
                },
                MergedPattern {
                    source: "B".to_string(),
                    into: "Merged".to_string()
                },
            ]
        );
        assert_eq!(outcome.dropped, vec!["C"]);
    }

    #[test]
    fn test_finalize_keeps_same_name_pattern() {
        let library = PatternLibrary::from_patterns(vec![pattern("A", 3), pattern("B", 1)]);
        let consolidator = Consolidator::new(ConsolidationPolicy::Consolidated, 2);

        let outcome = consolidator
            .finalize(&library, &[proposal("a", vec![ex("A-o", "A-r")])], 1)
            .unwrap();

        let kept = outcome.library.get("A").unwrap();
        assert_eq!(kept.coverage_count, 3);
        assert_eq!(kept.examples, vec![ex("A-o", "A-r")]);
        assert!(outcome.merged.is_empty());
        assert_eq!(outcome.dropped, vec!["B"]);
    }

    #[test]
    fn test_finalize_rejects_too_many_or_none() {
        let library = PatternLibrary::from_patterns(vec![pattern("A", 3), pattern("B", 1)]);
        let consolidator = Consolidator::new(ConsolidationPolicy::NPattern, 2);

        assert_eq!(
            consolidator
                .finalize(
                    &library,
                    &[proposal("X", vec![ex("a", "b")]), proposal("Y", vec![ex("c", "d")])],
                    1
                )
                .unwrap_err(),
            ParseError::CapacityExceeded { size: 2, max: 1 }
        );
        assert_eq!(
            consolidator.finalize(&library, &[], 1).unwrap_err(),
            ParseError::EmptyFinalLibrary
        );
    }

    #[test]
    fn test_contributor_key_fallbacks() {
        let batch = create_test_batch();

        assert_eq!(contributor_key(&ex("cheap flights", "low cost airfare"), &batch), "q1");
        assert_eq!(contributor_key(&ex("cheap flights", "cheap plane tickets"), &batch), "q1");
        assert!(contributor_key(&ex("unknown", "query"), &batch).starts_with("ex:"));
    }

    #[test]
    fn test_resolve_mappings() {
        let batch = create_test_batch();
        let library = PatternLibrary::from_patterns(vec![
            Pattern::new("Synonym", "d", "r")
                .with_examples(vec![ex("cheap flights", "low cost airfare")]),
            Pattern::new("Specification", "d", "r"),
        ]);
        let applied = vec![AppliedPatterns {
            query_id: "q2".to_string(),
            applied_patterns: vec!["Gone".to_string(), "specification".to_string()],
        }];

        let mappings = resolve_mappings(&batch, &applied, &library);

        assert_eq!(mappings[0].matched_pattern.as_deref(), Some("Synonym"));
        assert_eq!(mappings[1].matched_pattern.as_deref(), Some("Specification"));
    }
}
