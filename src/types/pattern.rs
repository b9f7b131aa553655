//! Modelo de dados: pares de consulta, padrões e a biblioteca limitada de padrões.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Exemplo `(original, reformulada)` associado a um padrão.
pub type Example = (String, String);

/// Unidade de evidência carregada de um dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryPair {
    pub id: String,
    pub original_query: String,
    pub reformulated_query: String,
}

impl QueryPair {
    /// Cria um novo par de consulta.
    pub fn new(
        id: impl Into<String>,
        original_query: impl Into<String>,
        reformulated_query: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            original_query: original_query.into(),
            reformulated_query: reformulated_query.into(),
        }
    }

    /// Se `example` tem exatamente os textos deste par.
    pub fn matches_example(&self, example: &Example) -> bool {
        self.original_query == example.0 && self.reformulated_query == example.1
    }
}

/// Regra nomeada e reutilizável de transformação de consultas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pattern {
    pub pattern_name: String,
    pub description: String,
    pub transformation_rule: String,
    pub examples: Vec<Example>,

    /// Número de pares distintos que já contribuíram com um exemplo.
    pub coverage_count: usize,

    /// Identidades dos contribuidores contados em `coverage_count`.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub contributors: BTreeSet<String>,
}

impl Pattern {
    /// Cria um padrão sem exemplos e com cobertura zero.
    pub fn new(
        pattern_name: impl Into<String>,
        description: impl Into<String>,
        transformation_rule: impl Into<String>,
    ) -> Self {
        Self {
            pattern_name: pattern_name.into(),
            description: description.into(),
            transformation_rule: transformation_rule.into(),
            examples: Vec::new(),
            coverage_count: 0,
            contributors: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_examples(mut self, examples: Vec<Example>) -> Self {
        self.examples = examples;
        self
    }

    #[must_use]
    pub fn with_coverage(mut self, coverage_count: usize) -> Self {
        self.coverage_count = coverage_count;
        self
    }

    /// Chave de busca do nome, sem distinção de maiúsculas.
    pub fn key(&self) -> String {
        name_key(&self.pattern_name)
    }

    /// Se o padrão já contém `example`.
    pub fn has_example(&self, example: &Example) -> bool {
        self.examples.iter().any(|e| e == example)
    }

    /// Acrescenta exemplos ainda ausentes, mantendo a ordem. Retorna quantos entraram.
    pub fn absorb_examples<'a, I>(&mut self, examples: I) -> usize
    where
        I: IntoIterator<Item = &'a Example>,
    {
        let mut added = 0;
        for example in examples {
            if !self.has_example(example) {
                self.examples.push(example.clone());
                added += 1;
            }
        }
        added
    }

    /// Registra contribuidores e soma à cobertura os que ainda não tinham sido vistos.
    pub fn absorb_contributors<I>(&mut self, contributors: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut added = 0;
        for contributor in contributors {
            if self.contributors.insert(contributor) {
                added += 1;
            }
        }
        self.coverage_count += added;
        added
    }
}

/// Normaliza o nome de um padrão para comparação sem distinção de maiúsculas.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Sequência ordenada de padrões, com nomes únicos e capacidade limitada.
///
/// A ordem do vetor é a ordem de inserção; o desempate da evicção depende dela.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct PatternLibrary {
    patterns: Vec<Pattern>,
}

impl PatternLibrary {
    /// Cria uma biblioteca vazia.
    pub fn new() -> Self {
        Self::default()
    }

    /// Monta uma biblioteca, mantendo o primeiro de cada nome duplicado.
    pub fn from_patterns(patterns: Vec<Pattern>) -> Self {
        let mut library = Self::new();
        for pattern in patterns {
            if library.position(&pattern.pattern_name).is_none() {
                library.patterns.push(pattern);
            }
        }
        library
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pattern> {
        self.patterns.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.patterns.iter().map(|p| p.pattern_name.clone()).collect()
    }

    /// Índice do padrão cujo nome corresponde a `name`, sem distinção de maiúsculas.
    pub fn position(&self, name: &str) -> Option<usize> {
        let key = name_key(name);
        self.patterns.iter().position(|p| p.key() == key)
    }

    pub fn get(&self, name: &str) -> Option<&Pattern> {
        self.position(name).map(|i| &self.patterns[i])
    }

    pub(crate) fn get_mut_at(&mut self, index: usize) -> Option<&mut Pattern> {
        self.patterns.get_mut(index)
    }

    /// Acrescenta um padrão. Unicidade e capacidade ficam a cargo de quem chama.
    pub(crate) fn push(&mut self, pattern: Pattern) {
        self.patterns.push(pattern);
    }

    pub(crate) fn remove_at(&mut self, index: usize) -> Pattern {
        self.patterns.remove(index)
    }

    /// Índice do candidato à evicção: menor cobertura, o mais antigo no empate.
    pub fn eviction_candidate(&self) -> Option<usize> {
        self.patterns
            .iter()
            .enumerate()
            .min_by(|(ia, a), (ib, b)| {
                a.coverage_count
                    .cmp(&b.coverage_count)
                    .then_with(|| ia.cmp(ib))
            })
            .map(|(i, _)| i)
    }

    /// Primeiro padrão com um exemplo igual aos textos do par.
    pub fn find_by_example(&self, pair: &QueryPair) -> Option<&Pattern> {
        self.patterns
            .iter()
            .find(|p| p.examples.iter().any(|e| pair.matches_example(e)))
    }

    /// Se os nomes são únicos (sem distinção de maiúsculas).
    pub fn names_are_unique(&self) -> bool {
        let mut seen = BTreeSet::new();
        self.patterns.iter().all(|p| seen.insert(p.key()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(o: &str, r: &str) -> Example {
        (o.to_string(), r.to_string())
    }

    #[test]
    fn test_name_lookup_is_case_insensitive() {
        let library = PatternLibrary::from_patterns(vec![Pattern::new(
            "Query Expansion",
            "adds terms",
            "append synonyms",
        )]);

        assert_eq!(library.position("query expansion"), Some(0));
        assert_eq!(library.position("  QUERY EXPANSION "), Some(0));
        assert!(library.get("Query Refinement").is_none());
    }

    #[test]
    fn test_from_patterns_drops_duplicate_names() {
        let library = PatternLibrary::from_patterns(vec![
            Pattern::new("A", "first", "r"),
            Pattern::new("a", "second", "r"),
            Pattern::new("B", "third", "r"),
        ]);

        assert_eq!(library.len(), 2);
        assert_eq!(library.get("A").unwrap().description, "first");
        assert!(library.names_are_unique());
    }

    #[test]
    fn test_absorb_examples_deduplicates() {
        let mut pattern = Pattern::new("A", "d", "r").with_examples(vec![example("a", "b")]);

        let added = pattern.absorb_examples(&[example("a", "b"), example("c", "d")]);

        assert_eq!(added, 1);
        assert_eq!(pattern.examples, vec![example("a", "b"), example("c", "d")]);
    }

    #[test]
    fn test_absorb_contributors_counts_distinct() {
        let mut pattern = Pattern::new("A", "d", "r");

        assert_eq!(pattern.absorb_contributors(vec!["q1".into(), "q2".into()]), 2);
        assert_eq!(pattern.absorb_contributors(vec!["q2".into(), "q3".into()]), 1);
        assert_eq!(pattern.coverage_count, 3);
    }

    #[test]
    fn test_eviction_candidate_prefers_oldest_on_tie() {
        let library = PatternLibrary::from_patterns(vec![
            Pattern::new("A", "d", "r").with_coverage(5),
            Pattern::new("B", "d", "r").with_coverage(2),
            Pattern::new("C", "d", "r").with_coverage(2),
        ]);

        assert_eq!(library.eviction_candidate(), Some(1));
        assert_eq!(PatternLibrary::new().eviction_candidate(), None);
    }

    #[test]
    fn test_examples_serialize_as_pairs() {
        let pattern = Pattern::new("A", "d", "r").with_examples(vec![example("x", "y")]);
        let json = serde_json::to_value(&pattern).unwrap();

        assert_eq!(json["examples"][0][0], "x");
        assert_eq!(json["examples"][0][1], "y");
        assert!(json.get("contributors").is_none());
    }

    #[test]
    fn test_find_by_example() {
        let library = PatternLibrary::from_patterns(vec![Pattern::new("A", "d", "r")
            .with_examples(vec![example("cheap flights", "low cost airfare")])]);
        let pair = QueryPair::new("q1", "cheap flights", "low cost airfare");
        let other = QueryPair::new("q2", "cheap flights", "flights");

        assert!(library.find_by_example(&pair).is_some());
        assert!(library.find_by_example(&other).is_none());
    }
}
