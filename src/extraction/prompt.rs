//! Renderização dos prompts.

use crate::types::config::ConsolidationPolicy;
use crate::types::pattern::{PatternLibrary, QueryPair};

/// Monta o prompt de um lote.
///
/// Implementações devem ser puras: as mesmas entradas geram sempre o mesmo texto.
pub trait PromptBuilder: Send + Sync {
    fn build(
        &self,
        batch: &[QueryPair],
        library: &PatternLibrary,
        policy: ConsolidationPolicy,
        max_patterns: usize,
    ) -> String;

    /// Prompt da consolidação final, que reduz a biblioteca a `target` padrões.
    fn build_final(&self, library: &PatternLibrary, target: usize) -> String {
        TemplatePromptBuilder::final_consolidation(library, target)
    }
}

/// Templates padrão das duas políticas.
#[derive(Debug, Clone, Default)]
pub struct TemplatePromptBuilder;

impl TemplatePromptBuilder {
    pub fn new() -> Self {
        Self
    }

    fn format_pairs(batch: &[QueryPair]) -> String {
        batch
            .iter()
            .enumerate()
            .map(|(i, pair)| {
                format!(
                    "[{}] Query ID: {} | Original: \"{}\" \u{2192} Reformulated: \"{}\"",
                    i + 1,
                    pair.id,
                    pair.original_query,
                    pair.reformulated_query
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_library(library: &PatternLibrary) -> String {
        if library.is_empty() {
            return String::from("(none yet)");
        }
        library
            .iter()
            .map(|p| {
                format!(
                    "- {}: {} (Rule: {}) [coverage {}]",
                    p.pattern_name, p.description, p.transformation_rule, p.coverage_count
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_learned(library: &PatternLibrary) -> String {
        library
            .iter()
            .map(|p| {
                let examples = p
                    .examples
                    .iter()
                    .take(3)
                    .map(|(o, r)| format!("[\"{}\", \"{}\"]", o, r))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "- {}: {}\n  Rule: {}\n  Coverage: {}\n  Examples: [{}]",
                    p.pattern_name, p.description, p.transformation_rule, p.coverage_count, examples
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Template da consolidação final.
    pub fn final_consolidation(library: &PatternLibrary, target: usize) -> String {
        format!(
            r#"You have learned {size} patterns through iterative analysis of query reformulation pairs. Now consolidate these into at most {target} final, comprehensive patterns.

All Learned Patterns:
{patterns}

Your task is to:
1. Identify overlapping or similar patterns and merge them into comprehensive, distinct patterns.
2. Prioritize patterns by coverage, importance and applicability.
3. Keep the pattern_name of a learned pattern when it survives unchanged.
4. List in merged_from the pattern_name of every learned pattern a final pattern absorbs.

Each final pattern must include a pattern_name, a description, a transformation_rule and examples as [["original", "reformulated"]].

Return JSON only:
{{
  "final_patterns": [
    {{"pattern_name": "...", "description": "...", "transformation_rule": "...", "examples": [["original", "reformulated"]], "merged_from": ["..."]}}
  ],
  "consolidation_summary": "...",
  "final_patterns_count": {target}
}}
"#,
            size = library.len(),
            target = target,
            patterns = Self::format_learned(library),
        )
    }

    fn consolidated(batch: &[QueryPair], library: &PatternLibrary, max_patterns: usize) -> String {
        format!(
            r#"You are given query reformulation pairs and the current list of consolidated reformulation patterns.

Your task is to:
1. For each query pair, identify the pattern(s) applied to transform the original query into the reformulated query.
2. Return the complete consolidated list: incorporate newly discovered patterns, merge semantically redundant ones, and refine names, descriptions and rules so the set captures generalizable strategies.

Each pattern must include a pattern_name, a description, a transformation_rule and examples taken from the pairs as [["original", "reformulated"]].

Query Reformulation Pairs:
{pairs}

Current Consolidated Patterns ({size}):
{library}

Instructions:
- Return at most {max_patterns} consolidated patterns.
- Keep the pattern_name of an existing pattern when you keep or refine it.
- Use the Query ID shown above in individual_patterns.

Return JSON only:
{{
  "consolidated_patterns": [
    {{"pattern_name": "...", "description": "...", "transformation_rule": "...", "examples": [["original", "reformulated"]]}}
  ],
  "individual_patterns": [
    {{"query_id": "...", "applied_patterns": ["..."]}}
  ]
}}
"#,
            pairs = Self::format_pairs(batch),
            size = library.len(),
            library = Self::format_library(library),
            max_patterns = max_patterns,
        )
    }

    fn n_pattern(batch: &[QueryPair], library: &PatternLibrary, max_patterns: usize) -> String {
        format!(
            r#"You are given query reformulation pairs and the list of known reformulation patterns.

Propose only the patterns evidenced by these pairs: new patterns not covered by the known list, or known patterns (same pattern_name) with the new examples that support them. Do not repeat known patterns the pairs do not support. At most {max_patterns} patterns are kept overall.

Each pattern must include a pattern_name, a description, a transformation_rule and examples taken from the pairs as [["original", "reformulated"]].

Query Reformulation Pairs:
{pairs}

Known Patterns ({size}):
{library}

Return JSON only:
{{
  "new_patterns": [
    {{"pattern_name": "...", "description": "...", "transformation_rule": "...", "examples": [["original", "reformulated"]]}}
  ],
  "individual_patterns": [
    {{"query_id": "...", "applied_patterns": ["..."]}}
  ]
}}
"#,
            pairs = Self::format_pairs(batch),
            size = library.len(),
            library = Self::format_library(library),
            max_patterns = max_patterns,
        )
    }
}

impl PromptBuilder for TemplatePromptBuilder {
    fn build(
        &self,
        batch: &[QueryPair],
        library: &PatternLibrary,
        policy: ConsolidationPolicy,
        max_patterns: usize,
    ) -> String {
        match policy {
            ConsolidationPolicy::Consolidated => Self::consolidated(batch, library, max_patterns),
            ConsolidationPolicy::NPattern => Self::n_pattern(batch, library, max_patterns),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::pattern::Pattern;

    fn create_test_batch() -> Vec<QueryPair> {
        vec![QueryPair::new("qid_7", "cheap flights", "low cost airfare")]
    }

    #[test]
    fn test_consolidated_embeds_library_and_limit() {
        let library = PatternLibrary::from_patterns(vec![Pattern::new(
            "Synonym Substitution",
            "swaps terms",
            "replace with synonym",
        )]);

        let prompt = TemplatePromptBuilder::new().build(
            &create_test_batch(),
            &library,
            ConsolidationPolicy::Consolidated,
            7,
        );

        assert!(prompt.contains("qid_7"));
        assert!(prompt.contains("Synonym Substitution"));
        assert!(prompt.contains("at most 7"));
        assert!(prompt.contains("consolidated_patterns"));
    }

    #[test]
    fn test_n_pattern_asks_for_new_patterns() {
        let prompt = TemplatePromptBuilder::new().build(
            &create_test_batch(),
            &PatternLibrary::new(),
            ConsolidationPolicy::NPattern,
            5,
        );

        assert!(prompt.contains("new_patterns"));
        assert!(prompt.contains("(none yet)"));
    }

    #[test]
    fn test_final_prompt_lists_library_and_target() {
        let library = PatternLibrary::from_patterns(vec![Pattern::new(
            "Synonym Substitution",
            "swaps terms",
            "replace with synonym",
        )
        .with_examples(vec![
            ("a".to_string(), "b".to_string()),
            ("c".to_string(), "d".to_string()),
            ("e".to_string(), "f".to_string()),
            ("g".to_string(), "h".to_string()),
        ])]);

        let prompt = TemplatePromptBuilder::new().build_final(&library, 4);

        assert!(prompt.contains("learned 1 patterns"));
        assert!(prompt.contains("at most 4 final"));
        assert!(prompt.contains("\"final_patterns\""));
        assert!(prompt.contains("[\"e\", \"f\"]"));
        assert!(!prompt.contains("[\"g\", \"h\"]"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = TemplatePromptBuilder::new();
        let batch = create_test_batch();
        let library = PatternLibrary::new();

        assert_eq!(
            builder.build(&batch, &library, ConsolidationPolicy::Consolidated, 3),
            builder.build(&batch, &library, ConsolidationPolicy::Consolidated, 3)
        );
    }
}
