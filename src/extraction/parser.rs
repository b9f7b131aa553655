//! Converte o texto bruto do LLM em propostas de padrão validadas.
//!
//! Nada fracamente tipado sai deste módulo: o resto do motor só recebe
//! [`ProposedPattern`] com nome, regra e exemplos presentes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::errors::ParseError;
use crate::types::pattern::Example;

/// Chaves em que um objeto de resposta pode trazer o array de padrões, em ordem de busca.
const PATTERN_KEYS: &[&str] = &[
    "final_patterns",
    "consolidated_patterns",
    "patterns",
    "new_patterns",
];

/// Padrão proposto pelo LLM, já validado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedPattern {
    pub pattern_name: String,
    pub description: String,
    pub transformation_rule: String,
    pub examples: Vec<Example>,

    /// Padrões da biblioteca fundidos neste (só na consolidação final).
    pub merged_from: Vec<String>,
}

impl ProposedPattern {
    pub fn new(
        pattern_name: impl Into<String>,
        description: impl Into<String>,
        transformation_rule: impl Into<String>,
        examples: Vec<Example>,
    ) -> Self {
        Self {
            pattern_name: pattern_name.into(),
            description: description.into(),
            transformation_rule: transformation_rule.into(),
            examples,
            merged_from: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_merged_from(mut self, merged_from: Vec<String>) -> Self {
        self.merged_from = merged_from;
        self
    }
}

/// Padrões que o LLM diz ter aplicado a um par.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedPatterns {
    pub query_id: String,
    pub applied_patterns: Vec<String>,
}

/// Proposta descartada de uma resposta que, no resto, é utilizável.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialParseWarning {
    /// Posição da proposta no array da resposta.
    pub index: usize,
    pub pattern_name: Option<String>,
    pub reason: String,
}

impl std::fmt::Display for PartialParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.pattern_name {
            Some(name) => write!(f, "proposal #{} ('{}'): {}", self.index, name, self.reason),
            None => write!(f, "proposal #{}: {}", self.index, self.reason),
        }
    }
}

/// Tudo o que se aproveita de uma resposta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    pub proposals: Vec<ProposedPattern>,
    pub individual: Vec<AppliedPatterns>,
    pub warnings: Vec<PartialParseWarning>,
}

/// Faz o parse de uma resposta do LLM.
///
/// Aceita um array JSON de padrões ou um objeto que o traga sob uma chave
/// conhecida, com ou sem texto ao redor ou blocos de código Markdown.
/// Propostas inválidas são descartadas e viram avisos. A resposta inteira
/// falha quando não há array de padrões ou quando todas as propostas são inválidas.
pub fn parse_response(text: &str) -> Result<ParsedResponse, ParseError> {
    let value = extract_json(text)?;

    let (items, individual) = match &value {
        Value::Array(items) => (items.as_slice(), Vec::new()),
        Value::Object(map) => {
            let items = PATTERN_KEYS
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_array))
                .ok_or(ParseError::NoJsonArray)?;
            (items.as_slice(), parse_individual(map))
        }
        _ => return Err(ParseError::NoJsonArray),
    };

    let mut parsed = ParsedResponse {
        individual,
        ..Default::default()
    };

    for (index, item) in items.iter().enumerate() {
        match validate_proposal(item) {
            Ok(proposal) => parsed.proposals.push(proposal),
            Err(reason) => {
                let warning = PartialParseWarning {
                    index,
                    pattern_name: item
                        .get("pattern_name")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    reason,
                };
                tracing::warn!(warning = %warning, "Dropping invalid pattern proposal");
                parsed.warnings.push(warning);
            }
        }
    }

    if !items.is_empty() && parsed.proposals.is_empty() {
        return Err(ParseError::NoValidProposals(items.len()));
    }

    Ok(parsed)
}

/// Localiza e decodifica o JSON de uma resposta.
fn extract_json(text: &str) -> Result<Value, ParseError> {
    let body = strip_code_fence(text).trim();

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Ok(value);
    }

    let object = span(body, '{', '}');
    let array = span(body, '[', ']');

    // Tenta primeiro a estrutura que abre antes.
    let mut candidates = vec![object, array];
    if let (Some((os, _)), Some((as_, _))) = (object, array) {
        if as_ < os {
            candidates.reverse();
        }
    }

    let mut last_error = None;
    for (start, end) in candidates.into_iter().flatten() {
        match serde_json::from_str::<Value>(&body[start..=end]) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    match last_error {
        Some(message) => Err(ParseError::InvalidJson(message)),
        None => Err(ParseError::NoJsonArray),
    }
}

fn span(text: &str, open: char, close: char) -> Option<(usize, usize)> {
    match (text.find(open), text.rfind(close)) {
        (Some(start), Some(end)) if start < end => Some((start, end)),
        _ => None,
    }
}

/// Conteúdo do primeiro bloco cercado por ```, ou `text` se não houver bloco.
fn strip_code_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after = &text[open + 3..];
    // Pula a tag de linguagem.
    let content_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let content = &after[content_start..];
    match content.find("```") {
        Some(close) => &content[..close],
        None => content,
    }
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn validate_proposal(item: &Value) -> Result<ProposedPattern, String> {
    if !item.is_object() {
        return Err("not a JSON object".to_string());
    }

    let name = non_empty_str(item, "pattern_name").ok_or("missing pattern_name")?;
    let rule = non_empty_str(item, "transformation_rule").ok_or("missing transformation_rule")?;
    let description = non_empty_str(item, "description").unwrap_or_default();

    let mut examples: Vec<Example> = Vec::new();
    if let Some(raw) = item.get("examples").and_then(Value::as_array) {
        for example in raw.iter().filter_map(parse_example) {
            if !examples.contains(&example) {
                examples.push(example);
            }
        }
    }
    if examples.is_empty() {
        return Err("no usable examples".to_string());
    }

    let merged_from = item
        .get("merged_from")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(ProposedPattern::new(name, description, rule, examples).with_merged_from(merged_from))
}

/// Lê `["orig", "ref"]` ou `{"original": .., "reformulated": ..}`.
fn parse_example(value: &Value) -> Option<Example> {
    let (original, reformulated) = match value {
        Value::Array(parts) if parts.len() >= 2 => (parts[0].as_str()?, parts[1].as_str()?),
        Value::Object(_) => (
            non_empty_str(value, "original").or_else(|| non_empty_str(value, "original_query"))?,
            non_empty_str(value, "reformulated")
                .or_else(|| non_empty_str(value, "reformulated_query"))?,
        ),
        _ => return None,
    };

    let (original, reformulated) = (original.trim(), reformulated.trim());
    if original.is_empty() || reformulated.is_empty() {
        return None;
    }
    Some((original.to_string(), reformulated.to_string()))
}

fn parse_individual(map: &Map<String, Value>) -> Vec<AppliedPatterns> {
    let Some(entries) = map.get("individual_patterns").and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let query_id = match entry.get("query_id")? {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            let applied_patterns = entry
                .get("applied_patterns")
                .and_then(Value::as_array)
                .map(|names| {
                    names
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            Some(AppliedPatterns {
                query_id,
                applied_patterns,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "consolidated_patterns": [
            {
                "pattern_name": "Semantic Clarification",
                "description": "Makes intent explicit",
                "transformation_rule": "replace ambiguous action with contextual behavior",
                "examples": [["fix car", "how to repair a car engine"]]
            }
        ],
        "individual_patterns": [
            {"query_id": "q1", "applied_patterns": ["Semantic Clarification"]}
        ],
        "summary": "one pattern"
    }"#;

    #[test]
    fn test_parse_object_with_individual_patterns() {
        let parsed = parse_response(VALID).unwrap();

        assert_eq!(parsed.proposals.len(), 1);
        assert_eq!(parsed.proposals[0].pattern_name, "Semantic Clarification");
        assert_eq!(parsed.individual[0].query_id, "q1");
        assert_eq!(parsed.individual[0].applied_patterns, vec!["Semantic Clarification"]);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_parse_fenced_bare_array() {
        let text = "Here you go:\n```json\n[{\"pattern_name\": \"A\", \"transformation_rule\": \"r\", \"examples\": [{\"original\": \"a\", \"reformulated\": \"b\"}]}]\n```\nDone.";

        let parsed = parse_response(text).unwrap();

        assert_eq!(parsed.proposals[0].examples, vec![("a".to_string(), "b".to_string())]);
        assert_eq!(parsed.proposals[0].description, "");
    }

    #[test]
    fn test_parse_with_surrounding_prose() {
        let text = format!("Sure! {} Hope this helps.", VALID);
        assert_eq!(parse_response(&text).unwrap().proposals.len(), 1);
    }

    #[test]
    fn test_new_patterns_key() {
        let text = r#"{"new_patterns": [{"pattern_name": "A", "transformation_rule": "r", "examples": [["a", "b"]]}]}"#;
        assert_eq!(parse_response(text).unwrap().proposals.len(), 1);
    }

    #[test]
    fn test_invalid_proposals_dropped_with_warning() {
        let text = r#"[
            {"pattern_name": "A", "transformation_rule": "r", "examples": [["a", "b"]]},
            {"pattern_name": "", "transformation_rule": "r", "examples": [["a", "b"]]},
            {"pattern_name": "C", "transformation_rule": "r", "examples": []},
            {"pattern_name": "D", "examples": [["a", "b"]]}
        ]"#;

        let parsed = parse_response(text).unwrap();

        assert_eq!(parsed.proposals.len(), 1);
        assert_eq!(parsed.warnings.len(), 3);
        assert_eq!(parsed.warnings[1].pattern_name.as_deref(), Some("C"));
        assert_eq!(parsed.warnings[2].index, 3);
    }

    #[test]
    fn test_all_invalid_is_parse_error() {
        let text = r#"[{"pattern_name": "A", "transformation_rule": "r", "examples": []}]"#;
        assert_eq!(parse_response(text), Err(ParseError::NoValidProposals(1)));
    }

    #[test]
    fn test_empty_array_is_ok() {
        let parsed = parse_response("[]").unwrap();
        assert!(parsed.proposals.is_empty());
    }

    #[test]
    fn test_no_json_at_all() {
        assert_eq!(
            parse_response("I could not find any patterns."),
            Err(ParseError::NoJsonArray)
        );
    }

    #[test]
    fn test_object_without_pattern_array() {
        assert_eq!(
            parse_response(r#"{"summary": "nothing"}"#),
            Err(ParseError::NoJsonArray)
        );
    }

    #[test]
    fn test_truncated_json_is_invalid() {
        let err = parse_response(r#"{"patterns": [{"pattern_name": "A"}, ] }"#).unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson(_)));
    }

    #[test]
    fn test_final_patterns_with_merged_from() {
        let text = r#"{
            "final_patterns": [
                {
                    "pattern_name": "Query Expansion",
                    "description": "adds context",
                    "transformation_rule": "append details",
                    "examples": [["fix car", "how to fix a car engine"]],
                    "frequency": "7",
                    "merged_from": ["Expand fix", " Expand cheap ", ""]
                }
            ],
            "consolidation_summary": "merged two",
            "final_patterns_count": "1"
        }"#;

        let parsed = parse_response(text).unwrap();

        assert_eq!(parsed.proposals.len(), 1);
        assert_eq!(parsed.proposals[0].merged_from, vec!["Expand fix", "Expand cheap"]);
        assert!(parsed.individual.is_empty());
    }

    #[test]
    fn test_duplicate_examples_collapsed() {
        let text = r#"[{"pattern_name": "A", "transformation_rule": "r", "examples": [["a", "b"], ["a", "b"], ["c"]]}]"#;
        let parsed = parse_response(text).unwrap();
        assert_eq!(parsed.proposals[0].examples.len(), 1);
    }
}
