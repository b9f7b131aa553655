//! Leitura dos pares e amostragem com semente.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::config::RunConfig;
use crate::types::pattern::QueryPair;
use crate::{ReformineError, ReformineResult};

const ID_KEYS: &[&str] = &["id", "query_id", "qid"];
const ORIGINAL_KEYS: &[&str] = &["original_query", "original", "query"];
const REFORMULATED_KEYS: &[&str] = &["reformulated_query", "reformulated", "improved_query"];

/// Formato do arquivo de dataset, escolhido pela extensão.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    Tsv,
    Csv,
    JsonLines,
    Json,
}

impl DatasetFormat {
    /// Detecta o formato pela extensão do arquivo.
    pub fn from_path(path: &Path) -> ReformineResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "tsv" | "txt" => Ok(DatasetFormat::Tsv),
            "csv" => Ok(DatasetFormat::Csv),
            "jsonl" | "ndjson" => Ok(DatasetFormat::JsonLines),
            "json" => Ok(DatasetFormat::Json),
            other => Err(ReformineError::data(format!(
                "unsupported dataset extension '{}' for {}",
                other,
                path.display()
            ))),
        }
    }
}

/// A amostra ordenada que a execução percorre.
#[derive(Debug, Clone)]
pub struct SampledPairs {
    /// Pares amostrados, na ordem do dataset.
    pub pairs: Vec<QueryPair>,

    /// Pares disponíveis no dataset antes da amostragem.
    pub available: usize,

    /// SHA-256 (hex) dos ids amostrados, usado para validar retomadas.
    pub fingerprint: String,
}

/// Fornece a sequência amostrada de pares de um dataset.
#[derive(Debug, Clone)]
pub struct QueryPairSource {
    dataset_id: String,
    path: PathBuf,
    seed: u64,
}

impl QueryPairSource {
    /// Cria uma fonte para o arquivo de dataset.
    pub fn new(dataset_id: impl Into<String>, path: impl Into<PathBuf>, seed: u64) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            path: path.into(),
            seed,
        }
    }

    /// Cria uma fonte a partir da configuração da execução.
    pub fn from_run_config(config: &RunConfig) -> Self {
        Self::new(
            config.dataset_id.clone(),
            config.dataset_path.clone(),
            config.seed,
        )
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    /// Lê o dataset e amostra `sample_size` pares sem reposição.
    ///
    /// O mesmo `(arquivo, sample_size, seed)` gera sempre a mesma sequência.
    /// `None` pega todos os pares.
    pub fn load(&self, sample_size: Option<usize>) -> ReformineResult<SampledPairs> {
        if !self.path.exists() {
            return Err(ReformineError::data(format!(
                "dataset '{}' not found at {}",
                self.dataset_id,
                self.path.display()
            )));
        }

        let all = read_pairs(&self.path)?;
        let available = all.len();

        let pairs = match sample_size {
            Some(n) if n > available => {
                return Err(ReformineError::data(format!(
                    "sample_size {} exceeds the {} pairs available in '{}'",
                    n, available, self.dataset_id
                )));
            }
            Some(n) if n < available => sample_in_order(all, n, self.seed),
            _ => all,
        };

        tracing::info!(
            dataset = %self.dataset_id,
            available,
            sampled = pairs.len(),
            seed = self.seed,
            "Query pairs loaded"
        );

        let fingerprint = fingerprint(&pairs);
        Ok(SampledPairs {
            pairs,
            available,
            fingerprint,
        })
    }
}

/// Escolhe `n` pares distintos com gerador de semente fixa, na ordem do dataset.
fn sample_in_order(all: Vec<QueryPair>, n: usize, seed: u64) -> Vec<QueryPair> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut indices = rand::seq::index::sample(&mut rng, all.len(), n).into_vec();
    indices.sort_unstable();

    let mut slots: Vec<Option<QueryPair>> = all.into_iter().map(Some).collect();
    indices
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

/// SHA-256 dos ids dos pares, em ordem.
pub fn fingerprint(pairs: &[QueryPair]) -> String {
    let mut hasher = Sha256::new();
    for pair in pairs {
        hasher.update(pair.id.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Lê todos os pares de um arquivo de dataset.
pub fn read_pairs(path: &Path) -> ReformineResult<Vec<QueryPair>> {
    let pairs = match DatasetFormat::from_path(path)? {
        DatasetFormat::Tsv => read_delimited(path, b'\t')?,
        DatasetFormat::Csv => read_delimited(path, b',')?,
        DatasetFormat::JsonLines => read_json_lines(path)?,
        DatasetFormat::Json => read_json_array(path)?,
    };

    let mut seen = HashSet::new();
    for pair in &pairs {
        if !seen.insert(pair.id.as_str()) {
            return Err(ReformineError::data(format!(
                "duplicate query id '{}' in {}",
                pair.id,
                path.display()
            )));
        }
    }

    if pairs.is_empty() {
        return Err(ReformineError::data(format!(
            "dataset {} contains no query pairs",
            path.display()
        )));
    }

    Ok(pairs)
}

fn read_delimited(path: &Path, delimiter: u8) -> ReformineResult<Vec<QueryPair>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .quoting(delimiter != b'\t')
        .from_path(path)?;

    let mut records = reader.records();
    let mut columns = [0usize, 1, 2];
    let mut pairs = Vec::new();
    let mut line = 0usize;

    // Cabeçalho é reconhecido pelos nomes das colunas; sem ele, as colunas são posicionais.
    let first = match records.next() {
        Some(record) => record?,
        None => return Ok(pairs),
    };
    line += 1;
    match header_columns(&first) {
        Some(found) => columns = found,
        None => pairs.push(record_to_pair(&first, &columns, line)?),
    }

    for record in records {
        let record = record?;
        line += 1;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        pairs.push(record_to_pair(&record, &columns, line)?);
    }

    Ok(pairs)
}

fn header_columns(record: &csv::StringRecord) -> Option<[usize; 3]> {
    let find = |keys: &[&str]| {
        record
            .iter()
            .position(|f| keys.contains(&f.trim().to_lowercase().as_str()))
    };
    match (find(ID_KEYS), find(ORIGINAL_KEYS), find(REFORMULATED_KEYS)) {
        (Some(id), Some(original), Some(reformulated)) => Some([id, original, reformulated]),
        _ => None,
    }
}

fn record_to_pair(
    record: &csv::StringRecord,
    columns: &[usize; 3],
    line: usize,
) -> ReformineResult<QueryPair> {
    let field = |index: usize, name: &str| -> ReformineResult<String> {
        record
            .get(index)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ReformineError::data(format!("line {}: missing field '{}'", line, name)))
    };

    Ok(QueryPair {
        id: field(columns[0], "id")?,
        original_query: field(columns[1], "original_query")?,
        reformulated_query: field(columns[2], "reformulated_query")?,
    })
}

fn read_json_lines(path: &Path) -> ReformineResult<Vec<QueryPair>> {
    let content = std::fs::read_to_string(path)?;
    let mut pairs = Vec::new();

    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .map_err(|e| ReformineError::data(format!("line {}: invalid JSON: {}", i + 1, e)))?;
        pairs.push(object_to_pair(&value, i + 1)?);
    }

    Ok(pairs)
}

fn read_json_array(path: &Path) -> ReformineResult<Vec<QueryPair>> {
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| ReformineError::data(format!("invalid JSON in {}: {}", path.display(), e)))?;

    let items = value.as_array().ok_or_else(|| {
        ReformineError::data(format!("{} must contain a JSON array", path.display()))
    })?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| object_to_pair(item, i + 1))
        .collect()
}

fn object_to_pair(value: &Value, line: usize) -> ReformineResult<QueryPair> {
    let field = |keys: &[&str], name: &str| -> ReformineResult<String> {
        keys.iter()
            .find_map(|k| match value.get(*k) {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| {
                ReformineError::data(format!("record {}: missing field '{}'", line, name))
            })
    };

    Ok(QueryPair {
        id: field(ID_KEYS, "id")?,
        original_query: field(ORIGINAL_KEYS, "original_query")?,
        reformulated_query: field(REFORMULATED_KEYS, "reformulated_query")?,
    })
}
