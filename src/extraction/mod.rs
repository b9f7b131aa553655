//! Extração iterativa de padrões.
//!
//! O [`Orchestrator`] puxa lotes, pede propostas ao LLM via [`PromptBuilder`],
//! valida a resposta com [`parse_response`] e incorpora as propostas na
//! biblioteca com o [`Consolidator`].

mod backoff;
mod consolidator;
mod orchestrator;
mod parser;
mod prompt;
mod state;

pub use backoff::Backoff;
pub use consolidator::{
    contributor_key, contributors_for, resolve_mappings, ConsolidationOutcome, Consolidator,
    DiscardedProposal, FinalOutcome,
};
pub use orchestrator::{CancellationFlag, Orchestrator, RunPhase, RunReport, RunStatus};
pub use parser::{
    parse_response, AppliedPatterns, ParsedResponse, PartialParseWarning, ProposedPattern,
};
pub use prompt::{PromptBuilder, TemplatePromptBuilder};
pub use state::{
    BatchOutcome, ExtractionState, FinalConsolidation, IterationRecord, MappingRecord,
    MergedPattern,
};
