//! Datasets de pares de consultas.
//!
//! [`QueryPairSource`] lê e amostra os pares de um dataset;
//! [`BatchScheduler`] fatia a amostra nos lotes que a execução consome.

mod scheduler;
mod source;

pub use scheduler::{Batch, BatchScheduler};
pub use source::{fingerprint, read_pairs, DatasetFormat, QueryPairSource, SampledPairs};
