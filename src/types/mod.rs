//! Tipos compartilhados.

pub mod config;
pub mod errors;
pub mod pattern;
