//! Pluggable provider interfaces injected into the service (spec §1: "LLM
//! summarization provider, embedding provider — injected as pluggable
//! interfaces"). Mirrors the shape of `cortex_diagnostics::SummaryProvider`.

use cortex_types::domain::Embedding;

use crate::error::Result;

/// Turns text into an embedding vector for the Vector Index / Hybrid
/// Search semantic signal (spec §4.9). Absence of a configured provider
/// downgrades Hybrid Search to the remaining modes rather than failing
/// (spec §7).
pub trait EmbeddingProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Embedding>;
}
