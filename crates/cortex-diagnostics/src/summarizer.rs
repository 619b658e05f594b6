//! Optional LLM summarization, memoized by analysis (spec §4.4 "LLM
//! summarization (optional collaborator)").
//!
//! `summarize` is a pure cache-or-call: a cache hit never touches the
//! provider, and a cache miss always persists what the provider returned
//! before handing it back, so a crash between the two never leaves a
//! summary that cannot be reproduced by calling again.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use cortex_types::AnalysisId;

use crate::error::Result;

/// A pluggable LLM summarization backend.
///
/// Responsibilities:
/// - Turn a findings summary prompt into natural-language text
/// - Report which model answered and what it cost, for the caller's budget
///   accounting
///
/// Outages are surfaced as `Error::ProviderError` and propagate to the
/// caller rather than being retried here; Hybrid Search's embedding
/// provider has an analogous contract (spec §7 "LLM/embedding provider
/// outages").
pub trait SummaryProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    fn summarize(&self, prompt: &str) -> Result<ProviderSummary>;
}

#[derive(Debug, Clone)]
pub struct ProviderSummary {
    pub text: String,
    pub model: String,
    pub tokens: Option<u64>,
    pub cost_usd: Option<f64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Summary {
    pub text: String,
    pub model: String,
    pub provider: String,
    pub tokens: Option<u64>,
    pub cost_usd: Option<f64>,
    pub is_from_cache: bool,
}

pub struct Summarizer<'a> {
    conn: &'a Connection,
    provider: &'a dyn SummaryProvider,
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_summaries (
            analysis_id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            model TEXT NOT NULL,
            provider TEXT NOT NULL,
            tokens INTEGER,
            cost_usd REAL,
            created_at TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

impl<'a> Summarizer<'a> {
    pub fn new(conn: &'a Connection, provider: &'a dyn SummaryProvider) -> Result<Self> {
        init_schema(conn)?;
        Ok(Self { conn, provider })
    }

    /// Returns the cached summary for `analysis_id` unless `force_refresh`
    /// is set or no cache entry exists, in which case the provider is
    /// called and the result memoized before returning.
    pub fn summarize(&self, analysis_id: &AnalysisId, force_refresh: bool, prompt: &str) -> Result<Summary> {
        if !force_refresh {
            if let Some(cached) = self.load_cached(analysis_id)? {
                return Ok(cached);
            }
        }

        let produced = self.provider.summarize(prompt)?;
        self.store_cached(analysis_id, &produced)?;

        Ok(Summary {
            text: produced.text,
            model: produced.model,
            provider: self.provider.provider_name().to_string(),
            tokens: produced.tokens,
            cost_usd: produced.cost_usd,
            is_from_cache: false,
        })
    }

    fn load_cached(&self, analysis_id: &AnalysisId) -> Result<Option<Summary>> {
        self.conn
            .query_row(
                "SELECT text, model, provider, tokens, cost_usd FROM analysis_summaries WHERE analysis_id = ?1",
                params![analysis_id.as_str()],
                |row| {
                    Ok(Summary {
                        text: row.get(0)?,
                        model: row.get(1)?,
                        provider: row.get(2)?,
                        tokens: row.get::<_, Option<i64>>(3)?.map(|t| t as u64),
                        cost_usd: row.get(4)?,
                        is_from_cache: true,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    fn store_cached(&self, analysis_id: &AnalysisId, produced: &ProviderSummary) -> Result<()> {
        self.conn.execute(
            "INSERT INTO analysis_summaries (analysis_id, text, model, provider, tokens, cost_usd, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(analysis_id) DO UPDATE SET
                text = excluded.text, model = excluded.model, provider = excluded.provider,
                tokens = excluded.tokens, cost_usd = excluded.cost_usd, created_at = excluded.created_at",
            params![
                analysis_id.as_str(),
                produced.text,
                produced.model,
                self.provider.provider_name(),
                produced.tokens.map(|t| t as i64),
                produced.cost_usd,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    impl SummaryProvider for CountingProvider {
        fn provider_name(&self) -> &'static str {
            "test-provider"
        }

        fn summarize(&self, prompt: &str) -> Result<ProviderSummary> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderSummary {
                text: format!("summary of: {prompt}"),
                model: "test-model".to_string(),
                tokens: Some(10),
                cost_usd: Some(0.001),
            })
        }
    }

    #[test]
    fn second_call_is_served_from_cache() {
        let conn = Connection::open_in_memory().unwrap();
        let provider = CountingProvider { calls: AtomicUsize::new(0) };
        let summarizer = Summarizer::new(&conn, &provider).unwrap();
        let analysis_id = AnalysisId::from("a1".to_string());

        let first = summarizer.summarize(&analysis_id, false, "prompt").unwrap();
        assert!(!first.is_from_cache);
        let second = summarizer.summarize(&analysis_id, false, "prompt").unwrap();
        assert!(second.is_from_cache);
        assert_eq!(second.text, first.text);

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn force_refresh_bypasses_cache() {
        let conn = Connection::open_in_memory().unwrap();
        let provider = CountingProvider { calls: AtomicUsize::new(0) };
        let summarizer = Summarizer::new(&conn, &provider).unwrap();
        let analysis_id = AnalysisId::from("a1".to_string());

        summarizer.summarize(&analysis_id, false, "prompt").unwrap();
        summarizer.summarize(&analysis_id, true, "prompt").unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
