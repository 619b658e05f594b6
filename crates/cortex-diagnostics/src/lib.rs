//! Content-addressed diagnostics analysis store (spec §4.4).
//!
//! Internal crate — not intended for direct use outside the workspace.

pub mod error;
pub mod normalize;
pub mod sarif;
pub mod store;
pub mod summarizer;

pub use error::{Error, Result};
pub use normalize::{
    compute_analysis_id, compute_finding_id, compute_findings_digest, normalize_one,
    NormalizedContent,
};
pub use sarif::{parse_sarif, ParsedSarif, RawFinding};
pub use store::DiagnosticsStore;
pub use summarizer::{ProviderSummary, Summarizer, SummaryProvider};
