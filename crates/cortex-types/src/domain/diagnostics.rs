//! Diagnostics domain types (spec §3, §4.4).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AnalysisId, FindingId, FindingsDigest, RunId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
    Info,
}

impl Severity {
    /// Maps a SARIF `level` string to a normalized severity (spec §4.4
    /// normalization step 3). Unknown levels default to `note`.
    #[must_use]
    pub fn from_sarif_level(level: Option<&str>) -> Self {
        match level.map(str::to_ascii_lowercase).as_deref() {
            Some("error") => Severity::Error,
            Some("warning") => Severity::Warning,
            Some("note") => Severity::Note,
            _ => Severity::Note,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Passed,
    Failed,
    Partial,
}

/// A single normalized finding, content-addressed by `findingId` (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticFinding {
    pub finding_id: FindingId,
    pub analysis_id: AnalysisId,
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    pub file_path: String,
    pub start_line: u32,
    pub start_column: Option<u32>,
    pub end_line: Option<u32>,
    pub end_column: Option<u32>,
}

/// One execution of a tool; many runs may share an `analysisId` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRun {
    pub run_id: RunId,
    pub analysis_id: AnalysisId,
    pub project_id: String,
    pub tree_hash: String,
    pub commit_hash: Option<String>,
    pub tool_name: String,
    pub tool_version: String,
    pub config_hash: String,
    pub environment_hash: Option<String>,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    pub findings_digest: FindingsDigest,
    pub raw_input: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Result of `diffAnalyses(a, b)` (spec §4.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisDiff {
    pub introduced: Vec<FindingId>,
    pub resolved: Vec<FindingId>,
    pub unchanged: Vec<FindingId>,
}
