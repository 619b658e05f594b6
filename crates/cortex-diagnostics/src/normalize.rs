//! Pure normalization and content-addressing functions (spec §3, §4.4).
//!
//! Every function here is total and side-effect free: malformed input is
//! rejected explicitly before any hashing happens (spec §7: "Pure hashing
//! and normalization functions never fail; malformed input yields explicit
//! validation errors before hashing").

use cortex_types::canonical::{canonical_sha256_hex, digest_sorted_ids};
use cortex_types::domain::Severity;
use cortex_types::{AnalysisId, FindingId, FindingsDigest};
use serde_json::json;

use crate::error::Result;
use crate::sarif::RawFinding;

/// A finding's normalized content, prior to any `AnalysisId` being known.
#[derive(Debug, Clone)]
pub struct NormalizedContent {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    pub file_path: String,
    pub start_line: u32,
    pub start_column: Option<u32>,
    pub end_line: Option<u32>,
    pub end_column: Option<u32>,
}

/// Whitespace-collapse: trim, then replace every run of Unicode whitespace
/// with a single ASCII space (spec §4.4 normalization step 1).
#[must_use]
pub fn normalize_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut in_whitespace = false;
    for ch in message.trim().chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                out.push(' ');
                in_whitespace = true;
            }
        } else {
            out.push(ch);
            in_whitespace = false;
        }
    }
    out
}

/// Backslashes to forward slashes, duplicate separators collapsed; no `..`
/// resolution (spec §4.4 normalization step 2).
#[must_use]
pub fn normalize_file_path(path: &str) -> String {
    let slashed = path.replace('\\', "/");
    let mut out = String::with_capacity(slashed.len());
    let mut prev_slash = false;
    for ch in slashed.chars() {
        if ch == '/' {
            if !prev_slash {
                out.push(ch);
            }
            prev_slash = true;
        } else {
            out.push(ch);
            prev_slash = false;
        }
    }
    out
}

#[must_use]
pub fn normalize_one(raw: &RawFinding) -> NormalizedContent {
    NormalizedContent {
        rule_id: raw.rule_id.clone(),
        severity: Severity::from_sarif_level(raw.level.as_deref()),
        message: normalize_message(&raw.message),
        file_path: normalize_file_path(&raw.file_path),
        start_line: raw.start_line,
        start_column: raw.start_column,
        end_line: raw.end_line,
        end_column: raw.end_column,
    }
}

fn content_tuple(content: &NormalizedContent) -> serde_json::Value {
    json!({
        "ruleId": content.rule_id,
        "filePath": content.file_path,
        "startLine": content.start_line,
        "startColumn": content.start_column,
        "endLine": content.end_line,
        "endColumn": content.end_column,
        "normalizedMessage": content.message,
        "severity": content.severity,
    })
}

/// A fingerprint of one finding's normalized content alone, with no
/// `AnalysisId` baked in. Used only as an ingredient of
/// [`compute_analysis_id`] — breaking what would otherwise be a circular
/// dependency between `AnalysisId` and `FindingId` (see DESIGN.md).
fn content_fingerprint(content: &NormalizedContent) -> Result<String> {
    Ok(canonical_sha256_hex(&content_tuple(content))?)
}

/// Pure function: byte-identical `(projectId, treeHash, toolName,
/// toolVersion, configHash, findings)` tuples produce an identical
/// `AnalysisId` (invariant 2). `findings` is taken as normalized content
/// rather than already-assigned `FindingId`s, since the latter are
/// themselves derived from the `AnalysisId` this function produces.
pub fn compute_analysis_id(
    project_id: &str,
    tree_hash: &str,
    tool_name: &str,
    tool_version: &str,
    config_hash: &str,
    findings: &[NormalizedContent],
) -> Result<AnalysisId> {
    let mut fingerprints: Vec<String> = findings
        .iter()
        .map(content_fingerprint)
        .collect::<Result<_>>()?;
    fingerprints.sort();
    let content_digest = digest_sorted_ids(&fingerprints);

    let hex = canonical_sha256_hex(&json!({
        "projectId": project_id,
        "treeHash": tree_hash,
        "toolName": tool_name,
        "toolVersion": tool_version,
        "configHash": config_hash,
        "findingsDigest": content_digest,
    }))?;
    Ok(AnalysisId::from_hex(hex))
}

/// `FindingId` embeds `analysisId`, so equal-content findings under
/// different analyses get different ids (spec §4.4 Diff note).
pub fn compute_finding_id(
    analysis_id: &AnalysisId,
    content: &NormalizedContent,
) -> Result<FindingId> {
    let mut value = content_tuple(content);
    value
        .as_object_mut()
        .expect("content_tuple always returns an object")
        .insert("analysisId".to_string(), json!(analysis_id.as_str()));
    Ok(FindingId::from_hex(canonical_sha256_hex(&value)?))
}

/// SHA-256 over the sorted array of `FindingId`s (spec §3 `FindingsDigest`;
/// order-independent because callers always sort first).
#[must_use]
pub fn compute_findings_digest(sorted_finding_ids: &[FindingId]) -> FindingsDigest {
    let ids: Vec<&str> = sorted_finding_ids.iter().map(FindingId::as_str).collect();
    FindingsDigest::from_hex(digest_sorted_ids(&ids))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_whitespace_is_collapsed() {
        assert_eq!(normalize_message("  a\t\tb\n c  "), "a b c");
    }

    #[test]
    fn path_backslashes_become_forward_slashes_and_dedupe() {
        assert_eq!(normalize_file_path("src\\\\a\\b.rs"), "src/a/b.rs");
        assert_eq!(normalize_file_path("src//a///b.rs"), "src/a/b.rs");
    }

    fn sample(file_path: &str, message: &str) -> NormalizedContent {
        NormalizedContent {
            rule_id: "R1".into(),
            severity: Severity::Error,
            message: normalize_message(message),
            file_path: normalize_file_path(file_path),
            start_line: 10,
            start_column: Some(5),
            end_line: Some(10),
            end_column: Some(8),
        }
    }

    #[test]
    fn analysis_id_is_deterministic() {
        let findings = vec![sample("src/a.rs", "msg")];
        let a = compute_analysis_id("p", "t", "tsc", "5.3.3", "c", &findings).unwrap();
        let b = compute_analysis_id("p", "t", "tsc", "5.3.3", "c", &findings).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn analysis_id_is_order_independent_over_findings() {
        let mut findings = vec![sample("src/a.rs", "one"), sample("src/b.rs", "two")];
        let a = compute_analysis_id("p", "t", "tsc", "v", "c", &findings).unwrap();
        findings.reverse();
        let b = compute_analysis_id("p", "t", "tsc", "v", "c", &findings).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn finding_id_differs_across_analyses_for_identical_content() {
        let content = sample("src/a.rs", "same message");
        let analysis_a = compute_analysis_id("p1", "t", "tsc", "v", "c", &[content.clone()]).unwrap();
        let analysis_b = compute_analysis_id("p2", "t", "tsc", "v", "c", &[content.clone()]).unwrap();
        let id_a = compute_finding_id(&analysis_a, &content).unwrap();
        let id_b = compute_finding_id(&analysis_b, &content).unwrap();
        assert_ne!(id_a, id_b);
    }
}
