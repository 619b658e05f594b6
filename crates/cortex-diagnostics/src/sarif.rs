//! SARIF 2.1.0 parsing (spec §4.4, §6.3).
//!
//! Only the subset named in §6.3 is modeled: `runs[].tool.driver.{name,
//! version}` and `runs[].results[].{ruleId, level, message.text,
//! locations[0].physicalLocation}`. Everything else in a SARIF log is
//! ignored rather than rejected.

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct SarifLog {
    #[serde(default)]
    runs: Vec<SarifRun>,
}

#[derive(Debug, Deserialize)]
struct SarifRun {
    tool: SarifTool,
    #[serde(default)]
    results: Vec<SarifResult>,
}

#[derive(Debug, Deserialize)]
struct SarifTool {
    driver: SarifDriver,
}

#[derive(Debug, Deserialize)]
struct SarifDriver {
    name: String,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SarifResult {
    #[serde(rename = "ruleId", default)]
    rule_id: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    message: SarifMessage,
    #[serde(default)]
    locations: Vec<SarifLocation>,
}

#[derive(Debug, Default, Deserialize)]
struct SarifMessage {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SarifLocation {
    #[serde(rename = "physicalLocation", default)]
    physical_location: Option<SarifPhysicalLocation>,
}

#[derive(Debug, Deserialize)]
struct SarifPhysicalLocation {
    #[serde(rename = "artifactLocation", default)]
    artifact_location: Option<SarifArtifactLocation>,
    #[serde(default)]
    region: Option<SarifRegion>,
}

#[derive(Debug, Deserialize)]
struct SarifArtifactLocation {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
struct SarifRegion {
    #[serde(rename = "startLine", default)]
    start_line: Option<u32>,
    #[serde(rename = "startColumn", default)]
    start_column: Option<u32>,
    #[serde(rename = "endLine", default)]
    end_line: Option<u32>,
    #[serde(rename = "endColumn", default)]
    end_column: Option<u32>,
}

/// One finding prior to normalization: whatever the wire format handed us,
/// with only the "no `filePath`" rejection already applied (spec §4.4: "a
/// finding without `filePath` is rejected").
#[derive(Debug, Clone)]
pub struct RawFinding {
    pub rule_id: String,
    pub level: Option<String>,
    pub message: String,
    pub file_path: String,
    pub start_line: u32,
    pub start_column: Option<u32>,
    pub end_line: Option<u32>,
    pub end_column: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ParsedSarif {
    pub tool_name: String,
    pub tool_version: String,
    pub findings: Vec<RawFinding>,
}

/// Parses a SARIF 2.1.0-shaped object, flattening every run's results. The
/// first run's `tool.driver` supplies the default tool name/version; a
/// `diagnostics_ingest` caller may override both explicitly.
pub fn parse_sarif(value: &serde_json::Value) -> Result<ParsedSarif> {
    let log: SarifLog = serde_json::from_value(value.clone())?;
    let first_run = log
        .runs
        .first()
        .ok_or_else(|| Error::InvalidArgument("SARIF log has no runs".into()))?;

    let tool_name = first_run.tool.driver.name.clone();
    let tool_version = first_run
        .tool
        .driver
        .version
        .clone()
        .unwrap_or_else(|| "unknown".to_string());

    let mut findings = Vec::new();
    for run in &log.runs {
        for result in &run.results {
            findings.push(to_raw_finding(result)?);
        }
    }

    Ok(ParsedSarif {
        tool_name,
        tool_version,
        findings,
    })
}

fn to_raw_finding(result: &SarifResult) -> Result<RawFinding> {
    let location = result
        .locations
        .first()
        .and_then(|l| l.physical_location.as_ref());

    let file_path = location
        .and_then(|p| p.artifact_location.as_ref())
        .and_then(|a| a.uri.clone())
        .ok_or_else(|| Error::InvalidArgument("SARIF result missing filePath".into()))?;

    let region = location.and_then(|p| p.region.clone());

    Ok(RawFinding {
        rule_id: result.rule_id.clone().unwrap_or_default(),
        level: result.level.clone(),
        message: result
            .message
            .text
            .clone()
            .unwrap_or_default(),
        file_path,
        start_line: region.as_ref().and_then(|r| r.start_line).unwrap_or(0),
        start_column: region.as_ref().and_then(|r| r.start_column),
        end_line: region.as_ref().and_then(|r| r.end_line),
        end_column: region.as_ref().and_then(|r| r.end_column),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tool_and_result_fields() {
        let sarif = json!({
            "runs": [{
                "tool": {"driver": {"name": "tsc", "version": "5.3.3"}},
                "results": [{
                    "ruleId": "TS2304",
                    "level": "error",
                    "message": {"text": "Cannot find name 'foo'."},
                    "locations": [{
                        "physicalLocation": {
                            "artifactLocation": {"uri": "src/index.ts"},
                            "region": {"startLine": 10, "startColumn": 5, "endLine": 10, "endColumn": 8}
                        }
                    }]
                }]
            }]
        });

        let parsed = parse_sarif(&sarif).unwrap();
        assert_eq!(parsed.tool_name, "tsc");
        assert_eq!(parsed.tool_version, "5.3.3");
        assert_eq!(parsed.findings.len(), 1);
        assert_eq!(parsed.findings[0].file_path, "src/index.ts");
        assert_eq!(parsed.findings[0].start_line, 10);
    }

    #[test]
    fn result_without_file_path_is_rejected() {
        let sarif = json!({
            "runs": [{
                "tool": {"driver": {"name": "tsc"}},
                "results": [{
                    "ruleId": "TS1",
                    "message": {"text": "oops"},
                    "locations": []
                }]
            }]
        });
        assert!(parse_sarif(&sarif).is_err());
    }
}
