//! Content-addressed persistence for diagnostics (spec §4.4).
//!
//! Two tables: `runs` keyed by `runId` with `analysisId` indexed, and
//! `findings` keyed by `findingId` with `analysisId` indexed. `save_run` is
//! atomic — the run row and its findings commit in a single transaction, and
//! findings already present for the analysis (same `findingId`) are left
//! untouched rather than re-inserted, so re-ingesting an unchanged analysis
//! leaves the table indistinguishable from the first ingest.

use std::path::Path;

use chrono::{DateTime, Utc};
use cortex_types::domain::{AnalysisDiff, DiagnosticFinding, DiagnosticRun, RunStatus, Severity};
use cortex_types::{AnalysisId, FindingId, FindingsDigest, RunId};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};

pub const SCHEMA_VERSION: i32 = 1;

fn init_schema(conn: &Connection) -> Result<()> {
    let current: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current != 0 && current != SCHEMA_VERSION {
        conn.execute_batch("DROP TABLE IF EXISTS findings; DROP TABLE IF EXISTS runs;")?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            run_id TEXT PRIMARY KEY,
            analysis_id TEXT NOT NULL,
            project_id TEXT NOT NULL,
            tree_hash TEXT NOT NULL,
            commit_hash TEXT,
            tool_name TEXT NOT NULL,
            tool_version TEXT NOT NULL,
            config_hash TEXT NOT NULL,
            environment_hash TEXT,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            duration_ms INTEGER,
            findings_digest TEXT NOT NULL,
            raw_input TEXT,
            metadata TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_runs_analysis ON runs(analysis_id);
        CREATE INDEX IF NOT EXISTS idx_runs_project ON runs(project_id, tool_name, tool_version, tree_hash, created_at);

        CREATE TABLE IF NOT EXISTS findings (
            finding_id TEXT PRIMARY KEY,
            analysis_id TEXT NOT NULL,
            rule_id TEXT NOT NULL,
            severity TEXT NOT NULL,
            message TEXT NOT NULL,
            file_path TEXT NOT NULL,
            start_line INTEGER NOT NULL,
            start_column INTEGER,
            end_line INTEGER,
            end_column INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_findings_analysis ON findings(analysis_id);
        "#,
    )?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// Owns the diagnostics SQLite connection (spec §4.4 "Persistence").
pub struct DiagnosticsStore {
    conn: Connection,
}

impl DiagnosticsStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Atomically inserts `run` and any findings not already present under
    /// its `analysisId`. Calling this twice with the same `(analysisId,
    /// findings)` leaves the store indistinguishable from one call (spec
    /// §7 idempotence).
    pub fn save_run(&mut self, run: &DiagnosticRun, findings: &[DiagnosticFinding]) -> Result<()> {
        let tx = self.conn.transaction()?;

        let metadata_text = serde_json::to_string(&run.metadata)?;
        tx.execute(
            "INSERT INTO runs (run_id, analysis_id, project_id, tree_hash, commit_hash,
                tool_name, tool_version, config_hash, environment_hash, status, created_at,
                duration_ms, findings_digest, raw_input, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                run.run_id.to_string(),
                run.analysis_id.as_str(),
                run.project_id,
                run.tree_hash,
                run.commit_hash,
                run.tool_name,
                run.tool_version,
                run.config_hash,
                run.environment_hash,
                status_str(run.status),
                run.created_at.to_rfc3339(),
                run.duration_ms.map(|d| d as i64),
                run.findings_digest.as_str(),
                run.raw_input,
                metadata_text,
            ],
        )?;

        for finding in findings {
            tx.execute(
                "INSERT OR IGNORE INTO findings (finding_id, analysis_id, rule_id, severity,
                    message, file_path, start_line, start_column, end_line, end_column)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    finding.finding_id.as_str(),
                    finding.analysis_id.as_str(),
                    finding.rule_id,
                    severity_str(finding.severity),
                    finding.message,
                    finding.file_path,
                    finding.start_line,
                    finding.start_column,
                    finding.end_line,
                    finding.end_column,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn list_findings(&self, analysis_id: &AnalysisId) -> Result<Vec<DiagnosticFinding>> {
        let mut stmt = self.conn.prepare(
            "SELECT finding_id, analysis_id, rule_id, severity, message, file_path,
                start_line, start_column, end_line, end_column
             FROM findings WHERE analysis_id = ?1 ORDER BY finding_id ASC",
        )?;
        let rows = stmt.query_map(params![analysis_id.as_str()], row_to_finding)?;
        let mut findings = Vec::new();
        for row in rows {
            findings.push(row?);
        }
        Ok(findings)
    }

    /// Most recent run matching the given filters, newest `created_at` first.
    pub fn get_latest_run(
        &self,
        project_id: &str,
        tool_name: Option<&str>,
        tool_version: Option<&str>,
        tree_hash: Option<&str>,
    ) -> Result<Option<DiagnosticRun>> {
        let mut sql = String::from(
            "SELECT run_id, analysis_id, project_id, tree_hash, commit_hash, tool_name,
                tool_version, config_hash, environment_hash, status, created_at,
                duration_ms, findings_digest, raw_input, metadata
             FROM runs WHERE project_id = ?1",
        );
        let mut bind_strings: Vec<String> = vec![project_id.to_string()];
        if let Some(name) = tool_name {
            sql.push_str(&format!(" AND tool_name = ?{}", bind_strings.len() + 1));
            bind_strings.push(name.to_string());
        }
        if let Some(version) = tool_version {
            sql.push_str(&format!(" AND tool_version = ?{}", bind_strings.len() + 1));
            bind_strings.push(version.to_string());
        }
        if let Some(tree) = tree_hash {
            sql.push_str(&format!(" AND tree_hash = ?{}", bind_strings.len() + 1));
            bind_strings.push(tree.to_string());
        }
        sql.push_str(" ORDER BY created_at DESC, run_id DESC LIMIT 1");

        let params: Vec<&dyn rusqlite::ToSql> =
            bind_strings.iter().map(|s| s as &dyn rusqlite::ToSql).collect();

        self.conn
            .query_row(&sql, params.as_slice(), row_to_run)
            .optional()
            .map_err(Error::from)
    }

    /// Deletes every run and finding belonging to `projectId`, cascading
    /// through `analysisId` so findings with no remaining run are also
    /// removed (spec §4.4 `deleteProject`).
    pub fn delete_project(&mut self, project_id: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        let mut stmt = tx.prepare("SELECT DISTINCT analysis_id FROM runs WHERE project_id = ?1")?;
        let analysis_ids: Vec<String> = stmt
            .query_map(params![project_id], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        tx.execute("DELETE FROM runs WHERE project_id = ?1", params![project_id])?;

        for analysis_id in analysis_ids {
            let still_referenced: i64 = tx.query_row(
                "SELECT count(*) FROM runs WHERE analysis_id = ?1",
                params![analysis_id],
                |row| row.get(0),
            )?;
            if still_referenced == 0 {
                tx.execute(
                    "DELETE FROM findings WHERE analysis_id = ?1",
                    params![analysis_id],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Compares the `FindingId` sets of two analyses (spec §4.4): findings
    /// present only in `b` are introduced, only in `a` are resolved, in both
    /// are unchanged. `diffAnalyses(A, A) == {∅, ∅, listFindings(A)}` and
    /// `diffAnalyses(A, B).introduced == diffAnalyses(B, A).resolved`.
    pub fn diff_analyses(&self, a: &AnalysisId, b: &AnalysisId) -> Result<AnalysisDiff> {
        let findings_a = self.list_findings(a)?;
        let findings_b = self.list_findings(b)?;

        let ids_a: std::collections::BTreeSet<FindingId> =
            findings_a.iter().map(|f| f.finding_id.clone()).collect();
        let ids_b: std::collections::BTreeSet<FindingId> =
            findings_b.iter().map(|f| f.finding_id.clone()).collect();

        Ok(AnalysisDiff {
            introduced: ids_b.difference(&ids_a).cloned().collect(),
            resolved: ids_a.difference(&ids_b).cloned().collect(),
            unchanged: ids_a.intersection(&ids_b).cloned().collect(),
        })
    }
}

fn status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Passed => "passed",
        RunStatus::Failed => "failed",
        RunStatus::Partial => "partial",
    }
}

fn status_from_str(text: &str) -> RunStatus {
    match text {
        "passed" => RunStatus::Passed,
        "failed" => RunStatus::Failed,
        _ => RunStatus::Partial,
    }
}

fn severity_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Note => "note",
        Severity::Info => "info",
    }
}

fn severity_from_str(text: &str) -> Severity {
    match text {
        "error" => Severity::Error,
        "warning" => Severity::Warning,
        "info" => Severity::Info,
        _ => Severity::Note,
    }
}

fn row_to_finding(row: &rusqlite::Row<'_>) -> rusqlite::Result<DiagnosticFinding> {
    let severity_text: String = row.get("severity")?;
    Ok(DiagnosticFinding {
        finding_id: FindingId::from(row.get::<_, String>("finding_id")?),
        analysis_id: AnalysisId::from(row.get::<_, String>("analysis_id")?),
        rule_id: row.get("rule_id")?,
        severity: severity_from_str(&severity_text),
        message: row.get("message")?,
        file_path: row.get("file_path")?,
        start_line: row.get("start_line")?,
        start_column: row.get("start_column")?,
        end_line: row.get("end_line")?,
        end_column: row.get("end_column")?,
    })
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<DiagnosticRun> {
    let status_text: String = row.get("status")?;
    let created_at_text: String = row.get("created_at")?;
    let created_at: DateTime<Utc> = created_at_text
        .parse()
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "created_at".into(), rusqlite::types::Type::Text))?;
    let run_id_text: String = row.get("run_id")?;
    let run_id: RunId = run_id_text
        .parse()
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "run_id".into(), rusqlite::types::Type::Text))?;
    let metadata_text: String = row.get("metadata")?;
    let metadata = serde_json::from_str(&metadata_text).unwrap_or_default();
    let duration_ms: Option<i64> = row.get("duration_ms")?;

    Ok(DiagnosticRun {
        run_id,
        analysis_id: AnalysisId::from(row.get::<_, String>("analysis_id")?),
        project_id: row.get("project_id")?,
        tree_hash: row.get("tree_hash")?,
        commit_hash: row.get("commit_hash")?,
        tool_name: row.get("tool_name")?,
        tool_version: row.get("tool_version")?,
        config_hash: row.get("config_hash")?,
        environment_hash: row.get("environment_hash")?,
        status: status_from_str(&status_text),
        created_at,
        duration_ms: duration_ms.map(|d| d as u64),
        findings_digest: FindingsDigest::from(row.get::<_, String>("findings_digest")?),
        raw_input: row.get("raw_input")?,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_finding(analysis_id: &AnalysisId, rule_id: &str, file_path: &str) -> DiagnosticFinding {
        DiagnosticFinding {
            finding_id: FindingId::from(format!("{}-{}-{}", analysis_id.as_str(), rule_id, file_path)),
            analysis_id: analysis_id.clone(),
            rule_id: rule_id.to_string(),
            severity: Severity::Error,
            message: "oops".to_string(),
            file_path: file_path.to_string(),
            start_line: 1,
            start_column: None,
            end_line: None,
            end_column: None,
        }
    }

    fn sample_run(analysis_id: &AnalysisId, project_id: &str, findings_digest: &str) -> DiagnosticRun {
        DiagnosticRun {
            run_id: RunId::new(),
            analysis_id: analysis_id.clone(),
            project_id: project_id.to_string(),
            tree_hash: "t1".to_string(),
            commit_hash: None,
            tool_name: "tsc".to_string(),
            tool_version: "5.3.3".to_string(),
            config_hash: "c1".to_string(),
            environment_hash: None,
            status: RunStatus::Failed,
            created_at: Utc::now(),
            duration_ms: Some(42),
            findings_digest: FindingsDigest::from(findings_digest.to_string()),
            raw_input: None,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn save_run_is_idempotent_on_findings() {
        let mut store = DiagnosticsStore::open_in_memory().unwrap();
        let analysis_id = AnalysisId::from("a1".to_string());
        let finding = sample_finding(&analysis_id, "TS2304", "src/index.ts");
        let run = sample_run(&analysis_id, "p1", "d1");

        store.save_run(&run, &[finding.clone()]).unwrap();
        let again = sample_run(&analysis_id, "p1", "d1");
        store.save_run(&again, &[finding]).unwrap();

        assert_eq!(store.list_findings(&analysis_id).unwrap().len(), 1);
    }

    #[test]
    fn get_latest_run_respects_filters_and_recency() {
        let mut store = DiagnosticsStore::open_in_memory().unwrap();
        let a1 = AnalysisId::from("a1".to_string());
        let a2 = AnalysisId::from("a2".to_string());
        store.save_run(&sample_run(&a1, "p1", "d1"), &[]).unwrap();
        store.save_run(&sample_run(&a2, "p1", "d2"), &[]).unwrap();

        let latest = store
            .get_latest_run("p1", Some("tsc"), None, None)
            .unwrap()
            .unwrap();
        assert_eq!(latest.analysis_id.as_str(), "a2");

        assert!(store
            .get_latest_run("p1", Some("eslint"), None, None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn diff_analyses_is_reflexive_and_symmetric() {
        let mut store = DiagnosticsStore::open_in_memory().unwrap();
        let a = AnalysisId::from("a".to_string());
        let b = AnalysisId::from("b".to_string());

        let shared = sample_finding(&a, "TS2304", "src/a.ts");
        let only_a = sample_finding(&a, "TS2345", "src/b.ts");
        let only_b = sample_finding(&b, "TS9999", "src/c.ts");
        let shared_b = sample_finding(&b, "TS2304", "src/a.ts");

        store
            .save_run(&sample_run(&a, "p1", "d1"), &[shared.clone(), only_a.clone()])
            .unwrap();
        store
            .save_run(&sample_run(&b, "p1", "d2"), &[shared_b, only_b])
            .unwrap();

        let diff_ab = store.diff_analyses(&a, &b).unwrap();
        assert_eq!(diff_ab.resolved, vec![only_a.finding_id.clone()]);

        let diff_aa = store.diff_analyses(&a, &a).unwrap();
        assert!(diff_aa.introduced.is_empty());
        assert!(diff_aa.resolved.is_empty());
        assert_eq!(diff_aa.unchanged.len(), 2);
    }

    #[test]
    fn delete_project_cascades_findings_with_no_remaining_run() {
        let mut store = DiagnosticsStore::open_in_memory().unwrap();
        let analysis_id = AnalysisId::from("a1".to_string());
        let finding = sample_finding(&analysis_id, "TS2304", "src/index.ts");
        store
            .save_run(&sample_run(&analysis_id, "p1", "d1"), &[finding])
            .unwrap();

        store.delete_project("p1").unwrap();

        assert!(store.list_findings(&analysis_id).unwrap().is_empty());
        assert!(store
            .get_latest_run("p1", None, None, None)
            .unwrap()
            .is_none());
    }
}
