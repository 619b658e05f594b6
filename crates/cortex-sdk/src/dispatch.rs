//! Tool / RPC surface (spec §6.1): typed request shapes plus one
//! `dispatch` entry point mapping a tool name to its handler. This is the
//! only place that knows about every subsystem at once — Hybrid Search
//! orchestration and the diagnostics-ingest finding ordering both live
//! here rather than in their owning crates, since both need more than one
//! store's output to do their job.

use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use cortex_diagnostics::{normalize, sarif};
use cortex_search::{hybrid, Bm25Index, Candidate, EnabledModes, RawModeScores};
use cortex_store::StartSessionOptions;
use cortex_types::domain::{
    DiagnosticFinding, DiagnosticRun, Priority, RecallQuery, RunStatus, SaveOptions, SortOrder,
};
use cortex_types::{EntityId, MemoryId, SessionId};

use crate::error::{Error, Result};
use crate::service::CortexService;

fn parse_id<T: FromStr>(field: &'static str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::InvalidArgument(format!("malformed {field}: {raw}")))
}

fn require_session(raw: &str) -> Result<SessionId> {
    parse_id("sessionId", raw)
}

/// Wire-level priority. A tiny string enum rather than re-exporting
/// [`cortex_types::domain::Priority`] so the request DTOs stay
/// self-contained for `schemars::JsonSchema` derivation.
#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub(crate) enum PriorityWire {
    High,
    Normal,
    Low,
}

impl From<PriorityWire> for Priority {
    fn from(value: PriorityWire) -> Self {
        match value {
            PriorityWire::High => Priority::High,
            PriorityWire::Normal => Priority::Normal,
            PriorityWire::Low => Priority::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SortOrderWire {
    CreatedAsc,
    CreatedDesc,
    UpdatedAsc,
    UpdatedDesc,
}

impl From<SortOrderWire> for SortOrder {
    fn from(value: SortOrderWire) -> Self {
        match value {
            SortOrderWire::CreatedAsc => SortOrder::CreatedAsc,
            SortOrderWire::CreatedDesc => SortOrder::CreatedDesc,
            SortOrderWire::UpdatedAsc => SortOrder::UpdatedAsc,
            SortOrderWire::UpdatedDesc => SortOrder::UpdatedDesc,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, JsonSchema)]
pub(crate) struct HybridWeightsWire {
    semantic: f64,
    keyword: f64,
    graph: f64,
}

impl From<HybridWeightsWire> for cortex_types::config::HybridWeights {
    fn from(value: HybridWeightsWire) -> Self {
        Self {
            semantic: value.semantic,
            keyword: value.keyword,
            graph: value.graph,
        }
    }
}

/// Dispatches one tool call by name. `params` is whatever the transport
/// handed over as the call's JSON arguments.
pub fn dispatch(service: &CortexService, tool: &str, params: Value) -> Result<Value> {
    tracing::debug!(tool, "dispatching tool call");
    match tool {
        "ping" => Ok(json!("pong")),
        "context_session_start" => session_start(service, params),
        "context_session_end" => session_end(service, params),
        "context_save" => context_save(service, params),
        "context_get" => context_get(service, params),
        "context_search" => context_search(service, params),
        "context_delete" => context_delete(service, params),
        "context_checkpoint" => context_checkpoint(service, params),
        "context_hybrid_search" => context_hybrid_search(service, params),
        "context_get_lineage" => context_get_lineage(service, params),
        "context_query_evolution" => context_query_evolution(service, params),
        "diagnostics_ingest" => diagnostics_ingest(service, params),
        "diagnostics_diff" => diagnostics_diff(service, params),
        "diagnostics_latest" => diagnostics_latest(service, params),
        "diagnostics_findings" => diagnostics_findings(service, params),
        other => Err(Error::UnknownTool(other.to_string())),
    }
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(Error::InvalidParams)
}

// ---- context_session_start / end -----------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionStartRequest {
    name: Option<String>,
    project_dir: Option<String>,
    continue_from: Option<String>,
    default_channel: Option<String>,
}

fn session_start(service: &CortexService, params: Value) -> Result<Value> {
    let req: SessionStartRequest = parse_params(params)?;
    let continue_from = req
        .continue_from
        .as_deref()
        .map(|s| require_session(s))
        .transpose()?;
    let session = service.start_session(StartSessionOptions {
        name: req.name,
        project_dir: req.project_dir,
        continue_from,
        default_channel: req.default_channel,
    })?;
    Ok(serde_json::to_value(session).expect("Session always serializes"))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionEndRequest {
    session_id: String,
}

fn session_end(service: &CortexService, params: Value) -> Result<Value> {
    let req: SessionEndRequest = parse_params(params)?;
    let session_id = require_session(&req.session_id)?;
    service.end_session(&session_id)?;
    Ok(json!({ "message": "session ended" }))
}

// ---- context_save ----------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContextSaveRequest {
    session_id: String,
    key: String,
    value: String,
    category: Option<String>,
    priority: Option<PriorityWire>,
    channel: Option<String>,
    metadata: Option<cortex_types::domain::Metadata>,
    extract_entities: Option<bool>,
}

fn context_save(service: &CortexService, params: Value) -> Result<Value> {
    let req: ContextSaveRequest = parse_params(params)?;
    let session_id = require_session(&req.session_id)?;

    let opts = SaveOptions {
        category: req.category,
        priority: req.priority.map(Into::into),
        privacy: None,
        channel: req.channel,
        metadata: req.metadata,
        embedding: None,
    };
    let memory = service.save_memory(session_id, &req.key, &req.value, opts)?;

    let entity_ids = if req.extract_entities.unwrap_or(false) {
        let ids = service.extract_and_link(&req.value, None)?;
        Some(ids.iter().map(ToString::to_string).collect::<Vec<_>>())
    } else {
        None
    };

    service.bm25_index(&memory.id.to_string(), &memory.value);

    Ok(json!({
        "success": true,
        "memoryId": memory.id.to_string(),
        "key": memory.key,
        "entityIds": entity_ids,
    }))
}

// ---- context_get -----------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContextGetRequest {
    session_id: String,
    key: Option<String>,
    #[serde(default)]
    query: Option<RecallQueryRequest>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RecallQueryRequest {
    key_pattern: Option<String>,
    category: Option<String>,
    channel: Option<String>,
    priority: Option<PriorityWire>,
    sort: Option<SortOrderWire>,
    offset: Option<usize>,
    limit: Option<usize>,
}

impl RecallQueryRequest {
    fn into_query(self, session_id: SessionId) -> RecallQuery {
        RecallQuery {
            key: None,
            key_pattern: self.key_pattern,
            category: self.category,
            channel: self.channel,
            priority: self.priority.map(Into::into),
            session_id: Some(session_id),
            sort: self.sort.map(Into::into),
            offset: self.offset,
            limit: self.limit,
        }
    }
}

fn context_get(service: &CortexService, params: Value) -> Result<Value> {
    let req: ContextGetRequest = parse_params(params)?;
    let session_id = require_session(&req.session_id)?;

    if let Some(key) = req.key {
        let memory = service.get_memory(session_id, &key)?;
        return Ok(serde_json::to_value(memory).expect("Option<Memory> always serializes"));
    }

    let query = req
        .query
        .map(|q| q.into_query(session_id))
        .unwrap_or(RecallQuery {
            session_id: Some(session_id),
            ..Default::default()
        });
    let memories = service.recall(session_id, query)?;
    Ok(serde_json::to_value(memories).expect("Vec<Memory> always serializes"))
}

// ---- context_search ---------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContextSearchRequest {
    session_id: String,
    query: Option<String>,
    key_pattern: Option<String>,
    category: Option<String>,
    channel: Option<String>,
    priority: Option<PriorityWire>,
    sort: Option<SortOrderWire>,
    offset: Option<usize>,
    limit: Option<usize>,
}

fn context_search(service: &CortexService, params: Value) -> Result<Value> {
    let req: ContextSearchRequest = parse_params(params)?;
    let session_id = require_session(&req.session_id)?;

    let key_pattern = req.query.or(req.key_pattern);
    let recall_query = RecallQuery {
        key: None,
        key_pattern,
        category: req.category,
        channel: req.channel,
        priority: req.priority.map(Into::into),
        session_id: Some(session_id),
        sort: req.sort.map(Into::into),
        offset: req.offset,
        limit: req.limit,
    };
    let memories = service.recall(session_id, recall_query)?;
    Ok(serde_json::to_value(memories).expect("Vec<Memory> always serializes"))
}

// ---- context_delete ---------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContextDeleteRequest {
    session_id: String,
    key: String,
}

fn context_delete(service: &CortexService, params: Value) -> Result<Value> {
    let req: ContextDeleteRequest = parse_params(params)?;
    let session_id = require_session(&req.session_id)?;
    let deleted = service.delete_memory(session_id, &req.key)?;
    Ok(json!({ "message": if deleted { "deleted" } else { "not found" } }))
}

// ---- context_checkpoint -----------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContextCheckpointRequest {
    session_id: String,
    description: Option<String>,
}

fn context_checkpoint(service: &CortexService, params: Value) -> Result<Value> {
    let req: ContextCheckpointRequest = parse_params(params)?;
    let session_id = require_session(&req.session_id)?;
    service.checkpoint(session_id, req.description)?;
    Ok(json!({ "message": "checkpoint created" }))
}

// ---- context_hybrid_search --------------------------------------------------

/// Graph proximity's hop cap (spec §4.9 "capped at a configurable max
/// hops, default 2"). Not one of spec §6.4's enumerated `Configuration`
/// fields, so it stays a local constant rather than an unlisted config key.
const DEFAULT_MAX_GRAPH_HOPS: u32 = 2;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HybridSearchRequest {
    session_id: Option<String>,
    query: String,
    limit: Option<usize>,
    weights: Option<HybridWeightsWire>,
}

/// Fans out to every enabled mode, builds one raw-score candidate per
/// memory visible to the session (or every session when `sessionId` is
/// omitted, spec §4.9 Options), then hands the fused ranking back with
/// the shape named in spec §4.9 (`{memoryId, content, similarity,
/// hybridScore, searchModes[], modeScores{...}, graphContext?}`).
fn context_hybrid_search(service: &CortexService, params: Value) -> Result<Value> {
    let req: HybridSearchRequest = parse_params(params)?;
    let session_id = req.session_id.as_deref().map(|s| require_session(s)).transpose()?;
    let limit = req.limit.unwrap_or(10);

    let candidates_memories = match session_id {
        Some(session_id) => service.recall(
            session_id,
            RecallQuery {
                session_id: Some(session_id),
                limit: Some(usize::MAX / 2),
                ..Default::default()
            },
        )?,
        None => {
            let mut all = Vec::new();
            for session in service.list_sessions(&cortex_types::domain::SessionFilter::default())? {
                all.extend(service.recall(
                    session.id,
                    RecallQuery {
                        limit: Some(usize::MAX / 2),
                        ..Default::default()
                    },
                )?);
            }
            all
        }
    };

    let keyword_hits: std::collections::HashMap<MemoryId, f64> = {
        let bm25 = service.bm25().lock().unwrap();
        bm25_scores(&bm25, &req.query)
    };

    let semantic_hits: std::collections::HashMap<MemoryId, f64> =
        match (service.embedding_provider(), service.vector_index()) {
            (Some(provider), Some(index)) => {
                let query_embedding = provider.embed(&req.query)?;
                let index = index.lock().unwrap();
                index
                    .search(
                        &query_embedding,
                        &cortex_search::VectorSearchOptions {
                            limit: candidates_memories.len().max(1),
                            threshold: None,
                            session_id,
                            category: None,
                        },
                    )?
                    .into_iter()
                    .map(|hit| (hit.id, f64::from(hit.similarity)))
                    .collect()
            }
            _ => std::collections::HashMap::new(),
        };

    // Graph proximity (spec §4.9): resolve the query's mentioned entities
    // via the Entity Extractor (read-only — never creates graph entities,
    // see `CortexService::resolve_known_entities`), BFS outward from them
    // over every relationship type up to `DEFAULT_MAX_GRAPH_HOPS`, then
    // score each candidate by the nearest of its own extracted entities.
    let query_entity_ids = service.resolve_known_entities(&req.query)?;
    let hop_info = graph_hop_info(service, &query_entity_ids, DEFAULT_MAX_GRAPH_HOPS)?;

    let mut candidate_entities: std::collections::HashMap<MemoryId, Vec<EntityId>> =
        std::collections::HashMap::new();
    if !hop_info.is_empty() {
        for memory in &candidates_memories {
            candidate_entities.insert(memory.id, service.resolve_known_entities(&memory.value)?);
        }
    }

    let enabled = EnabledModes {
        semantic: !semantic_hits.is_empty(),
        keyword: !keyword_hits.is_empty(),
        graph: !hop_info.is_empty(),
    };

    let mut candidates = Vec::with_capacity(candidates_memories.len());
    for memory in &candidates_memories {
        let keyword = keyword_hits.get(&memory.id).copied().unwrap_or(0.0);
        let semantic = semantic_hits.get(&memory.id).copied().unwrap_or(0.0);
        let graph = candidate_entities
            .get(&memory.id)
            .and_then(|ids| nearest_hop(&hop_info, ids))
            .map_or(0.0, |(distance, _)| 1.0 / (1.0 + f64::from(distance)));
        candidates.push(Candidate {
            id: memory.id,
            raw: RawModeScores { semantic, keyword, graph },
        });
    }

    let weights: cortex_types::config::HybridWeights = req.weights.unwrap_or_default().into();
    let weights = hybrid::redistribute_weights(weights, enabled);
    let fused = hybrid::fuse(candidates, weights, enabled);

    let by_id: std::collections::HashMap<_, _> =
        candidates_memories.into_iter().map(|m| (m.id, m)).collect();

    let results: Vec<Value> = fused
        .into_iter()
        .take(limit)
        .filter_map(|result| {
            let memory = by_id.get(&result.id)?;
            let graph_context = candidate_entities
                .get(&result.id)
                .and_then(|ids| nearest_hop(&hop_info, ids))
                .map(|(distance, relationship_types)| {
                    json!({
                        "relatedEntityIds": candidate_entities[&result.id]
                            .iter()
                            .map(EntityId::to_string)
                            .collect::<Vec<_>>(),
                        "relationshipTypes": relationship_types,
                        "hopDistance": distance,
                    })
                });
            Some(json!({
                "memoryId": memory.id.to_string(),
                "content": memory.value,
                "similarity": result.mode_scores.semantic,
                "hybridScore": result.hybrid_score,
                "searchModes": result.search_modes,
                "modeScores": {
                    "semantic": result.mode_scores.semantic,
                    "keyword": result.mode_scores.keyword,
                    "graph": result.mode_scores.graph,
                },
                "graphContext": graph_context,
            }))
        })
        .collect();

    Ok(Value::Array(results))
}

/// One BFS node: the hop distance from the nearest query entity, and the
/// relationship-type path (root to this node) that first reached it.
struct GraphHop {
    distance: u32,
    relationship_types: Vec<&'static str>,
}

/// BFS over `GraphManager::find_relationships_by_entity` (any relationship
/// type, either direction) from `sources`, capped at `max_hops` (spec §4.9:
/// "capped at a configurable max hops"). Entities in `sources` themselves
/// get distance `0`.
fn graph_hop_info(
    service: &CortexService,
    sources: &[EntityId],
    max_hops: u32,
) -> Result<std::collections::HashMap<EntityId, GraphHop>> {
    let mut info: std::collections::HashMap<EntityId, GraphHop> = std::collections::HashMap::new();
    let mut frontier = Vec::new();
    for &id in sources {
        if info
            .insert(id, GraphHop { distance: 0, relationship_types: Vec::new() })
            .is_none()
        {
            frontier.push(id);
        }
    }

    for hop in 1..=max_hops {
        let mut next = Vec::new();
        for id in &frontier {
            let parent_types = info[id].relationship_types.clone();
            for rel in service.graph().find_relationships_by_entity(id)? {
                let neighbor = if rel.source_id == *id { rel.target_id } else { rel.source_id };
                if !info.contains_key(&neighbor) {
                    let mut relationship_types = parent_types.clone();
                    relationship_types.push(cortex_graph::queries::relationship::relationship_type_str(
                        rel.relationship_type,
                    ));
                    info.insert(neighbor, GraphHop { distance: hop, relationship_types });
                    next.push(neighbor);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    Ok(info)
}

/// The minimum-hop entry among `candidate_entities`, if any are reachable
/// within the BFS cap.
fn nearest_hop<'a>(
    hop_info: &'a std::collections::HashMap<EntityId, GraphHop>,
    candidate_entities: &[EntityId],
) -> Option<(u32, &'a [&'static str])> {
    candidate_entities
        .iter()
        .filter_map(|id| hop_info.get(id))
        .min_by_key(|hop| hop.distance)
        .map(|hop| (hop.distance, hop.relationship_types.as_slice()))
}

fn bm25_scores(index: &Bm25Index, query: &str) -> std::collections::HashMap<MemoryId, f64> {
    index
        .search(query, index.doc_count().max(1))
        .into_iter()
        .filter_map(|(doc_id, score)| {
            let id: MemoryId = doc_id.parse().ok()?;
            Some((id, score))
        })
        .collect()
}

// ---- context_get_lineage ----------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) enum LineageDirection {
    Upstream,
    Downstream,
    Both,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LineageRequest {
    entity_id: String,
    direction: LineageDirection,
    max_depth: Option<u32>,
}

fn context_get_lineage(service: &CortexService, params: Value) -> Result<Value> {
    let req: LineageRequest = parse_params(params)?;
    let entity_id: EntityId = parse_id("entityId", &req.entity_id)?;
    let max_depth = req.max_depth.unwrap_or(10);

    let upstream = match req.direction {
        LineageDirection::Upstream | LineageDirection::Both => {
            service.lineage().get_ancestors(&entity_id, max_depth)?
        }
        LineageDirection::Downstream => Vec::new(),
    };
    let downstream = match req.direction {
        LineageDirection::Downstream | LineageDirection::Both => {
            service.lineage().get_descendants(&entity_id, max_depth)?
        }
        LineageDirection::Upstream => Vec::new(),
    };

    Ok(json!({
        "entityId": entity_id.to_string(),
        "direction": req.direction,
        "upstreamCount": upstream.len(),
        "downstreamCount": downstream.len(),
        "upstream": upstream,
        "downstream": downstream,
    }))
}

// ---- context_query_evolution -------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EvolutionRequest {
    entity_id: String,
    start_time: Option<String>,
    end_time: Option<String>,
}

fn parse_rfc3339(field: &'static str, raw: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|_| Error::InvalidArgument(format!("malformed {field}: {raw}")))
}

fn context_query_evolution(service: &CortexService, params: Value) -> Result<Value> {
    let req: EvolutionRequest = parse_params(params)?;
    let entity_id: EntityId = parse_id("entityId", &req.entity_id)?;
    let start_time = req.start_time.as_deref().map(|s| parse_rfc3339("startTime", s)).transpose()?;
    let end_time = req.end_time.as_deref().map(|s| parse_rfc3339("endTime", s)).transpose()?;

    let query = cortex_graph::EvolutionQuery {
        start_time,
        end_time,
        change_types: None,
        include_related: false,
    };
    let timeline = service.evolution().get_evolution(&entity_id, &query)?;
    Ok(json!({
        "entityId": timeline.entity_id.to_string(),
        "changes": timeline.changes.iter().map(|c| json!({
            "entityId": c.entity_id.to_string(),
            "changeType": c.change_type,
            "timestamp": c.timestamp,
            "state": c.state,
            "previousState": c.previous_state,
        })).collect::<Vec<_>>(),
    }))
}

// ---- diagnostics_ingest -------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DiagnosticsIngestRequest {
    project_id: String,
    tree_hash: String,
    config_hash: String,
    commit_hash: Option<String>,
    environment_hash: Option<String>,
    tool_name: Option<String>,
    tool_version: Option<String>,
    sarif: Option<Value>,
    findings: Option<Vec<FindingWire>>,
    duration_ms: Option<u64>,
}

/// The raw-findings alternative to a `sarif` blob named in spec §6.1
/// (`sarif?|findings[]`) — same fields as `RawFinding`, just given a wire
/// `Deserialize` shape of its own since findings arrive pre-parsed here
/// rather than via `parse_sarif`.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FindingWire {
    rule_id: String,
    level: Option<String>,
    message: String,
    file_path: String,
    start_line: u32,
    start_column: Option<u32>,
    end_line: Option<u32>,
    end_column: Option<u32>,
}

impl From<FindingWire> for sarif::RawFinding {
    fn from(f: FindingWire) -> Self {
        sarif::RawFinding {
            rule_id: f.rule_id,
            level: f.level,
            message: f.message,
            file_path: f.file_path,
            start_line: f.start_line,
            start_column: f.start_column,
            end_line: f.end_line,
            end_column: f.end_column,
        }
    }
}

/// Parses either the `sarif` blob or a raw `findings[]` array (spec §6.1),
/// normalizes every finding, computes the `AnalysisId` from the normalized
/// content, derives each `FindingId` from that id, stable-sorts by
/// `(filePath, startLine, startColumn, ruleId, findingId)`, and saves the
/// run atomically. Raw `findings[]` requires an explicit `toolName`/
/// `toolVersion` — there is no SARIF `tool.driver` to default from.
fn diagnostics_ingest(service: &CortexService, params: Value) -> Result<Value> {
    let req: DiagnosticsIngestRequest = parse_params(params)?;

    let (raw_findings, tool_name, tool_version, raw_input) = if let Some(sarif_value) = req.sarif {
        let parsed = sarif::parse_sarif(&sarif_value)?;
        let tool_name = req.tool_name.unwrap_or(parsed.tool_name);
        let tool_version = req.tool_version.unwrap_or(parsed.tool_version);
        (parsed.findings, tool_name, tool_version, Some(sarif_value.to_string()))
    } else if let Some(findings) = req.findings {
        let tool_name = req.tool_name.ok_or_else(|| {
            Error::InvalidArgument("diagnostics_ingest with findings[] requires toolName".into())
        })?;
        let tool_version = req.tool_version.ok_or_else(|| {
            Error::InvalidArgument("diagnostics_ingest with findings[] requires toolVersion".into())
        })?;
        let raw: Vec<sarif::RawFinding> = findings.into_iter().map(Into::into).collect();
        (raw, tool_name, tool_version, None)
    } else {
        return Err(Error::InvalidArgument(
            "diagnostics_ingest requires either a sarif payload or a findings[] array".into(),
        ));
    };

    let normalized: Vec<_> = raw_findings.iter().map(normalize::normalize_one).collect();
    let analysis_id = normalize::compute_analysis_id(
        &req.project_id,
        &req.tree_hash,
        &tool_name,
        &tool_version,
        &req.config_hash,
        &normalized,
    )?;

    let mut findings: Vec<DiagnosticFinding> = normalized
        .iter()
        .map(|content| {
            let finding_id = normalize::compute_finding_id(&analysis_id, content)?;
            Ok(DiagnosticFinding {
                finding_id,
                analysis_id: analysis_id.clone(),
                rule_id: content.rule_id.clone(),
                severity: content.severity,
                message: content.message.clone(),
                file_path: content.file_path.clone(),
                start_line: content.start_line,
                start_column: content.start_column,
                end_line: content.end_line,
                end_column: content.end_column,
            })
        })
        .collect::<cortex_diagnostics::Result<_>>()
        .map_err(Error::from)?;

    findings.sort_by(|a, b| {
        (&a.file_path, a.start_line, a.start_column, &a.rule_id, &a.finding_id).cmp(&(
            &b.file_path,
            b.start_line,
            b.start_column,
            &b.rule_id,
            &b.finding_id,
        ))
    });

    let findings_digest =
        normalize::compute_findings_digest(&findings.iter().map(|f| f.finding_id.clone()).collect::<Vec<_>>());

    let run = DiagnosticRun {
        run_id: cortex_types::RunId::new(),
        analysis_id: analysis_id.clone(),
        project_id: req.project_id,
        tree_hash: req.tree_hash,
        commit_hash: req.commit_hash,
        tool_name,
        tool_version,
        config_hash: req.config_hash,
        environment_hash: req.environment_hash,
        status: RunStatus::Passed,
        created_at: chrono::Utc::now(),
        duration_ms: req.duration_ms,
        findings_digest,
        raw_input,
        metadata: Default::default(),
    };

    let findings_count = findings.len();
    service
        .diagnostics()
        .lock()
        .unwrap()
        .save_run(&run, &findings)?;
    tracing::info!(run_id = %run.run_id, analysis_id = %analysis_id, findings_count, "ingested diagnostics run");

    Ok(json!({
        "success": true,
        "runId": run.run_id.to_string(),
        "analysisId": analysis_id.to_string(),
        "findingsCount": findings_count,
    }))
}

// ---- diagnostics_diff ----------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DiagnosticsDiffRequest {
    analysis_id_a: String,
    analysis_id_b: String,
}

fn diagnostics_diff(service: &CortexService, params: Value) -> Result<Value> {
    let req: DiagnosticsDiffRequest = parse_params(params)?;
    let a = cortex_types::AnalysisId::from(req.analysis_id_a);
    let b = cortex_types::AnalysisId::from(req.analysis_id_b);
    let diff = service.diagnostics().lock().unwrap().diff_analyses(&a, &b)?;
    Ok(serde_json::to_value(diff).expect("AnalysisDiff always serializes"))
}

// ---- diagnostics_latest ---------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DiagnosticsLatestRequest {
    project_id: String,
    tool_name: Option<String>,
    tool_version: Option<String>,
    tree_hash: Option<String>,
}

fn diagnostics_latest(service: &CortexService, params: Value) -> Result<Value> {
    let req: DiagnosticsLatestRequest = parse_params(params)?;
    let run = service.diagnostics().lock().unwrap().get_latest_run(
        &req.project_id,
        req.tool_name.as_deref(),
        req.tool_version.as_deref(),
        req.tree_hash.as_deref(),
    )?;
    match run {
        Some(run) => Ok(serde_json::to_value(run).expect("DiagnosticRun always serializes")),
        None => Ok(json!({ "found": false })),
    }
}

// ---- diagnostics_findings -------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DiagnosticsFindingsRequest {
    analysis_id: String,
}

fn diagnostics_findings(service: &CortexService, params: Value) -> Result<Value> {
    let req: DiagnosticsFindingsRequest = parse_params(params)?;
    let analysis_id = cortex_types::AnalysisId::from(req.analysis_id);
    let findings = service.diagnostics().lock().unwrap().list_findings(&analysis_id)?;
    Ok(serde_json::to_value(findings).expect("Vec<DiagnosticFinding> always serializes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> CortexService {
        CortexService::open_in_memory().unwrap()
    }

    #[test]
    fn ping_returns_pong() {
        assert_eq!(dispatch(&service(), "ping", Value::Null).unwrap(), json!("pong"));
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let err = dispatch(&service(), "nonexistent", Value::Null).unwrap_err();
        assert_eq!(err.kind(), cortex_types::Kind::InvalidArgument);
    }

    #[test]
    fn session_lifecycle_round_trips_through_dispatch() {
        let svc = service();
        let started = dispatch(&svc, "context_session_start", json!({})).unwrap();
        let session_id = started["id"].as_str().unwrap().to_string();

        let saved = dispatch(
            &svc,
            "context_save",
            json!({ "sessionId": session_id, "key": "k", "value": "v" }),
        )
        .unwrap();
        assert_eq!(saved["success"], json!(true));

        let fetched = dispatch(
            &svc,
            "context_get",
            json!({ "sessionId": session_id, "key": "k" }),
        )
        .unwrap();
        assert_eq!(fetched["value"], json!("v"));

        let ended = dispatch(
            &svc,
            "context_session_end",
            json!({ "sessionId": session_id }),
        )
        .unwrap();
        assert_eq!(ended["message"], json!("session ended"));
    }

    #[test]
    fn diagnostics_ingest_is_idempotent_on_findings_count() {
        let svc = service();
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
                            "region": {"startLine": 10, "startColumn": 5}
                        }
                    }]
                }]
            }]
        });
        let req = json!({
            "projectId": "p1",
            "treeHash": "t1",
            "configHash": "c1",
            "sarif": sarif,
        });
        let first = dispatch(&svc, "diagnostics_ingest", req.clone()).unwrap();
        let second = dispatch(&svc, "diagnostics_ingest", req).unwrap();
        assert_eq!(first["analysisId"], second["analysisId"]);
        assert_eq!(first["findingsCount"], json!(1));
        assert_eq!(second["findingsCount"], json!(1));
    }

    #[test]
    fn diagnostics_ingest_accepts_raw_findings_without_sarif() {
        let svc = service();
        let req = json!({
            "projectId": "p1",
            "treeHash": "t1",
            "configHash": "c1",
            "toolName": "eslint",
            "toolVersion": "8.0.0",
            "findings": [{
                "ruleId": "no-unused-vars",
                "level": "warning",
                "message": "'x' is defined but never used.",
                "filePath": "src/index.ts",
                "startLine": 3,
                "startColumn": 7,
            }],
        });
        let result = dispatch(&svc, "diagnostics_ingest", req).unwrap();
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["findingsCount"], json!(1));

        let findings = dispatch(
            &svc,
            "diagnostics_findings",
            json!({ "analysisId": result["analysisId"] }),
        )
        .unwrap();
        assert_eq!(findings.as_array().unwrap().len(), 1);
    }

    #[test]
    fn diagnostics_ingest_without_sarif_or_findings_is_invalid() {
        let svc = service();
        let req = json!({
            "projectId": "p1",
            "treeHash": "t1",
            "configHash": "c1",
        });
        assert!(dispatch(&svc, "diagnostics_ingest", req).is_err());
    }

    #[test]
    fn hybrid_search_reports_graph_proximity_for_a_shared_entity() {
        let svc = service();
        let started = dispatch(&svc, "context_session_start", json!({})).unwrap();
        let session_id = started["id"].as_str().unwrap().to_string();

        dispatch(
            &svc,
            "context_save",
            json!({
                "sessionId": session_id,
                "key": "k1",
                "value": "fn parse_sarif() normalizes diagnostics.",
                "extractEntities": true,
            }),
        )
        .unwrap();

        let results = dispatch(
            &svc,
            "context_hybrid_search",
            json!({ "sessionId": session_id, "query": "fn parse_sarif() changed recently" }),
        )
        .unwrap();
        let results = results.as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0]["searchModes"]
            .as_array()
            .unwrap()
            .iter()
            .any(|m| m == "graph"));
        assert_eq!(results[0]["graphContext"]["hopDistance"], json!(0));
    }

    #[test]
    fn hybrid_search_without_session_id_searches_every_session() {
        let svc = service();
        let a = dispatch(&svc, "context_session_start", json!({})).unwrap();
        let a_id = a["id"].as_str().unwrap().to_string();
        let b = dispatch(&svc, "context_session_start", json!({})).unwrap();
        let b_id = b["id"].as_str().unwrap().to_string();

        dispatch(
            &svc,
            "context_save",
            json!({ "sessionId": a_id, "key": "k", "value": "hello from session a" }),
        )
        .unwrap();
        dispatch(
            &svc,
            "context_save",
            json!({ "sessionId": b_id, "key": "k", "value": "hello from session b" }),
        )
        .unwrap();

        let results = dispatch(&svc, "context_hybrid_search", json!({ "query": "hello" })).unwrap();
        assert_eq!(results.as_array().unwrap().len(), 2);
    }

    #[test]
    fn evolution_change_type_serializes_to_spec_wire_values() {
        assert_eq!(
            serde_json::to_value(cortex_graph::ChangeType::RelatedChanged).unwrap(),
            json!("related_changed")
        );
        assert_eq!(
            serde_json::to_value(cortex_graph::ChangeType::Created).unwrap(),
            json!("created")
        );
        assert_eq!(
            serde_json::to_value(cortex_graph::ChangeType::Updated).unwrap(),
            json!("updated")
        );
        assert_eq!(
            serde_json::to_value(cortex_graph::ChangeType::Deleted).unwrap(),
            json!("deleted")
        );
    }
}
