use std::io::{BufRead, BufReader, Write};

use schemars::schema_for;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::dispatch::{self, ContextCheckpointRequest, ContextDeleteRequest, ContextGetRequest,
    ContextSaveRequest, ContextSearchRequest, DiagnosticsDiffRequest, DiagnosticsFindingsRequest,
    DiagnosticsIngestRequest, DiagnosticsLatestRequest, EvolutionRequest, HybridSearchRequest,
    LineageRequest, SessionEndRequest, SessionStartRequest};
use crate::service::CortexService;

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl JsonRpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: Some(result), error: None }
    }

    fn err(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError { code, message: message.into(), data: None }),
        }
    }
}

struct ToolSpec {
    name: &'static str,
    description: &'static str,
    schema: Value,
}

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn tool_specs() -> Vec<ToolSpec> {
    macro_rules! spec {
        ($name:literal, $description:literal, $ty:ty) => {{
            let schema = schema_for!($ty);
            ToolSpec {
                name: $name,
                description: $description,
                schema: serde_json::to_value(&schema).unwrap(),
            }
        }};
    }

    vec![
        ToolSpec { name: "ping", description: "Liveness check; echoes back \"pong\".", schema: empty_object_schema() },
        spec!("context_session_start", "Start a new agent session.", SessionStartRequest),
        spec!("context_session_end", "End a session, marking it ended or abandoned.", SessionEndRequest),
        spec!("context_save", "Save a memory into a session.", ContextSaveRequest),
        spec!("context_get", "Recall memories from a session by filter.", ContextGetRequest),
        spec!("context_search", "Full-text search over a session's memories.", ContextSearchRequest),
        spec!("context_delete", "Delete a memory by id.", ContextDeleteRequest),
        spec!("context_checkpoint", "Record a checkpoint of a session's current memory count.", ContextCheckpointRequest),
        spec!("context_hybrid_search", "Rank memories by fused semantic, keyword, and graph-proximity score.", HybridSearchRequest),
        spec!("context_get_lineage", "Walk DERIVED_FROM ancestry/descent for a graph entity.", LineageRequest),
        spec!("context_query_evolution", "List an entity's version history in a time range.", EvolutionRequest),
        spec!("diagnostics_ingest", "Ingest a SARIF run, normalize and digest its findings.", DiagnosticsIngestRequest),
        spec!("diagnostics_diff", "Diff the findings of two analysis runs.", DiagnosticsDiffRequest),
        spec!("diagnostics_latest", "Fetch the latest analysis run for a tool/target.", DiagnosticsLatestRequest),
        spec!("diagnostics_findings", "List findings for an analysis run.", DiagnosticsFindingsRequest),
    ]
}

/// Stdio JSON-RPC front for [`CortexService`]. `tools/call` forwards
/// straight to [`dispatch::dispatch`]; the dispatch table stays the only
/// place that knows about every subsystem at once.
pub struct McpServer {
    service: CortexService,
}

impl McpServer {
    pub fn new(service: CortexService) -> Self {
        Self { service }
    }

    fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone().unwrap_or_else(|| Value::Number(serde_json::Number::from(0)));

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params),
            other => JsonRpcResponse::err(id, -32601, format!("Method not found: {other}")),
        }
    }

    fn handle_initialize(&self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse::ok(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": "cortex",
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "instructions": "Cortex memory and knowledge service. Use context_* tools to \
                    save and recall session memories and graph entities, and diagnostics_* \
                    tools to ingest and query SARIF analysis runs.",
            }),
        )
    }

    fn handle_list_tools(&self, id: Value) -> JsonRpcResponse {
        let tools: Vec<Value> = tool_specs()
            .into_iter()
            .map(|spec| {
                json!({
                    "name": spec.name,
                    "description": spec.description,
                    "inputSchema": spec.schema,
                })
            })
            .collect();
        JsonRpcResponse::ok(id, json!({ "tools": tools }))
    }

    fn handle_call_tool(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::err(id, -32602, "Missing params");
        };

        let Some(tool_name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::err(id, -32602, "Missing tool name");
        };

        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        match dispatch::dispatch(&self.service, tool_name, arguments) {
            Ok(content) => JsonRpcResponse::ok(
                id,
                json!({
                    "content": [
                        {
                            "type": "text",
                            "text": serde_json::to_string_pretty(&content)
                                .unwrap_or_else(|_| content.to_string()),
                        }
                    ]
                }),
            ),
            Err(err) => {
                let wire = err.to_wire();
                JsonRpcResponse {
                    jsonrpc: "2.0".to_string(),
                    id,
                    result: None,
                    error: Some(JsonRpcError { code: -32603, message: err.to_string(), data: Some(wire) }),
                }
            }
        }
    }
}

/// Reads JSON-RPC requests, one per line, from `stdin` until EOF, writing
/// one JSON-RPC response per line to `stdout`.
pub fn run_server(service: CortexService) -> crate::error::Result<()> {
    let server = McpServer::new(service);
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let reader = BufReader::new(stdin);

    for line in reader.lines() {
        let line = line.map_err(|err| crate::error::Error::InvalidArgument(err.to_string()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => server.handle_request(request),
            Err(err) => JsonRpcResponse::err(
                Value::Number(serde_json::Number::from(-1)),
                -32700,
                format!("Parse error: {err}"),
            ),
        };

        let response_json = serde_json::to_string(&response)
            .map_err(crate::error::Error::InvalidParams)?;
        writeln!(stdout, "{response_json}")
            .map_err(|err| crate::error::Error::InvalidArgument(err.to_string()))?;
        stdout.flush().map_err(|err| crate::error::Error::InvalidArgument(err.to_string()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tools_list_matches_dispatch_surface() {
        let specs = tool_specs();
        assert_eq!(specs.len(), 15);
        assert!(specs.iter().any(|s| s.name == "context_hybrid_search"));
        assert!(specs.iter().any(|s| s.name == "diagnostics_ingest"));
    }

    #[test]
    fn unknown_method_is_rejected() {
        let service = CortexService::open_in_memory().unwrap();
        let server = McpServer::new(service);
        let response = server.handle_request(JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: "bogus".to_string(),
            params: None,
        });
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[test]
    fn ping_round_trips_through_tools_call() {
        let service = CortexService::open_in_memory().unwrap();
        let server = McpServer::new(service);
        let response = server.handle_request(JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: "tools/call".to_string(),
            params: Some(json!({ "name": "ping", "arguments": {} })),
        });
        assert!(response.error.is_none());
    }
}
