//! Stdio JSON-RPC server exposing the engine as MCP tools.

use serde_json::{json, Value};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::protocol::*;
use crate::core::engine::Engine;
use crate::core::error::Error;
use crate::core::indexer::IndexOptions;
use crate::core::searcher::SearchOptions;
use crate::core::status::CodebaseEntry;

pub struct McpServer {
    engine: Engine,
}

impl McpServer {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// Serve JSON-RPC over stdin/stdout until EOF.
    pub async fn run(&self) -> anyhow::Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut lines = stdin.lines();

        while let Some(line) = lines.next_line().await? {
            if line.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => JsonRpcResponse::error(None, -32700, format!("Parse error: {e}")),
            };

            let payload = serde_json::to_string(&response)?;
            stdout.write_all(payload.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }

        Ok(())
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!(method = %request.method, "mcp request");
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id),
            "initialized" => JsonRpcResponse::success(request.id, json!({})),
            "tools/list" => self.handle_tools_list(request.id),
            "tools/call" => self.handle_tools_call(request.id, request.params).await,
            "ping" => JsonRpcResponse::success(request.id, json!({})),
            other => {
                JsonRpcResponse::error(request.id, -32601, format!("Method not found: {other}"))
            }
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = InitializeResult {
            protocol_version: "2024-11-05",
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: "codeseek",
                version: env!("CARGO_PKG_VERSION"),
            },
        };
        JsonRpcResponse::success(id, serde_json::to_value(result).unwrap_or_default())
    }

    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        let tools = vec![
            ToolDefinition {
                name: "index_codebase",
                description: "Index a codebase for semantic search: chunk source files along AST boundaries, embed them and build the hybrid (dense + BM25) index.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Codebase root directory" },
                        "force": { "type": "boolean", "description": "Drop an existing index first", "default": false },
                        "splitter": { "type": "string", "enum": ["ast", "langchain"], "default": "ast" },
                        "allowed_extensions": { "type": "array", "items": { "type": "string" } },
                        "ignore_patterns": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": ["path"]
                }),
            },
            ToolDefinition {
                name: "reindex_by_change",
                description: "Incrementally re-index a codebase: only files added, modified or removed since the last run are touched.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Codebase root directory" }
                    },
                    "required": ["path"]
                }),
            },
            ToolDefinition {
                name: "search_code",
                description: "Search an indexed codebase with natural language. Hybrid dense + keyword retrieval with rank fusion.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Codebase root directory" },
                        "query": { "type": "string", "description": "Natural language query" },
                        "limit": { "type": "integer", "default": 10 },
                        "threshold": { "type": "number", "description": "Minimum fused score" },
                        "extension_filter": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Extensions to keep, each starting with a dot (e.g. \".ts\")"
                        }
                    },
                    "required": ["path", "query"]
                }),
            },
            ToolDefinition {
                name: "clear_index",
                description: "Remove a codebase's collection, snapshot and status entry.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Codebase root directory" }
                    },
                    "required": ["path"]
                }),
            },
            ToolDefinition {
                name: "get_indexing_status",
                description: "Lifecycle state of a codebase: not_found, indexing (with progress), indexed, or index_failed.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Codebase root directory" }
                    },
                    "required": ["path"]
                }),
            },
        ];

        JsonRpcResponse::success(
            id,
            serde_json::to_value(ToolsListResult { tools }).unwrap_or_default(),
        )
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params.and_then(|p| serde_json::from_value(p).ok()) {
            Some(params) => params,
            None => {
                return JsonRpcResponse::error(id, -32602, "Invalid tool call params".to_string())
            }
        };
        let args = params.arguments.unwrap_or_else(|| json!({}));

        let result = match params.name.as_str() {
            "index_codebase" => self.tool_index(&args).await,
            "reindex_by_change" => self.tool_reindex(&args).await,
            "search_code" => self.tool_search(&args).await,
            "clear_index" => self.tool_clear(&args).await,
            "get_indexing_status" => self.tool_status(&args),
            other => Err(Error::Config(format!("unknown tool: {other}"))),
        };

        let call_result = match result {
            Ok(value) => ToolCallResult::success(value.to_string()),
            Err(err) => ToolCallResult::error(
                json!({ "kind": err.kind(), "message": err.to_string() }).to_string(),
            ),
        };
        JsonRpcResponse::success(id, serde_json::to_value(call_result).unwrap_or_default())
    }

    async fn tool_index(&self, args: &Value) -> Result<Value, Error> {
        let path = required_path(args)?;
        let splitter = args
            .get("splitter")
            .and_then(|v| v.as_str())
            .unwrap_or("ast")
            .parse()?;
        let options = IndexOptions {
            force: args.get("force").and_then(|v| v.as_bool()).unwrap_or(false),
            splitter,
            allowed_extensions: string_list(args, "allowed_extensions"),
            ignore_patterns: string_list(args, "ignore_patterns"),
        };

        let stats = self
            .engine
            .indexer
            .index_codebase(&path, options, None, CancellationToken::new())
            .await?;
        Ok(json!({
            "indexed_files": stats.indexed_files,
            "total_chunks": stats.total_chunks,
            "status": stats.status.as_str(),
        }))
    }

    async fn tool_reindex(&self, args: &Value) -> Result<Value, Error> {
        let path = required_path(args)?;
        let stats = self
            .engine
            .indexer
            .reindex_by_change(&path, None, CancellationToken::new())
            .await?;
        Ok(json!({
            "added": stats.added,
            "modified": stats.modified,
            "removed": stats.removed,
        }))
    }

    async fn tool_search(&self, args: &Value) -> Result<Value, Error> {
        let path = required_path(args)?;
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Config("missing required argument: query".to_string()))?;

        let options = SearchOptions {
            limit: args
                .get("limit")
                .and_then(|v| v.as_u64())
                .map(|v| v as usize)
                .unwrap_or(10),
            threshold: args
                .get("threshold")
                .and_then(|v| v.as_f64())
                .map(|v| v as f32),
            extension_filter: string_list(args, "extension_filter"),
        };

        let response = self
            .engine
            .searcher
            .search(&path, query, options, CancellationToken::new())
            .await?;

        let results: Vec<Value> = response
            .results
            .iter()
            .map(|result| {
                json!({
                    "relative_path": result.relative_path,
                    "start_line": result.start_line,
                    "end_line": result.end_line,
                    "language": result.language,
                    "score": result.score,
                    "content": result.content,
                })
            })
            .collect();
        Ok(json!({
            "indexing_in_progress": response.indexing,
            "results": results,
        }))
    }

    async fn tool_clear(&self, args: &Value) -> Result<Value, Error> {
        let path = required_path(args)?;
        let stats = self.engine.indexer.clear(&path).await?;
        Ok(json!({
            "cleared": stats.cleared,
            "remaining_indexed_codebases": stats.remaining_indexed_codebases,
        }))
    }

    fn tool_status(&self, args: &Value) -> Result<Value, Error> {
        let path = required_path(args)?;
        let status = match self.engine.indexer.status(&path) {
            None => json!({ "state": "not_found" }),
            Some(CodebaseEntry::Indexing { progress }) => {
                json!({ "state": "indexing", "progress": progress })
            }
            Some(CodebaseEntry::Indexed {
                indexed_files,
                total_chunks,
                status,
            }) => json!({
                "state": "indexed",
                "indexed_files": indexed_files,
                "total_chunks": total_chunks,
                "status": status.as_str(),
            }),
            Some(CodebaseEntry::IndexFailed {
                error_message,
                last_attempted_percentage,
            }) => json!({
                "state": "index_failed",
                "error": error_message,
                "last_attempted_percentage": last_attempted_percentage,
            }),
        };
        Ok(status)
    }
}

fn required_path(args: &Value) -> Result<PathBuf, Error> {
    args.get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .ok_or_else(|| Error::Config("missing required argument: path".to_string()))
}

fn string_list(args: &Value, key: &str) -> Option<Vec<String>> {
    let list: Vec<String> = args
        .get(key)?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    if list.is_empty() {
        None
    } else {
        Some(list)
    }
}
