// MCP server implementation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::index::db::IndexDatabase;
use crate::indexer::watcher::FileWatcher;
use crate::mcp::tools;
use crate::query::engine::QueryEngine;
use crate::supervisor::{ReindexAck, Supervisor};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC message
#[derive(Debug, Serialize, Deserialize)]
struct JsonRpcMessage {
    jsonrpc: String,
    id: Option<Value>,
    method: Option<String>,
    params: Option<Value>,
}

/// MCP tool definition
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    name: String,
    description: String,
    input_schema: Value,
}

/// MCP server info
#[derive(Debug, Serialize, Deserialize)]
struct ServerInfo {
    name: String,
    version: String,
}

/// MCP initialize result
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    protocol_version: String,
    capabilities: Value,
    server_info: ServerInfo,
}

fn rpc_result(id: Option<Value>, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn rpc_error(id: Option<Value>, code: i32, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into() }
    })
}

/// MCP server over stdio.
///
/// Reads go straight to the store; indexing happens in supervised worker
/// processes so a crashed or killed run never takes the server down.
pub struct McpServer {
    config: Config,
    engine: Arc<QueryEngine>,
    supervisor: Supervisor,
}

impl McpServer {
    pub fn new(project_root: &Path, config: Config) -> Result<Self> {
        let db = IndexDatabase::new(config.db_path(project_root)).context("opening index store")?;
        let engine = QueryEngine::with_db(project_root, config.clone(), db.clone());
        let supervisor = Supervisor::new(project_root, config.clone(), db)?;
        Ok(Self {
            config,
            engine: Arc::new(engine),
            supervisor,
        })
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Run until stdin closes, then cancel any in-flight run
    pub async fn run(self) -> Result<()> {
        info!("Starting MCP server for {}", self.engine.project_root().display());
        self.spawn_background_tasks();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            debug!("Received: {}", line);

            let response = match self.handle_message(&line).await {
                Ok(response) => response,
                Err(e) => {
                    error!("Error handling message: {}", e);
                    Some(rpc_error(None, -32603, format!("Internal error: {}", e)))
                }
            };

            if let Some(response) = response {
                let mut out = serde_json::to_string(&response)?;
                out.push('\n');
                stdout.write_all(out.as_bytes()).await?;
                stdout.flush().await?;
            }
        }

        info!("Session ended, shutting down");
        self.shutdown().await;
        Ok(())
    }

    /// Hard-kill the in-flight worker and wait briefly for its end to be recorded
    async fn shutdown(&self) {
        if !self.supervisor.cancel() {
            return;
        }
        for _ in 0..40 {
            if self.supervisor.active_run().is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        warn!("Worker did not exit before shutdown");
    }

    fn spawn_background_tasks(&self) {
        self.supervisor.spawn_watchdog();

        // startup check, then on a fixed interval
        let supervisor = self.supervisor.clone();
        let every = Duration::from_secs(self.config.server.staleness_check_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                reindex_if_stale(&supervisor, "staleness check").await;
            }
        });

        if self.config.server.watch {
            let (tx, mut rx) = mpsc::channel(1);
            let watcher = FileWatcher::new(self.engine.project_root().to_path_buf(), self.config.clone());
            tokio::spawn(async move {
                if let Err(e) = watcher.watch(tx).await {
                    warn!("File watcher stopped: {}", e);
                }
            });

            let supervisor = self.supervisor.clone();
            tokio::spawn(async move {
                while rx.recv().await.is_some() {
                    reindex_if_stale(&supervisor, "file change").await;
                }
            });
        }
    }

    /// Handle a JSON-RPC message. Notifications get no response.
    async fn handle_message(&self, message: &str) -> Result<Option<Value>> {
        let msg: JsonRpcMessage = match serde_json::from_str(message) {
            Ok(msg) => msg,
            Err(e) => return Ok(Some(rpc_error(None, -32700, format!("Parse error: {}", e)))),
        };

        let Some(method) = msg.method.as_deref() else {
            return Ok(None);
        };
        if msg.id.is_none() {
            debug!("Notification: {}", method);
            return Ok(None);
        }

        let response = match method {
            "initialize" => {
                let result = InitializeResult {
                    protocol_version: PROTOCOL_VERSION.to_string(),
                    capabilities: json!({ "tools": {} }),
                    server_info: ServerInfo {
                        name: "repomap".to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    },
                };
                rpc_result(msg.id, serde_json::to_value(result)?)
            }

            "ping" => rpc_result(msg.id, json!({})),

            "tools/list" => rpc_result(msg.id, json!({ "tools": list_tools() })),

            "tools/call" => match &msg.params {
                Some(params) => {
                    let result = self.call_tool(params).await;
                    rpc_result(msg.id, result)
                }
                None => rpc_error(msg.id, -32602, "Invalid params"),
            },

            "shutdown" => {
                info!("Received shutdown request");
                rpc_result(msg.id, Value::Null)
            }

            _ => rpc_error(msg.id, -32601, "Method not found"),
        };

        Ok(Some(response))
    }

    /// Call a tool. Failures become an `isError` result, never a protocol error.
    async fn call_tool(&self, params: &Value) -> Value {
        let tool_name = params["name"].as_str().unwrap_or_default();
        let empty = Map::new();
        let args = params["arguments"].as_object().unwrap_or(&empty);

        let result = match tool_name {
            "search_symbols" => tools::search_symbols(&self.engine, args),
            "get_file_symbols" => tools::get_file_symbols(&self.engine, args),
            "get_symbol_content" => tools::get_symbol_content(&self.engine, args),
            "list_files" => tools::list_files(&self.engine, args),
            "list_similar" => tools::list_similar(&self.engine, args),
            "repo_map_status" => tools::status(&self.engine, &self.supervisor),
            "reindex_repo_map" => tools::reindex(&self.supervisor, args).await,
            _ => Err(anyhow::anyhow!("Unknown tool: {}", tool_name)),
        };

        result.unwrap_or_else(|e| {
            warn!("Tool {} failed: {:#}", tool_name, e);
            json!({
                "content": [{ "type": "text", "text": format!("Tool error: {:#}", e) }],
                "isError": true
            })
        })
    }
}

async fn reindex_if_stale(supervisor: &Supervisor, trigger: &str) {
    match supervisor.reindex(false).await {
        Ok(ReindexAck::Started { run_id }) => info!("Background reindex after {} (run {})", trigger, run_id),
        Ok(ack) => debug!("No reindex after {}: {:?}", trigger, ack),
        Err(e) => warn!("Background reindex after {} failed: {:#}", trigger, e),
    }
}

/// List available tools
fn list_tools() -> Vec<Tool> {
    let kind = json!({
        "type": "string",
        "enum": ["function", "class", "method", "other"],
        "description": "Filter by symbol kind"
    });

    vec![
        Tool {
            name: "search_symbols".to_string(),
            description: "Search symbols by name glob (e.g. 'get_*', '*Handler')".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "description": "Glob over symbol names" },
                    "kind": kind,
                    "limit": { "type": "integer", "default": 20, "description": "Maximum number of results" }
                },
                "required": ["pattern"]
            }),
        },
        Tool {
            name: "get_file_symbols".to_string(),
            description: "List every symbol in one file, ordered by line".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file": { "type": "string", "description": "Repository-relative file path" }
                },
                "required": ["file"]
            }),
        },
        Tool {
            name: "get_symbol_content".to_string(),
            description: "Source code of a symbol by exact name or Parent.name".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Symbol name, e.g. 'User' or 'User.save'" },
                    "kind": kind
                },
                "required": ["name"]
            }),
        },
        Tool {
            name: "list_files".to_string(),
            description: "Indexed files grouped by directory".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "description": "Optional path glob, e.g. 'src/**/*.py'" }
                }
            }),
        },
        Tool {
            name: "list_similar".to_string(),
            description: "Classes and functions that look like duplicates".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "kind": kind,
                    "limit": { "type": "integer", "default": 50 }
                }
            }),
        },
        Tool {
            name: "reindex_repo_map".to_string(),
            description: "Rebuild the index in the background if stale, or always with force".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "force": { "type": "boolean", "default": false }
                }
            }),
        },
        Tool {
            name: "repo_map_status".to_string(),
            description: "Index status, staleness and documentation coverage".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn server(root: &Path) -> McpServer {
        let mut config = Config::default();
        config.server.watch = false;
        McpServer::new(root, config).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_and_list() {
        let dir = tempdir().unwrap();
        let server = server(dir.path());

        let init = server
            .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(init["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(init["result"]["serverInfo"]["name"], "repomap");

        let list = server
            .handle_message(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
            .await
            .unwrap()
            .unwrap();
        let names: Vec<_> = list["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        assert!(names.contains(&"reindex_repo_map".to_string()));
        assert!(list["result"]["tools"][0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn test_notifications_and_errors() {
        let dir = tempdir().unwrap();
        let server = server(dir.path());

        let none = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .unwrap();
        assert!(none.is_none());

        let unknown = server
            .handle_message(r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unknown["error"]["code"], -32601);

        let garbage = server.handle_message("{not json").await.unwrap().unwrap();
        assert_eq!(garbage["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_tool_call_on_empty_repo() {
        let dir = tempdir().unwrap();
        let server = server(dir.path());

        let resp = server
            .handle_message(
                r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"get_symbol_content","arguments":{"name":"doesNotExist"}}}"#,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resp["result"]["isError"], true);

        let status = server
            .handle_message(
                r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"repo_map_status","arguments":{}}}"#,
            )
            .await
            .unwrap()
            .unwrap();
        let text = status["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("status: idle"));
        assert!(text.contains("stale: yes (cache file missing)"));
    }
}
