//! Model Context Protocol server over stdio.
//!
//! Exposes a capability catalog to MCP clients (desktop assistants, IDEs) as
//! newline-delimited JSON-RPC 2.0 on stdin/stdout. Supported methods:
//! `initialize`, `ping`, `tools/list` and `tools/call`. Notifications are
//! accepted and never answered.
//!
//! Tool failures are reported in-band (`isError: true`) so the client's model
//! can read them; protocol mistakes get JSON-RPC errors.

use std::sync::Arc;

use jarvis_core::tool::{ToolCall, ToolRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

// ─── JSON-RPC types ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

impl JsonRpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

// ─── Server ──────────────────────────────────────────────────────────────────

pub struct McpServer {
    name: String,
    tools: Arc<ToolRegistry>,
}

impl McpServer {
    pub fn new(name: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            name: name.into(),
            tools,
        }
    }

    /// Serve on the process's stdin/stdout until stdin closes.
    pub async fn serve_stdio(&self) -> std::io::Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Answer one line per request until `reader` reaches EOF.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(server = %self.name, tools = ?self.tools.names(), "MCP server ready");
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(reply) = self.handle_line(&line).await {
                writer.write_all(reply.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        info!(server = %self.name, "MCP client disconnected");
        Ok(())
    }

    /// Handle one JSON-RPC message. `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "MCP: unparseable message");
                return Some(encode(Value::Null, Err(JsonRpcError::new(PARSE_ERROR, e.to_string()))));
            }
        };

        let request: JsonRpcRequest = match serde_json::from_value(value.clone()) {
            Ok(request) => request,
            Err(e) => {
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                return Some(encode(id, Err(JsonRpcError::new(INVALID_REQUEST, e.to_string()))));
            }
        };

        let Some(id) = request.id else {
            debug!(method = %request.method, "MCP notification");
            return None;
        };

        debug!(id = %id, method = %request.method, "MCP ← request");
        let outcome = self.dispatch(&request.method, request.params).await;
        Some(encode(id, outcome))
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": self.name,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.list_tools()),
            "tools/call" => self.call_tool(params).await,
            other => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("method not found: {other}"),
            )),
        }
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .definitions()
            .into_iter()
            .map(|def| {
                json!({
                    "name": def.name,
                    "description": def.description,
                    "inputSchema": def.parameters,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallParams = params
            .ok_or_else(|| JsonRpcError::new(INVALID_PARAMS, "missing params"))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| JsonRpcError::new(INVALID_PARAMS, e.to_string()))
            })?;

        let call = ToolCall {
            id: format!("mcp_{}", params.name),
            name: params.name,
            arguments: params.arguments.unwrap_or_else(|| json!({})),
        };

        let (text, is_error) = match self.tools.execute(&call).await {
            Ok(result) => (result.output, false),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "MCP tool call failed");
                (e.to_string(), true)
            }
        };

        Ok(json!({
            "content": [{ "type": "text", "text": text }],
            "isError": is_error,
        }))
    }
}

fn encode(id: Value, outcome: Result<Value, JsonRpcError>) -> String {
    let (result, error) = match outcome {
        Ok(result) => (Some(result), None),
        Err(error) => (None, Some(error)),
    };
    let response = JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result,
        error,
    };
    serde_json::to_string(&response).unwrap_or_else(|e| {
        format!(r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":-32603,"message":"{e}"}}}}"#)
    })
}
