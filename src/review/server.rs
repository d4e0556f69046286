//! Reviewer MCP server: the `approve` / `deny` tools the reviewer subagent
//! records its verdict with.
//!
//! Speaks newline-delimited JSON-RPC 2.0 over stdio. The tool schemas here
//! are the contract `interpret` reads: `approve` requires both `summary` and
//! `confirmed` (the 1-based numbers of every acceptance criterion the
//! reviewer checked), `deny` requires `reason`.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::Result;

pub const SERVER_NAME: &str = "reviewer";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// `tools/list` payload.
pub fn tool_definitions() -> Value {
    json!([
        {
            "name": "approve",
            "description": "Approve the current work. Call this only when every acceptance criterion is met and you \
                            verified each one yourself. List the number of every criterion you confirmed.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "summary": {
                        "type": "string",
                        "description": "What you verified and how"
                    },
                    "confirmed": {
                        "type": "array",
                        "items": {"type": "integer", "minimum": 1},
                        "description": "Numbers of the acceptance criteria you independently confirmed"
                    }
                },
                "required": ["summary", "confirmed"]
            }
        },
        {
            "name": "deny",
            "description": "Deny the current work. Call this when anything is wrong. Name the failing criterion \
                            and what is wrong, specifically enough to fix without asking.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "reason": {
                        "type": "string",
                        "description": "Specific, actionable reason for the denial"
                    }
                },
                "required": ["reason"]
            }
        }
    ])
}

/// Stateless apart from the optional verdict file.
#[derive(Debug, Clone, Default)]
pub struct ReviewerServer {
    verdict_path: Option<PathBuf>,
}

impl ReviewerServer {
    pub fn new(verdict_path: Option<PathBuf>) -> Self {
        Self { verdict_path }
    }

    /// Serve stdin/stdout until the client closes the stream.
    pub async fn serve(&self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();
        log::info!("Reviewer MCP server started");

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line) {
                let mut text = serde_json::to_string(&response)?;
                text.push('\n');
                stdout.write_all(text.as_bytes()).await?;
                stdout.flush().await?;
            }
        }

        log::info!("Reviewer MCP server stopped");
        Ok(())
    }

    /// Response for one message, `None` for notifications.
    pub fn handle_line(&self, line: &str) -> Option<Value> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => return Some(error_response(Value::Null, PARSE_ERROR, &e.to_string())),
        };
        let Some(id) = request.id else {
            log::debug!("Notification: {}", request.method);
            return None;
        };

        let result = match request.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {"listChanged": false}},
                "serverInfo": {"name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION")}
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({"tools": tool_definitions()})),
            "tools/call" => self.call_tool(request.params),
            other => Err((METHOD_NOT_FOUND, format!("Method not found: {}", other))),
        };

        Some(match result {
            Ok(value) => json!({"jsonrpc": "2.0", "id": id, "result": value}),
            Err((code, message)) => error_response(id, code, &message),
        })
    }

    fn call_tool(&self, params: Option<Value>) -> std::result::Result<Value, (i32, String)> {
        let params: CallToolParams = params
            .ok_or_else(|| (INVALID_PARAMS, "Missing params".to_string()))
            .and_then(|p| serde_json::from_value(p).map_err(|e| (INVALID_PARAMS, e.to_string())))?;

        let outcome = match params.name.as_str() {
            "approve" => approve(&params.arguments),
            "deny" => deny(&params.arguments),
            other => return Err((METHOD_NOT_FOUND, format!("Unknown tool: {}", other))),
        };

        Ok(match outcome {
            Ok((verdict, text)) => {
                self.write_verdict(verdict);
                tool_result(&text, false)
            }
            Err(message) => tool_result(&message, true),
        })
    }

    fn write_verdict(&self, mut verdict: Value) {
        let Some(path) = &self.verdict_path else {
            return;
        };
        verdict["timestamp"] = json!(Utc::now().to_rfc3339());
        let text = serde_json::to_string_pretty(&verdict).unwrap_or_default();
        if let Err(e) = fs::write(path, text + "\n") {
            log::warn!("Failed to write verdict {}: {}", path.display(), e);
        }
    }
}

fn approve(args: &Value) -> std::result::Result<(Value, String), String> {
    let summary = non_empty(args, "summary")?;
    let confirmed: Vec<u64> = args
        .get("confirmed")
        .and_then(Value::as_array)
        .ok_or("'confirmed' must list the numbers of the criteria you confirmed")?
        .iter()
        .map(|v| v.as_u64().filter(|n| *n > 0))
        .collect::<Option<_>>()
        .ok_or("'confirmed' must contain positive criterion numbers")?;
    let verdict = json!({"approved": true, "summary": summary, "confirmed": confirmed});
    Ok((verdict, format!("APPROVED: {}", summary)))
}

fn deny(args: &Value) -> std::result::Result<(Value, String), String> {
    let reason = non_empty(args, "reason")?;
    Ok((json!({"approved": false, "reason": reason}), format!("DENIED: {}", reason)))
}

fn non_empty<'a>(args: &'a Value, key: &str) -> std::result::Result<&'a str, String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("'{}' is required", key))
}

fn tool_result(text: &str, is_error: bool) -> Value {
    json!({"content": [{"type": "text", "text": text}], "isError": is_error})
}

fn error_response(id: Value, code: i32, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}
