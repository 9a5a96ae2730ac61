//! MCP server: a JSON-RPC 2.0 loop on stdio whose tools map 1:1 onto
//! the engine's operations. Results and errors are serialized as text
//! content blocks; this layer adds no behavior of its own.

use crate::tools;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufRead, Write};
use std::path::Path;

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 protocol types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Serialize)]
struct ToolContent {
    r#type: &'static str,
    text: String,
}

#[derive(Debug, Serialize)]
struct ToolCallResult {
    content: Vec<ToolContent>,
    #[serde(rename = "isError")]
    is_error: bool,
}

// ---------------------------------------------------------------------------
// Server loop
// ---------------------------------------------------------------------------

pub fn run() -> anyhow::Result<()> {
    let work_dir = super::work_dir()?;
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let tools = tools::all_tools();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let raw: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                let resp = error_response(None, -32700, format!("parse error: {e}"));
                write_response(&stdout, &resp)?;
                continue;
            }
        };

        // Notifications have no "id" key — do not respond
        if !raw
            .as_object()
            .map(|o| o.contains_key("id"))
            .unwrap_or(false)
        {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_value(raw) {
            Ok(r) => r,
            Err(e) => {
                let resp = error_response(None, -32600, format!("invalid request: {e}"));
                write_response(&stdout, &resp)?;
                continue;
            }
        };

        tracing::debug!(method = %request.method, "mcp request");
        let response = handle_request(&request, &tools, &work_dir);
        write_response(&stdout, &response)?;
    }

    Ok(())
}

fn write_response(stdout: &std::io::Stdout, resp: &JsonRpcResponse) -> anyhow::Result<()> {
    let mut out = stdout.lock();
    serde_json::to_writer(&mut out, resp)?;
    writeln!(out)?;
    Ok(())
}

fn error_response(id: Option<Value>, code: i32, message: String) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(JsonRpcError { code, message }),
    }
}

// ---------------------------------------------------------------------------
// Request dispatch (pub for unit tests)
// ---------------------------------------------------------------------------

pub fn handle_request(
    req: &JsonRpcRequest,
    tools: &[Box<dyn tools::MpTool>],
    work_dir: &Path,
) -> JsonRpcResponse {
    match req.method.as_str() {
        "initialize" => JsonRpcResponse {
            jsonrpc: "2.0",
            id: req.id.clone(),
            result: Some(serde_json::json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "monkeypuzzle",
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
            error: None,
        },

        "tools/list" => {
            let tool_list: Vec<Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name(),
                        "description": t.description(),
                        "inputSchema": t.schema()
                    })
                })
                .collect();
            JsonRpcResponse {
                jsonrpc: "2.0",
                id: req.id.clone(),
                result: Some(serde_json::json!({ "tools": tool_list })),
                error: None,
            }
        }

        "tools/call" => {
            let params = match &req.params {
                Some(p) => p,
                None => {
                    return error_response(req.id.clone(), -32602, "missing params".to_string())
                }
            };

            let tool_name = match params["name"].as_str() {
                Some(n) => n,
                None => {
                    return error_response(
                        req.id.clone(),
                        -32602,
                        "missing tool name in params".to_string(),
                    )
                }
            };

            let args = params.get("arguments").cloned().unwrap_or(Value::Null);

            match tools.iter().find(|t| t.name() == tool_name) {
                None => error_response(
                    req.id.clone(),
                    -32601,
                    format!("tool not found: {tool_name}"),
                ),
                Some(tool) => {
                    let (text, is_error) = match tool.call(args, work_dir) {
                        Ok(v) => (
                            serde_json::to_string_pretty(&v)
                                .unwrap_or_else(|e| format!("serialization error: {e}")),
                            false,
                        ),
                        Err(e) => (e, true),
                    };

                    let call_result = ToolCallResult {
                        content: vec![ToolContent {
                            r#type: "text",
                            text,
                        }],
                        is_error,
                    };

                    JsonRpcResponse {
                        jsonrpc: "2.0",
                        id: req.id.clone(),
                        result: Some(
                            serde_json::to_value(&call_result)
                                .unwrap_or_else(|e| serde_json::json!({"error": e.to_string()})),
                        ),
                        error: None,
                    }
                }
            }
        }

        other => error_response(req.id.clone(), -32601, format!("method not found: {other}")),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(serde_json::json!(1)),
            method: method.to_string(),
            params,
        }
    }

    #[test]
    fn initialize_reports_server_info() {
        let dir = TempDir::new().unwrap();
        let tools = tools::all_tools();
        let resp = handle_request(&request("initialize", None), &tools, dir.path());
        let result = resp.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "monkeypuzzle");
        assert!(resp.error.is_none());
    }

    #[test]
    fn tools_list_exposes_every_operation() {
        let dir = TempDir::new().unwrap();
        let tools = tools::all_tools();
        let resp = handle_request(&request("tools/list", None), &tools, dir.path());
        let listed = resp.result.unwrap()["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect::<Vec<_>>();
        for expected in [
            "piece_status",
            "piece_new",
            "piece_from_issue",
            "piece_update",
            "piece_merge",
            "piece_cleanup",
            "issue_create",
            "pr_create",
        ] {
            assert!(listed.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn unknown_method_is_32601() {
        let dir = TempDir::new().unwrap();
        let tools = tools::all_tools();
        let resp = handle_request(&request("bogus/method", None), &tools, dir.path());
        assert_eq!(resp.error.unwrap().code, -32601);
    }

    #[test]
    fn unknown_tool_is_32601() {
        let dir = TempDir::new().unwrap();
        let tools = tools::all_tools();
        let resp = handle_request(
            &request("tools/call", Some(serde_json::json!({"name": "bogus"}))),
            &tools,
            dir.path(),
        );
        assert_eq!(resp.error.unwrap().code, -32601);
    }

    #[test]
    fn failing_tool_call_sets_is_error() {
        // piece_status outside a git repo still succeeds; piece_update
        // outside a piece must come back as an error content block.
        let dir = TempDir::new().unwrap();
        let tools = tools::all_tools();
        let resp = handle_request(
            &request(
                "tools/call",
                Some(serde_json::json!({"name": "piece_update", "arguments": {}})),
            ),
            &tools,
            dir.path(),
        );
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], true);
    }
}
