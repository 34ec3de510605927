//! Minimal MCP server: newline-delimited JSON-RPC 2.0 over a byte stream.
//!
//! Only the methods needed to expose a single tool are implemented.
//! Each `tools/call` runs on its own task, so calls may complete out of order.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::error::Category;
use serde_json::value::RawValue;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::tool::GasSandboxTool;

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision announced when the client does not ask for one.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "gas-sandbox-mcp";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

const RESPONSE_QUEUE: usize = 64;

/// JSON-RPC 2.0 Request
///
/// `params` stays raw JSON text so tool arguments reach their deserializers
/// with key order and duplicate keys intact.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Box<RawValue>>,
    /// Absent for notifications. An explicit `null` id is `Some(Value::Null)`.
    #[serde(default, deserialize_with = "present")]
    pub id: Option<Value>,
}

/// Deserialize a field that is present, even when its value is `null`.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
            id,
        }
    }
}

/// JSON-RPC 2.0 Error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    #[serde(default)]
    protocol_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Box<RawValue>>,
}

/// What to do with one incoming message.
#[derive(Debug)]
enum Dispatch {
    Reply(JsonRpcResponse),
    CallTool {
        id: Value,
        arguments: Option<Box<RawValue>>,
    },
    Ignore,
}

/// Serves one tool over a JSON-RPC stream.
#[derive(Debug, Clone)]
pub struct McpServer {
    tool: Arc<GasSandboxTool>,
}

impl McpServer {
    pub fn new(tool: GasSandboxTool) -> Self {
        Self {
            tool: Arc::new(tool),
        }
    }

    /// Serve requests from `reader` until EOF, writing responses to `writer`.
    ///
    /// Returns once every in-flight tool call has been answered.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(RESPONSE_QUEUE);
        let writer_task = tokio::spawn(write_responses(writer, rx));

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match self.dispatch(&line) {
                Dispatch::Reply(response) => {
                    if tx.send(response).await.is_err() {
                        break;
                    }
                }
                Dispatch::CallTool { id, arguments } => {
                    let tool = Arc::clone(&self.tool);
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let arguments = arguments.as_deref().map_or("{}", RawValue::get);
                        let response = tool.call_json(arguments).await;
                        let result = match serde_json::to_value(&response) {
                            Ok(value) => JsonRpcResponse::success(id, value),
                            Err(e) => JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
                        };
                        if tx.send(result).await.is_err() {
                            warn!("response channel closed before tool call completed");
                        }
                    });
                }
                Dispatch::Ignore => {}
            }
        }

        info!("input closed, waiting for in-flight calls");
        // The writer finishes once every spawned call has dropped its sender.
        drop(tx);
        writer_task.await.map_err(std::io::Error::other)??;
        Ok(())
    }

    fn dispatch(&self, line: &str) -> Dispatch {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) if matches!(e.classify(), Category::Syntax | Category::Eof) => {
                return Dispatch::Reply(JsonRpcResponse::error(
                    Value::Null,
                    PARSE_ERROR,
                    format!("parse error: {e}"),
                ))
            }
            Err(e) => {
                let raw_id = serde_json::from_str::<Value>(line)
                    .ok()
                    .and_then(|value| value.get("id").cloned())
                    .unwrap_or(Value::Null);
                return Dispatch::Reply(JsonRpcResponse::error(
                    raw_id,
                    INVALID_REQUEST,
                    format!("invalid request: {e}"),
                ));
            }
        };
        if request.jsonrpc != JSONRPC_VERSION {
            return Dispatch::Reply(JsonRpcResponse::error(
                request.id.unwrap_or(Value::Null),
                INVALID_REQUEST,
                format!("unsupported jsonrpc version: {}", request.jsonrpc),
            ));
        }

        let Some(id) = request.id else {
            debug!(method = %request.method, "notification");
            return Dispatch::Ignore;
        };
        debug!(method = %request.method, %id, "request");

        match request.method.as_str() {
            "initialize" => {
                let version = request
                    .params
                    .as_deref()
                    .and_then(|p| serde_json::from_str::<InitializeParams>(p.get()).ok())
                    .and_then(|p| p.protocol_version)
                    .unwrap_or_else(|| PROTOCOL_VERSION.to_string());
                Dispatch::Reply(JsonRpcResponse::success(
                    id,
                    json!({
                        "protocolVersion": version,
                        "capabilities": { "tools": { "listChanged": false } },
                        "serverInfo": {
                            "name": SERVER_NAME,
                            "version": env!("CARGO_PKG_VERSION"),
                        },
                    }),
                ))
            }
            "ping" => Dispatch::Reply(JsonRpcResponse::success(id, json!({}))),
            "tools/list" => Dispatch::Reply(JsonRpcResponse::success(
                id,
                json!({ "tools": [self.tool.definition()] }),
            )),
            "tools/call" => {
                let params = request.params.as_deref().map_or("null", RawValue::get);
                match serde_json::from_str::<CallToolParams>(params) {
                    Ok(params) if params.name == self.tool.name() => Dispatch::CallTool {
                        id,
                        arguments: params.arguments,
                    },
                    Ok(params) => Dispatch::Reply(JsonRpcResponse::error(
                        id,
                        INVALID_PARAMS,
                        format!("unknown tool: {}", params.name),
                    )),
                    Err(e) => Dispatch::Reply(JsonRpcResponse::error(
                        id,
                        INVALID_PARAMS,
                        format!("invalid params: {e}"),
                    )),
                }
            }
            other => Dispatch::Reply(JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("method not found: {other}"),
            )),
        }
    }
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::Receiver<JsonRpcResponse>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = match serde_json::to_vec(&response) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize response");
                continue;
            }
        };
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    writer.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::executor::ScriptExecutor;
    use crate::sandbox::script::Bootstrap;
    use crate::tool::ToolRequest;

    fn server() -> McpServer {
        let executor = ScriptExecutor::new(Default::default()).unwrap();
        McpServer::new(GasSandboxTool::new(Bootstrap::default(), executor))
    }

    fn reply(dispatch: Dispatch) -> JsonRpcResponse {
        match dispatch {
            Dispatch::Reply(response) => response,
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[test]
    fn test_initialize() {
        let response = reply(server().dispatch(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26"}}"#,
        ));
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], "2025-03-26");
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[test]
    fn test_tools_list() {
        let response =
            reply(server().dispatch(r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#));
        assert_eq!(response.id, json!("a"));
        assert_eq!(response.result.unwrap()["tools"][0]["name"], "run-gas-fakes-test");
    }

    #[test]
    fn test_notification_is_ignored() {
        let dispatch =
            server().dispatch(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);
        assert!(matches!(dispatch, Dispatch::Ignore));
    }

    #[test]
    fn test_protocol_errors() {
        let server = server();

        let parse = reply(server.dispatch("{not json"));
        assert_eq!(parse.error.unwrap().code, PARSE_ERROR);
        assert_eq!(parse.id, Value::Null);

        let invalid = reply(server.dispatch(r#"{"jsonrpc":"1.0","id":2,"method":"ping"}"#));
        assert_eq!(invalid.error.unwrap().code, INVALID_REQUEST);
        assert_eq!(invalid.id, json!(2));

        let missing = reply(server.dispatch(r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#));
        assert_eq!(missing.error.unwrap().code, METHOD_NOT_FOUND);

        let unknown = reply(server.dispatch(
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"other"}}"#,
        ));
        assert_eq!(unknown.error.unwrap().code, INVALID_PARAMS);
    }

    #[test]
    fn test_tools_call_dispatch() {
        let dispatch = server().dispatch(
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"run-gas-fakes-test","arguments":{"gas_script":"x();"}}}"#,
        );
        match dispatch {
            Dispatch::CallTool { id, arguments } => {
                assert_eq!(id, json!(5));
                let arguments: Value = serde_json::from_str(arguments.unwrap().get()).unwrap();
                assert_eq!(arguments["gas_script"], "x();");
            }
            other => panic!("expected a tool call, got {other:?}"),
        }
    }

    #[test]
    fn test_null_id_is_answered() {
        let response = reply(server().dispatch(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#));
        assert_eq!(response.id, Value::Null);
        assert!(response.error.is_none());
        assert_eq!(response.result, Some(json!({})));
    }

    #[test]
    fn test_tool_arguments_keep_duplicate_keys() {
        let dispatch = server().dispatch(
            r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{"name":"run-gas-fakes-test","arguments":{"gas_script":"x();","serviceControls":{"GmailApp":{"enabled":false},"GmailApp":{"sandboxMode":true}}}}}"#,
        );
        match dispatch {
            Dispatch::CallTool { arguments, .. } => {
                let request = ToolRequest::from_json(arguments.unwrap().get()).unwrap();
                let controls = request.sandbox_config().service_controls;
                let gmail = controls.get("GmailApp").unwrap();
                assert_eq!(gmail.enabled, Some(false));
                assert_eq!(gmail.sandbox_mode, Some(true));
            }
            other => panic!("expected a tool call, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_serve_until_eof() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        );
        let (mut client, server_side) = tokio::io::duplex(64 * 1024);

        server().serve(input.as_bytes(), server_side).await.unwrap();

        let mut output = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut client, &mut output)
            .await
            .unwrap();
        let responses: Vec<JsonRpcResponse> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].id, json!(1));
        assert_eq!(responses[1].id, json!(2));
    }
}
