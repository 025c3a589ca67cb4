//! MCP server over stdio.
//!
//! Line-delimited JSON-RPC: one request per line in, one response per line
//! out. Requests are handled one at a time; notifications get no response.

use std::io::{BufRead, Write};

use serde_json::{json, Value};

use super::handlers::{ToolHandler, PLAN_RESOURCE, STATE_RESOURCE, WORKFLOW_RESOURCE};
use super::protocol::{
    error_codes, CallToolParams, CallToolResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ListResourcesResult, ListToolsResult, MCPInitializeResult, MCPResource, MCPServerCapabilities,
    MCPServerInfo, ReadResourceParams, ReadResourceResult, ResourceContents, PROTOCOL_VERSION,
};
use super::tools::tool_definitions;
use crate::error::FlowError;

/// Server usage hints returned on initialize.
const SERVER_INSTRUCTIONS: &str = "Call whats_next after every user message and follow the returned instructions. \
Use proceed_to_phase to move between phases explicitly and keep the plan file up to date.";

/// MCP server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MCPServerState {
    /// Waiting for `initialize`
    Created,
    /// `initialize` answered
    Initializing,
    /// Client sent `notifications/initialized`
    Running,
}

/// MCP server instance.
pub struct MCPServer {
    handler: ToolHandler,
    state: MCPServerState,
}

impl MCPServer {
    /// Create a server around a handler.
    pub fn new(handler: ToolHandler) -> Self {
        Self { handler, state: MCPServerState::Created }
    }

    /// Current state.
    pub fn state(&self) -> MCPServerState {
        self.state
    }

    /// Serve until `reader` reaches end of input.
    pub fn run<R: BufRead, W: Write>(&mut self, reader: R, mut writer: W) -> std::io::Result<()> {
        tracing::info!(project = ?self.handler.project_path(), "MCP server listening on stdio");

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line) {
                let encoded = serde_json::to_string(&response)?;
                tracing::debug!("MCP -> {}", encoded);
                writeln!(writer, "{encoded}")?;
                writer.flush()?;
            }
        }

        tracing::info!("MCP client closed input, shutting down");
        Ok(())
    }

    /// Handle one raw message. `None` for notifications.
    pub fn handle_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        tracing::debug!("MCP <- {}", line.trim());
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable JSON-RPC message");
                return Some(JsonRpcResponse::failure(
                    None,
                    JsonRpcError::new(error_codes::PARSE_ERROR, format!("Parse error: {e}")),
                ));
            }
        };
        self.handle_request(request)
    }

    /// Handle a parsed request. `None` for notifications.
    pub fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.jsonrpc != "2.0" {
            return request.id.map(|id| {
                JsonRpcResponse::failure(
                    Some(id),
                    JsonRpcError::new(error_codes::INVALID_REQUEST, "jsonrpc must be \"2.0\""),
                )
            });
        }

        if request.is_notification() {
            self.handle_notification(&request.method);
            return None;
        }

        let id = request.id.clone();
        let outcome = match request.method.as_str() {
            "initialize" => self.initialize(),
            "ping" => Ok(json!({})),
            "tools/list" => to_result(&ListToolsResult { tools: tool_definitions() }),
            "tools/call" => self.call_tool(request.params),
            "resources/list" => to_result(&ListResourcesResult { resources: resources() }),
            "resources/read" => self.read_resource(request.params),
            other => Err(JsonRpcError::new(
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        })
    }

    fn handle_notification(&mut self, method: &str) {
        match method {
            "notifications/initialized" => {
                self.state = MCPServerState::Running;
                tracing::debug!("Client initialized");
            }
            other => tracing::debug!(method = other, "Ignoring notification"),
        }
    }

    fn initialize(&mut self) -> Result<Value, JsonRpcError> {
        self.state = MCPServerState::Initializing;
        to_result(&MCPInitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: MCPServerCapabilities {
                tools: Some(json!({})),
                resources: Some(json!({})),
            },
            server_info: MCPServerInfo {
                name: "devflow".to_string(),
                version: Some(crate::VERSION.to_string()),
            },
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
        })
    }

    fn call_tool(&mut self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = parse_params(params)?;
        let result = match self.handler.call_tool(&params.name, params.arguments) {
            Ok(value) => CallToolResult::text(pretty(&value), false),
            Err(e) => {
                tracing::warn!(tool = %params.name, kind = e.kind(), error = %e, "Tool call failed");
                CallToolResult::text(pretty(&e.to_json()), true)
            }
        };
        to_result(&result)
    }

    fn read_resource(&mut self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: ReadResourceParams = parse_params(params)?;

        let (mime_type, text) = match params.uri.as_str() {
            STATE_RESOURCE => ("application/json", self.handler.read_state().map(|v| pretty(&v))),
            PLAN_RESOURCE => ("text/markdown", self.handler.read_plan()),
            WORKFLOW_RESOURCE => {
                ("application/json", self.handler.read_workflow().map(|v| pretty(&v)))
            }
            other => {
                return Err(JsonRpcError::new(
                    error_codes::INVALID_PARAMS,
                    format!("Unknown resource: {other}"),
                ))
            }
        };

        let text = text.map_err(flow_error)?;
        to_result(&ReadResourceResult {
            contents: vec![ResourceContents {
                uri: params.uri,
                mime_type: Some(mime_type.to_string()),
                text,
            }],
        })
    }
}

fn resources() -> Vec<MCPResource> {
    let resource = |uri: &str, name: &str, description: &str, mime: &str| MCPResource {
        uri: uri.to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        mime_type: Some(mime.to_string()),
    };
    vec![
        resource(
            STATE_RESOURCE,
            "Conversation state",
            "Current phase, workflow and plan location for this project and branch",
            "application/json",
        ),
        resource(PLAN_RESOURCE, "Development plan", "The plan document", "text/markdown"),
        resource(
            WORKFLOW_RESOURCE,
            "Active workflow",
            "Phases and transitions of the active workflow",
            "application/json",
        ),
    ]
}

fn parse_params<T: for<'de> serde::Deserialize<'de>>(params: Option<Value>) -> Result<T, JsonRpcError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| JsonRpcError::new(error_codes::INVALID_PARAMS, format!("Invalid params: {e}")))
}

fn to_result<T: serde::Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::new(error_codes::INTERNAL_ERROR, e.to_string()))
}

fn flow_error(e: FlowError) -> JsonRpcError {
    JsonRpcError {
        code: error_codes::INTERNAL_ERROR,
        message: e.to_string(),
        data: Some(json!({ "error": e.kind() })),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
