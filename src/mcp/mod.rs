//! MCP (Model Context Protocol) server.
//!
//! Exposes the workflow engine to an AI coding assistant over stdio.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │             MCP client (assistant)            │
//! └──────────────────────────────────────────────┘
//!                       │ JSON-RPC over stdio
//!                       ▼
//! ┌──────────────────────────────────────────────┐
//! │  MCPServer    • initialize / ping            │
//! │               • tools/list, tools/call       │
//! │               • resources/list, read         │
//! │                       │                      │
//! │  ToolHandler  • resolve conversation         │
//! │               • load workflow, read plan     │
//! │               • transition, persist, render  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use devflow::core::Config;
//! use devflow::mcp::{MCPServer, ToolHandler};
//!
//! let config = Config::load(&project);
//! let handler = ToolHandler::open(&project, config)?;
//! MCPServer::new(handler).run(std::io::stdin().lock(), std::io::stdout())?;
//! ```

mod handlers;
mod protocol;
mod server;
mod tools;

pub use handlers::{PhaseResponse, ToolHandler, PLAN_RESOURCE, STATE_RESOURCE, WORKFLOW_RESOURCE};
pub use protocol::{
    error_codes, CallToolParams, CallToolResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ListResourcesResult, ListToolsResult, MCPInitializeResult, MCPResource, MCPTool,
    MCPToolInputSchema, ReadResourceResult, RequestId, ToolContent, PROTOCOL_VERSION,
};
pub use server::{MCPServer, MCPServerState};
pub use tools::{
    tool_definitions, ConductReviewArgs, ProceedArgs, ResetArgs, ReviewState,
    StartDevelopmentArgs, ToolError, WhatsNextArgs,
};
