//! Tool catalogue and argument types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::protocol::{MCPTool, MCPToolInputSchema};
use crate::error::FlowError;

/// Tool names.
pub const START_DEVELOPMENT: &str = "start_development";
pub const WHATS_NEXT: &str = "whats_next";
pub const PROCEED_TO_PHASE: &str = "proceed_to_phase";
pub const CONDUCT_REVIEW: &str = "conduct_review";
pub const RESET_DEVELOPMENT: &str = "reset_development";
pub const LIST_WORKFLOWS: &str = "list_workflows";

/// Errors a tool call reports back to the client as an error result.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error(transparent)]
    Flow(#[from] FlowError),
}

impl ToolError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "UnknownTool",
            Self::InvalidArguments { .. } => "InvalidArguments",
            Self::Flow(e) => e.kind(),
        }
    }

    /// JSON body sent in the error result.
    pub fn to_json(&self) -> Value {
        json!({ "error": self.kind(), "message": self.to_string() })
    }
}

/// Deserialize tool arguments; a missing argument object means "no arguments".
pub fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, args: Option<Value>) -> Result<T, ToolError> {
    let value = match args {
        None | Some(Value::Null) => json!({}),
        Some(v) => v,
    };
    serde_json::from_value(value)
        .map_err(|e| ToolError::InvalidArguments { tool: tool.to_string(), message: e.to_string() })
}

/// Arguments of `start_development`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StartDevelopmentArgs {
    /// Workflow name; the configured default when absent
    pub workflow: Option<String>,
    /// Require reviews before reviewed transitions
    pub require_reviews: Option<bool>,
}

/// Arguments of `whats_next`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WhatsNextArgs {
    pub user_input: String,
    pub context: String,
    pub conversation_summary: String,
    /// Strings or `{role, content}` objects
    pub recent_messages: Vec<Value>,
}

impl WhatsNextArgs {
    /// Recent messages flattened to text.
    pub fn message_texts(&self) -> Vec<String> {
        self.recent_messages
            .iter()
            .filter_map(|m| match m {
                Value::String(s) => Some(s.clone()),
                Value::Object(obj) => {
                    let content = obj.get("content").and_then(Value::as_str)?;
                    Some(match obj.get("role").and_then(Value::as_str) {
                        Some(role) => format!("{role}: {content}"),
                        None => content.to_string(),
                    })
                }
                _ => None,
            })
            .collect()
    }
}

/// Review status reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewState {
    #[default]
    NotRequired,
    Pending,
    Performed,
}

/// Arguments of `proceed_to_phase`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProceedArgs {
    pub target_phase: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub review_state: ReviewState,
}

/// Arguments of `conduct_review`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConductReviewArgs {
    pub target_phase: String,
}

/// Arguments of `reset_development`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResetArgs {
    pub confirm: bool,
    pub reason: Option<String>,
}

/// Every tool the server offers.
pub fn tool_definitions() -> Vec<MCPTool> {
    vec![
        tool(
            START_DEVELOPMENT,
            "Begin a development conversation for this project and branch. Creates the plan file and returns instructions for the first phase.",
            &[
                ("workflow", json!({"type": "string", "description": "Workflow name (see list_workflows)"})),
                ("require_reviews", json!({"type": "boolean", "description": "Require a review before transitions that define review perspectives"})),
            ],
            &[],
        ),
        tool(
            WHATS_NEXT,
            "Call after each user message. Analyzes progress, advances the phase when the plan shows it complete, and returns instructions for what to do next.",
            &[
                ("user_input", json!({"type": "string", "description": "The latest user message"})),
                ("context", json!({"type": "string", "description": "What you are currently working on"})),
                ("conversation_summary", json!({"type": "string", "description": "Summary of the conversation so far"})),
                ("recent_messages", json!({"type": "array", "description": "Recent messages, oldest first", "items": {}})),
            ],
            &[],
        ),
        tool(
            PROCEED_TO_PHASE,
            "Move to a specific phase of the workflow. Any phase may be entered; authored transitions carry specific instructions.",
            &[
                ("target_phase", json!({"type": "string", "description": "Phase to move to"})),
                ("reason", json!({"type": "string", "description": "Why the transition happens"})),
                ("review_state", json!({"type": "string", "enum": ["not-required", "pending", "performed"], "description": "Whether the required review was performed"})),
            ],
            &["target_phase"],
        ),
        tool(
            CONDUCT_REVIEW,
            "Get the review perspectives to work through before moving to a phase.",
            &[("target_phase", json!({"type": "string", "description": "Phase the review precedes"}))],
            &["target_phase"],
        ),
        tool(
            RESET_DEVELOPMENT,
            "Delete the conversation state and plan file for this project and branch. Requires confirm: true.",
            &[
                ("confirm", json!({"type": "boolean", "description": "Must be true"})),
                ("reason", json!({"type": "string", "description": "Why the conversation is reset"})),
            ],
            &["confirm"],
        ),
        tool(LIST_WORKFLOWS, "List the available workflows.", &[], &[]),
    ]
}

fn tool(name: &str, description: &str, props: &[(&str, Value)], required: &[&str]) -> MCPTool {
    let properties: HashMap<String, Value> =
        props.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect();
    MCPTool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema: MCPToolInputSchema {
            schema_type: "object".to_string(),
            properties: Some(properties),
            required: (!required.is_empty())
                .then(|| required.iter().map(|r| (*r).to_string()).collect()),
        },
    }
}
