//! # devflow
//!
//! Phase-based development workflows for AI coding assistants.
//!
//! devflow tracks which phase of a development workflow (requirements,
//! design, implementation, ...) a piece of work is in, decides when to move
//! on, and keeps a markdown plan document in sync. It is exposed to
//! assistants as an MCP server.
//!
//! ## Features
//!
//! - **Workflows as data**: YAML definitions, bundled or per project
//! - **Stable conversations**: one per project directory and git branch
//! - **Plan documents**: progress read back from markdown checkboxes
//! - **Reviews**: optional review gate before authored transitions
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the MCP server for the current project
//! devflow serve
//!
//! # Show the current phase
//! devflow status
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::format_push_string)]
#![allow(clippy::unused_self)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::struct_excessive_bools)]

pub mod core;
pub mod engine;
pub mod error;
pub mod instructions;
pub mod mcp;
pub mod plan;
pub mod state;
pub mod workflow;

// Re-export commonly used types
pub use crate::core::Config;
pub use engine::{AnalyzeRequest, TransitionEngine, TransitionResult};
pub use error::{FlowError, FlowResult};
pub use plan::{PlanAnalysis, PlanManager};
pub use state::{ConversationIdentity, ConversationManager, ConversationState, StateStore};
pub use workflow::{WorkflowDefinition, WorkflowLoader};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "devflow";

/// Per-project directory holding plans, workflow overrides, config and state.
pub const PROJECT_DIR: &str = ".devflow";
