//! Workflow definitions.
//!
//! A workflow is a named set of phases with authored ("modeled")
//! transitions between them, plus optional direct-transition fallbacks.
//! Definitions are YAML files:
//!
//! - bundled with the binary (`waterfall`, `epcc`, `bugfix`, `minor`)
//! - or per project under `.devflow/workflows/<name>.yaml`
//!
//! Loading validates every reference once; the resulting
//! [`WorkflowDefinition`] is immutable and passed explicitly to whatever
//! needs it.

mod bundled;
mod definition;
mod loader;
mod schema;

pub use bundled::{bundled_names, bundled_source, default_definition, DEFAULT_WORKFLOW};
pub use definition::{
    DefinitionError, DirectTransition, ModeledTransition, PhaseDefinition, PhaseId,
    WorkflowDefinition,
};
pub use loader::{
    load_file, LoadedWorkflow, WorkflowInfo, WorkflowLoader, WorkflowSource, CUSTOM_WORKFLOW,
};
pub use schema::{ReviewPerspective, WorkflowFile};
