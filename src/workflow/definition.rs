//! Validated workflow definitions.
//!
//! A [`WorkflowDefinition`] is built once from a [`WorkflowFile`] and never
//! changes afterwards. Phase ids are interned into a dense table indexed by
//! [`PhaseId`]; every transition stores its target as a `PhaseId`, so a
//! definition that exists has no dangling references.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use super::schema::{ReviewPerspective, StateFile, WorkflowFile};

/// Reasons a workflow file is rejected.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// The workflow file could not be read.
    #[error("cannot read workflow file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML could not be parsed or a field had the wrong type.
    #[error("invalid workflow YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A required top-level field is missing or empty.
    #[error("workflow is missing required field '{0}'")]
    MissingField(&'static str),

    /// `states` is present but declares no phase.
    #[error("workflow '{0}' declares no states")]
    NoStates(String),

    /// A state key is not a string.
    #[error("workflow '{workflow}' has a non-string state key")]
    InvalidStateKey { workflow: String },

    /// A state body did not match the expected shape.
    #[error("state '{state}' is malformed: {source}")]
    InvalidState {
        state: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// `initial_state` does not name a declared phase.
    #[error("initial_state '{initial}' is not a declared state")]
    UnknownInitialState { initial: String },

    /// A modeled transition points at an undeclared phase.
    #[error("transition '{trigger}' in state '{from}' targets unknown state '{to}'")]
    DanglingTransition { from: String, trigger: String, to: String },

    /// A direct transition names an undeclared phase.
    #[error("direct transition targets unknown state '{state}'")]
    DanglingDirectTransition { state: String },
}

/// Interned phase identifier, valid only for the definition that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhaseId(usize);

impl PhaseId {
    /// Position of the phase in declaration order.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// An authored edge between two phases.
#[derive(Debug, Clone, Serialize)]
pub struct ModeledTransition {
    /// Trigger name
    pub trigger: String,
    /// Target phase
    #[serde(skip)]
    pub to: PhaseId,
    /// Instructions for the assistant
    pub instructions: Option<String>,
    /// Why the transition happens
    pub transition_reason: String,
    /// Perspectives for an optional review before the transition
    pub review_perspectives: Vec<ReviewPerspective>,
}

/// Generic fallback for entering a phase without a modeled edge.
#[derive(Debug, Clone, Serialize)]
pub struct DirectTransition {
    /// Instructions for entering the phase
    pub instructions: String,
    /// Reason reported for the transition
    pub transition_reason: String,
}

/// A phase of the workflow.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseDefinition {
    /// Phase id as written in the file
    pub id: String,
    /// What happens in this phase
    pub description: String,
    /// Outgoing modeled transitions in declaration order
    pub transitions: Vec<ModeledTransition>,
    /// Direct-transition fallback into this phase, if authored
    pub direct: Option<DirectTransition>,
}

/// A validated workflow.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    name: String,
    description: String,
    initial: PhaseId,
    phases: Vec<PhaseDefinition>,
    index: HashMap<String, PhaseId>,
    metadata: BTreeMap<String, serde_yaml::Value>,
}

impl WorkflowDefinition {
    /// Parse and validate YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, DefinitionError> {
        let file: WorkflowFile = serde_yaml::from_str(content)?;
        Self::from_file(file)
    }

    /// Validate a parsed workflow file.
    pub fn from_file(file: WorkflowFile) -> Result<Self, DefinitionError> {
        let name = non_empty(file.name).ok_or(DefinitionError::MissingField("name"))?;
        let initial_name =
            non_empty(file.initial_state).ok_or(DefinitionError::MissingField("initial_state"))?;
        let states = file.states.ok_or(DefinitionError::MissingField("states"))?;
        if states.is_empty() {
            return Err(DefinitionError::NoStates(name));
        }

        // First pass interns every phase id so transitions can refer forward.
        let mut raw_states = Vec::with_capacity(states.len());
        let mut index = HashMap::with_capacity(states.len());
        for (key, value) in states {
            let id = key
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| DefinitionError::InvalidStateKey { workflow: name.clone() })?;
            let state: StateFile = if value.is_null() {
                StateFile::default()
            } else {
                serde_yaml::from_value(value)
                    .map_err(|source| DefinitionError::InvalidState { state: id.clone(), source })?
            };
            index.insert(id.clone(), PhaseId(raw_states.len()));
            raw_states.push((id, state));
        }

        let initial = *index
            .get(&initial_name)
            .ok_or(DefinitionError::UnknownInitialState { initial: initial_name })?;

        let mut phases = Vec::with_capacity(raw_states.len());
        for (id, state) in raw_states {
            let mut transitions = Vec::with_capacity(state.transitions.len());
            for t in state.transitions {
                let to = *index.get(&t.to).ok_or_else(|| DefinitionError::DanglingTransition {
                    from: id.clone(),
                    trigger: t.trigger.clone(),
                    to: t.to.clone(),
                })?;
                transitions.push(ModeledTransition {
                    trigger: t.trigger,
                    to,
                    instructions: t.instructions,
                    transition_reason: t.transition_reason,
                    review_perspectives: t.review_perspectives,
                });
            }
            phases.push(PhaseDefinition {
                id,
                description: state.description,
                transitions,
                direct: None,
            });
        }

        for direct in file.direct_transitions {
            let target = *index
                .get(&direct.state)
                .ok_or(DefinitionError::DanglingDirectTransition { state: direct.state })?;
            // First entry per phase wins; later duplicates are ignored.
            let slot = &mut phases[target.0].direct;
            if slot.is_none() {
                *slot = Some(DirectTransition {
                    instructions: direct.instructions,
                    transition_reason: direct.transition_reason,
                });
            }
        }

        Ok(Self {
            name,
            description: file.description.unwrap_or_default().trim().to_string(),
            initial,
            phases,
            index,
            metadata: file.metadata,
        })
    }

    /// Workflow name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Workflow description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The phase a new conversation starts in.
    pub fn initial_phase(&self) -> PhaseId {
        self.initial
    }

    /// Look up a phase id by name.
    pub fn phase_id(&self, name: &str) -> Option<PhaseId> {
        self.index.get(name).copied()
    }

    /// Phase definition for an id issued by this definition.
    pub fn phase(&self, id: PhaseId) -> &PhaseDefinition {
        &self.phases[id.0]
    }

    /// Phase definition by name.
    pub fn phase_by_name(&self, name: &str) -> Option<&PhaseDefinition> {
        self.phase_id(name).map(|id| self.phase(id))
    }

    /// All phases in declaration order.
    pub fn phases(&self) -> impl Iterator<Item = (PhaseId, &PhaseDefinition)> {
        self.phases.iter().enumerate().map(|(i, p)| (PhaseId(i), p))
    }

    /// Phase names in declaration order.
    pub fn phase_names(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.id.as_str()).collect()
    }

    /// Number of phases.
    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    /// Outgoing modeled transitions of a phase.
    pub fn transitions_from(&self, from: PhaseId) -> &[ModeledTransition] {
        &self.phases[from.0].transitions
    }

    /// First modeled edge from `from` to `to`, in declaration order.
    pub fn modeled_transition(&self, from: PhaseId, to: PhaseId) -> Option<&ModeledTransition> {
        self.transitions_from(from).iter().find(|t| t.to == to)
    }

    /// Direct-transition fallback into `target`, if authored.
    pub fn direct_transition(&self, target: PhaseId) -> Option<&DirectTransition> {
        self.phases[target.0].direct.as_ref()
    }

    /// Free-form metadata.
    pub fn metadata(&self) -> &BTreeMap<String, serde_yaml::Value> {
        &self.metadata
    }

    /// Whether the workflow asks for project documents to be maintained.
    pub fn requires_documentation(&self) -> bool {
        self.metadata.get("requiresDocumentation").and_then(serde_yaml::Value::as_bool).unwrap_or(false)
    }

    /// Domain tag from metadata, if any.
    pub fn domain(&self) -> Option<&str> {
        self.metadata.get("domain").and_then(serde_yaml::Value::as_str)
    }
}

impl fmt::Display for WorkflowDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.phase_names().join(" → "))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
