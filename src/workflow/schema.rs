//! Workflow file schema.
//!
//! Mirrors the YAML structure of a workflow definition file. Everything is
//! optional here so that a missing field is reported by validation with a
//! readable message instead of a bare serde error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A workflow definition as written on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowFile {
    /// Unique workflow name
    pub name: Option<String>,

    /// Human readable description
    pub description: Option<String>,

    /// Phase the workflow starts in
    pub initial_state: Option<String>,

    /// Phases, in declaration order
    pub states: Option<serde_yaml::Mapping>,

    /// Generic fallbacks used when no modeled transition applies
    #[serde(default)]
    pub direct_transitions: Vec<DirectTransitionFile>,

    /// Free-form metadata (complexity, domain, requiresDocumentation, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_yaml::Value>,
}

/// A phase as written on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateFile {
    /// What happens in this phase
    #[serde(default)]
    pub description: String,

    /// Modeled outgoing transitions, in declaration order
    #[serde(default)]
    pub transitions: Vec<TransitionFile>,
}

/// A modeled transition as written on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionFile {
    /// Trigger name
    pub trigger: String,

    /// Target phase id
    pub to: String,

    /// Instructions for the assistant when taking this edge
    #[serde(default)]
    pub instructions: Option<String>,

    /// Why the transition happens
    #[serde(default)]
    pub transition_reason: String,

    /// Review perspectives for a review before the transition
    #[serde(default)]
    pub review_perspectives: Vec<ReviewPerspective>,
}

/// A direct-transition fallback as written on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectTransitionFile {
    /// Phase this fallback leads into
    pub state: String,

    /// Instructions for entering the phase
    pub instructions: String,

    /// Reason reported for the transition
    #[serde(default)]
    pub transition_reason: String,
}

/// A review perspective attached to a transition.
///
/// Purely descriptive: the engine hands these to whoever performs the review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPerspective {
    /// Perspective label (e.g. "architect")
    pub perspective: String,

    /// Prompt for the reviewer
    pub prompt: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_workflow_yaml() {
        let yaml = r#"
name: tiny
description: Two phases
initial_state: start
states:
  start:
    description: Start here
    transitions:
      - trigger: go
        to: finish
        instructions: Go on
        transition_reason: Done starting
        review_perspectives:
          - perspective: architect
            prompt: Look at it
  finish:
    description: The end
direct_transitions:
  - state: finish
    instructions: Jump to the end
metadata:
  domain: code
  requiresDocumentation: false
"#;

        let file: WorkflowFile = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(file.name.as_deref(), Some("tiny"));
        assert_eq!(file.initial_state.as_deref(), Some("start"));

        let states = file.states.unwrap();
        let keys: Vec<_> = states.keys().filter_map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["start", "finish"]);

        let start: StateFile = serde_yaml::from_value(states.get("start").unwrap().clone()).unwrap();
        assert_eq!(start.transitions.len(), 1);
        assert_eq!(start.transitions[0].review_perspectives[0].perspective, "architect");

        assert_eq!(file.direct_transitions.len(), 1);
        assert!(file.direct_transitions[0].transition_reason.is_empty());
        assert_eq!(file.metadata["domain"], serde_yaml::Value::from("code"));
    }

    #[test]
    fn test_missing_fields_are_none() {
        let file: WorkflowFile = serde_yaml::from_str("name: partial\n").unwrap();
        assert!(file.initial_state.is_none());
        assert!(file.states.is_none());
        assert!(file.direct_transitions.is_empty());
    }
}
