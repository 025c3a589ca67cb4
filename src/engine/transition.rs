//! Transition resolution.
//!
//! Every phase is reachable from every other phase. A modeled edge supplies
//! authored instructions; without one, the target's direct transition (or a
//! generic text built from its description) is used instead.

use serde::Serialize;

use super::detection::is_new_feature_request;
use crate::error::{FlowError, FlowResult};
use crate::plan::PlanAnalysis;
use crate::workflow::{ModeledTransition, PhaseId, ReviewPerspective, WorkflowDefinition};

/// Input to [`TransitionEngine::analyze`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzeRequest<'a> {
    /// Current phase; `None` when the conversation has no state yet
    pub current_phase: Option<PhaseId>,
    /// Analysis of the plan document, if one exists
    pub plan: Option<&'a PlanAnalysis>,
    /// Latest user request
    pub user_input: &'a str,
    /// Free-form context from the assistant
    pub context: &'a str,
    /// Summary of the conversation so far
    pub conversation_summary: &'a str,
    /// Recent messages, oldest first
    pub recent_messages: &'a [String],
}

/// Outcome of a transition decision.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionResult {
    /// Resulting phase
    #[serde(skip)]
    pub phase: PhaseId,
    /// Resulting phase id as written in the workflow
    pub new_phase: String,
    /// Raw (unrendered) instructions for the phase
    pub instructions: String,
    /// Why this phase was chosen
    pub transition_reason: String,
    /// Whether an authored edge was followed
    pub is_modeled: bool,
    /// Whether the phase differs from the starting phase
    pub phase_changed: bool,
    /// Review perspectives of the modeled edge, if any
    pub review_perspectives: Vec<ReviewPerspective>,
}

/// Decides the next phase of a conversation.
///
/// Stateless; the workflow definition is passed to every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionEngine;

impl TransitionEngine {
    /// Create an engine.
    pub fn new() -> Self {
        Self
    }

    /// Decide the phase for an analyze-and-advance call.
    ///
    /// - no current phase: start in the initial phase;
    /// - current phase complete in the plan: take the first modeled edge
    ///   leaving it (declaration order, self-edges skipped);
    /// - otherwise stay, using the phase's self-edge when it has one.
    pub fn analyze(&self, def: &WorkflowDefinition, req: &AnalyzeRequest<'_>) -> TransitionResult {
        let Some(current) = req.current_phase else {
            return self.start(def, req);
        };
        let phase = def.phase(current);

        let complete = req.plan.is_some_and(|p| p.is_phase_complete(&phase.id));
        if complete {
            if let Some(edge) = def.transitions_from(current).iter().find(|t| t.to != current) {
                tracing::debug!(
                    workflow = def.name(),
                    from = %phase.id,
                    trigger = %edge.trigger,
                    "Phase complete, following modeled transition"
                );
                return self.follow(def, current, edge, None);
            }
            tracing::debug!(phase = %phase.id, "Phase complete but has no outgoing transition");
        }

        if let Some(edge) = def.modeled_transition(current, current) {
            return self.follow(def, current, edge, None);
        }

        let progress = req
            .plan
            .and_then(|p| p.phase_progress(&phase.id))
            .map(|p| format!(" ({}/{} tasks complete)", p.completed, p.total))
            .unwrap_or_default();

        TransitionResult {
            phase: current,
            new_phase: phase.id.clone(),
            instructions: continue_instructions(&phase.id, &phase.description),
            transition_reason: format!("Continuing {} phase{progress}", phase.id),
            is_modeled: false,
            phase_changed: false,
            review_perspectives: Vec::new(),
        }
    }

    /// Move to `target` on request.
    ///
    /// Any declared phase is a legal target. Fails with
    /// [`FlowError::InvalidTargetPhase`] otherwise.
    pub fn explicit_transition(
        &self,
        def: &WorkflowDefinition,
        current: PhaseId,
        target: &str,
        reason: Option<&str>,
    ) -> FlowResult<TransitionResult> {
        let target_id = def.phase_id(target).ok_or_else(|| FlowError::InvalidTargetPhase {
            target: target.to_string(),
            workflow: def.name().to_string(),
            available: def.phase_names().into_iter().map(String::from).collect(),
        })?;
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());

        if let Some(edge) = def.modeled_transition(current, target_id) {
            return Ok(self.follow(def, current, edge, reason));
        }

        tracing::debug!(
            workflow = def.name(),
            from = %def.phase(current).id,
            to = target,
            "No modeled transition, using direct transition"
        );
        let mut result = self.direct(def, target_id, current);
        if let Some(reason) = reason {
            result.transition_reason = reason.to_string();
        }
        Ok(result)
    }

    fn start(&self, def: &WorkflowDefinition, req: &AnalyzeRequest<'_>) -> TransitionResult {
        let initial = def.initial_phase();
        let phase = def.phase(initial);

        let texts = [req.user_input, req.context, req.conversation_summary]
            .into_iter()
            .chain(req.recent_messages.iter().map(String::as_str));
        let reason = if is_new_feature_request(texts) {
            format!("New feature request detected, starting in {} phase", phase.id)
        } else {
            format!("Starting development in {} phase", phase.id)
        };

        let instructions = match &phase.direct {
            Some(direct) => direct.instructions.clone(),
            None => start_instructions(&phase.id, &phase.description),
        };

        TransitionResult {
            phase: initial,
            new_phase: phase.id.clone(),
            instructions,
            transition_reason: reason,
            is_modeled: false,
            phase_changed: true,
            review_perspectives: Vec::new(),
        }
    }

    fn follow(
        &self,
        def: &WorkflowDefinition,
        current: PhaseId,
        edge: &ModeledTransition,
        reason: Option<&str>,
    ) -> TransitionResult {
        let target = def.phase(edge.to);
        let instructions = match &edge.instructions {
            Some(text) if !text.trim().is_empty() => text.clone(),
            _ => self.direct(def, edge.to, current).instructions,
        };

        TransitionResult {
            phase: edge.to,
            new_phase: target.id.clone(),
            instructions,
            transition_reason: reason.map_or_else(|| edge.transition_reason.clone(), String::from),
            is_modeled: true,
            phase_changed: edge.to != current,
            review_perspectives: edge.review_perspectives.clone(),
        }
    }

    fn direct(&self, def: &WorkflowDefinition, target: PhaseId, current: PhaseId) -> TransitionResult {
        let phase = def.phase(target);
        let fallback_reason = || format!("Direct transition to {} phase", phase.id);
        let (instructions, transition_reason) = match def.direct_transition(target) {
            Some(direct) if direct.transition_reason.trim().is_empty() => {
                (direct.instructions.clone(), fallback_reason())
            }
            Some(direct) => (direct.instructions.clone(), direct.transition_reason.clone()),
            None => (start_instructions(&phase.id, &phase.description), fallback_reason()),
        };

        TransitionResult {
            phase: target,
            new_phase: phase.id.clone(),
            instructions,
            transition_reason,
            is_modeled: false,
            phase_changed: target != current,
            review_perspectives: Vec::new(),
        }
    }
}

fn start_instructions(phase: &str, description: &str) -> String {
    if description.is_empty() {
        format!("Start the {phase} phase. Add its tasks to the plan file and work through them.")
    } else {
        format!(
            "Start the {phase} phase: {description}. Add its tasks to the plan file and work through them."
        )
    }
}

fn continue_instructions(phase: &str, description: &str) -> String {
    if description.is_empty() {
        format!("Continue the {phase} phase. Tick tasks in the plan file as they are completed.")
    } else {
        format!(
            "Continue the {phase} phase: {description}. Tick tasks in the plan file as they are completed."
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::analyze;

    const LINEAR: &str = r"
name: linear
description: Three phases
initial_state: requirements
states:
  requirements:
    description: Gather requirements
    transitions:
      - trigger: requirements_done
        to: design
        instructions: Design it
        transition_reason: Requirements done
  design:
    description: Design the solution
    transitions:
      - trigger: design_done
        to: implementation
        instructions: Build it
        transition_reason: Design done
        review_perspectives:
          - perspective: architect
            prompt: Check the design
  implementation:
    description: Write the code
    transitions:
      - trigger: keep_going
        to: implementation
        instructions: Keep coding
        transition_reason: More to do
      - trigger: back_to_design
        to: design
        instructions: Revisit the design
        transition_reason: Design gap
";

    fn linear() -> WorkflowDefinition {
        WorkflowDefinition::from_yaml(LINEAR).unwrap()
    }

    fn id(def: &WorkflowDefinition, name: &str) -> PhaseId {
        def.phase_id(name).unwrap()
    }

    #[test]
    fn test_first_call_starts_in_initial_phase() {
        let def = linear();
        let req = AnalyzeRequest { user_input: "implement a login page", ..Default::default() };
        let result = TransitionEngine::new().analyze(&def, &req);

        assert_eq!(result.new_phase, "requirements");
        assert!(result.phase_changed);
        assert!(!result.is_modeled);
        assert!(result.transition_reason.contains("New feature"));
    }

    #[test]
    fn test_first_call_without_feature_keywords() {
        let def = linear();
        let result = TransitionEngine::new().analyze(&def, &AnalyzeRequest::default());
        assert_eq!(result.new_phase, "requirements");
        assert!(result.transition_reason.starts_with("Starting development"));
    }

    #[test]
    fn test_stays_while_tasks_open() {
        let def = linear();
        let plan = analyze("## Requirements\n- [x] task A\n- [ ] task B\n");
        let req = AnalyzeRequest {
            current_phase: Some(id(&def, "requirements")),
            plan: Some(&plan),
            ..Default::default()
        };
        let result = TransitionEngine::new().analyze(&def, &req);

        assert_eq!(result.new_phase, "requirements");
        assert!(!result.phase_changed);
        assert!(!result.is_modeled);
        assert!(result.transition_reason.contains("1/2"));
    }

    #[test]
    fn test_advances_when_phase_complete() {
        let def = linear();
        let plan = analyze("## Design\n- [x] api\n- [x] schema\n");
        let req = AnalyzeRequest {
            current_phase: Some(id(&def, "design")),
            plan: Some(&plan),
            ..Default::default()
        };
        let result = TransitionEngine::new().analyze(&def, &req);

        assert_eq!(result.new_phase, "implementation");
        assert!(result.is_modeled);
        assert!(result.phase_changed);
        assert_eq!(result.instructions, "Build it");
        assert_eq!(result.review_perspectives.len(), 1);
    }

    #[test]
    fn test_complete_phase_skips_self_edge() {
        let def = linear();
        let plan = analyze("## Implementation\n- [x] code\n");
        let req = AnalyzeRequest {
            current_phase: Some(id(&def, "implementation")),
            plan: Some(&plan),
            ..Default::default()
        };
        let result = TransitionEngine::new().analyze(&def, &req);
        assert_eq!(result.new_phase, "design");
        assert_eq!(result.transition_reason, "Design gap");
    }

    #[test]
    fn test_continue_uses_self_edge() {
        let def = linear();
        let req =
            AnalyzeRequest { current_phase: Some(id(&def, "implementation")), ..Default::default() };
        let result = TransitionEngine::new().analyze(&def, &req);

        assert_eq!(result.new_phase, "implementation");
        assert!(result.is_modeled);
        assert!(!result.phase_changed);
        assert_eq!(result.instructions, "Keep coding");
    }

    #[test]
    fn test_empty_phase_section_does_not_advance() {
        let def = linear();
        let plan = analyze("## Requirements\n### Tasks\n_none yet_\n");
        let req = AnalyzeRequest {
            current_phase: Some(id(&def, "requirements")),
            plan: Some(&plan),
            ..Default::default()
        };
        assert!(!TransitionEngine::new().analyze(&def, &req).phase_changed);
    }

    #[test]
    fn test_explicit_skip_uses_direct_fallback() {
        let def = linear();
        let result = TransitionEngine::new()
            .explicit_transition(&def, id(&def, "requirements"), "implementation", None)
            .unwrap();

        assert_eq!(result.new_phase, "implementation");
        assert!(!result.is_modeled);
        assert!(result.phase_changed);
        assert!(result.instructions.contains("Write the code"));
    }

    #[test]
    fn test_explicit_modeled_edge() {
        let def = linear();
        let result = TransitionEngine::new()
            .explicit_transition(&def, id(&def, "requirements"), "design", Some("user approved"))
            .unwrap();

        assert!(result.is_modeled);
        assert_eq!(result.instructions, "Design it");
        assert_eq!(result.transition_reason, "user approved");
    }

    #[test]
    fn test_explicit_self_transition() {
        let def = linear();
        let engine = TransitionEngine::new();

        let plain = engine.explicit_transition(&def, id(&def, "design"), "design", None).unwrap();
        assert!(!plain.is_modeled);
        assert!(!plain.phase_changed);

        let modeled = engine
            .explicit_transition(&def, id(&def, "implementation"), "implementation", None)
            .unwrap();
        assert!(modeled.is_modeled);
    }

    #[test]
    fn test_explicit_unknown_target() {
        let def = linear();
        let err = TransitionEngine::new()
            .explicit_transition(&def, id(&def, "design"), "deploy", None)
            .unwrap_err();

        match err {
            FlowError::InvalidTargetPhase { target, available, .. } => {
                assert_eq!(target, "deploy");
                assert_eq!(available, vec!["requirements", "design", "implementation"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_authored_direct_transition() {
        let yaml = format!(
            "{LINEAR}direct_transitions:\n  - state: implementation\n    instructions: Jump in\n    transition_reason: Skipped ahead\n"
        );
        let def = WorkflowDefinition::from_yaml(&yaml).unwrap();
        let result = TransitionEngine::new()
            .explicit_transition(&def, id(&def, "requirements"), "implementation", None)
            .unwrap();

        assert_eq!(result.instructions, "Jump in");
        assert_eq!(result.transition_reason, "Skipped ahead");
    }

    #[test]
    fn test_direct_transition_without_reason() {
        let yaml =
            format!("{LINEAR}direct_transitions:\n  - state: implementation\n    instructions: Jump in\n");
        let def = WorkflowDefinition::from_yaml(&yaml).unwrap();
        let result = TransitionEngine::new()
            .explicit_transition(&def, id(&def, "requirements"), "implementation", None)
            .unwrap();

        assert_eq!(result.instructions, "Jump in");
        assert_eq!(result.transition_reason, "Direct transition to implementation phase");
    }
}
