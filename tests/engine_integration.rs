//! Integration tests for workflow loading, conversations, plans and
//! transitions working together.

use std::fs;

use devflow::engine::{AnalyzeRequest, TransitionEngine};
use devflow::error::FlowError;
use devflow::plan::{analyze, PlanManager};
use devflow::state::{ConversationIdentity, ConversationManager, ConversationUpdate, StateStore};
use devflow::workflow::{WorkflowDefinition, WorkflowLoader, WorkflowSource};
use tempfile::TempDir;

const THREE_PHASES: &str = r"
name: three
description: requirements, design, implementation
initial_state: requirements
states:
  requirements:
    description: Collect requirements
    transitions:
      - trigger: requirements_done
        to: design
        instructions: Start designing
        transition_reason: Requirements complete
  design:
    description: Design the solution
    transitions:
      - trigger: design_done
        to: implementation
        instructions: Start implementing
        transition_reason: Design complete
  implementation:
    description: Implement the design
";

fn write_workflow(temp: &TempDir, name: &str, content: &str) {
    let dir = temp.path().join(".devflow").join("workflows");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{name}.yaml")), content).unwrap();
}

fn manager() -> ConversationManager {
    ConversationManager::new(StateStore::open_in_memory().unwrap())
}

#[test]
fn test_explicit_skip_uses_direct_transition() {
    let def = WorkflowDefinition::from_yaml(THREE_PHASES).unwrap();
    let current = def.phase_id("requirements").unwrap();

    let result = TransitionEngine::new()
        .explicit_transition(&def, current, "implementation", None)
        .unwrap();

    assert_eq!(result.new_phase, "implementation");
    assert!(!result.is_modeled);
}

#[test]
fn test_explicit_self_transition_is_legal() {
    let def = WorkflowDefinition::from_yaml(THREE_PHASES).unwrap();
    let engine = TransitionEngine::new();

    for (id, phase) in def.phases() {
        let result = engine.explicit_transition(&def, id, &phase.id, None).unwrap();
        assert_eq!(result.new_phase, phase.id);
        assert!(!result.is_modeled);
        assert!(!result.phase_changed);
    }
}

#[test]
fn test_plan_example_counts() {
    let analysis = analyze("## Requirements\n- [x] task A\n- [ ] task B\n");
    assert_eq!((analysis.tasks_completed, analysis.tasks_total), (1, 2));
}

#[test]
fn test_missing_initial_state_falls_back_to_default() {
    let temp = TempDir::new().unwrap();
    write_workflow(
        &temp,
        "broken",
        "name: broken\ndescription: oops\nstates:\n  a:\n    description: only phase\n",
    );

    let loaded = WorkflowLoader::new(temp.path()).load(Some("broken"));
    assert_eq!(loaded.source, WorkflowSource::Fallback);
    assert_eq!(loaded.definition.name(), "waterfall");
}

#[test]
fn test_dangling_target_falls_back_to_default() {
    let temp = TempDir::new().unwrap();
    write_workflow(
        &temp,
        "dangling",
        "name: dangling\ninitial_state: a\nstates:\n  a:\n    transitions:\n      - trigger: go\n        to: nowhere\n",
    );

    let loaded = WorkflowLoader::new(temp.path()).load(Some("dangling"));
    assert_eq!(loaded.definition.name(), "waterfall");
}

#[test]
fn test_project_override_wins_over_bundled() {
    let temp = TempDir::new().unwrap();
    write_workflow(&temp, "epcc", &THREE_PHASES.replace("name: three", "name: epcc"));

    let loaded = WorkflowLoader::new(temp.path()).load(Some("epcc"));
    assert!(matches!(loaded.source, WorkflowSource::Project(_)));
    assert_eq!(loaded.definition.phase_count(), 3);
}

#[test]
fn test_unconfirmed_reset_keeps_state() {
    let temp = TempDir::new().unwrap();
    let identity = ConversationIdentity::with_branch(temp.path(), "main");
    let manager = manager();
    let def = WorkflowDefinition::from_yaml(THREE_PHASES).unwrap();

    manager.create_if_absent(&identity, &def, false).unwrap();
    manager.update(&identity, &ConversationUpdate::phase("design")).unwrap();
    let before = manager.resolve(&identity).unwrap();

    let err = manager.reset(&identity, false, None).unwrap_err();
    assert!(matches!(err, FlowError::ResetNotConfirmed));
    assert_eq!(manager.resolve(&identity).unwrap(), before);
}

#[test]
fn test_resolve_after_reset_is_not_found() {
    let temp = TempDir::new().unwrap();
    let identity = ConversationIdentity::with_branch(temp.path(), "feature/x");
    let manager = manager();
    let def = WorkflowDefinition::from_yaml(THREE_PHASES).unwrap();

    let state = manager.create_if_absent(&identity, &def, false).unwrap();
    PlanManager::new().ensure(&state.plan_file_path, "app", "feature/x", &def).unwrap();

    manager.reset(&identity, true, None).unwrap();

    let again = ConversationIdentity::with_branch(temp.path(), "feature/x");
    assert_eq!(again.id, identity.id);
    assert!(matches!(manager.resolve(&again), Err(FlowError::ConversationNotFound { .. })));
    assert!(!state.plan_file_path.exists());
}

#[test]
fn test_conversations_are_per_branch() {
    let temp = TempDir::new().unwrap();
    let manager = manager();
    let def = WorkflowDefinition::from_yaml(THREE_PHASES).unwrap();

    let main = ConversationIdentity::with_branch(temp.path(), "main");
    let feature = ConversationIdentity::with_branch(temp.path(), "feature");
    manager.create_if_absent(&main, &def, false).unwrap();
    manager.create_if_absent(&feature, &def, false).unwrap();
    manager.update(&feature, &ConversationUpdate::phase("implementation")).unwrap();

    assert_eq!(manager.resolve(&main).unwrap().current_phase, "requirements");
    assert_eq!(manager.resolve(&feature).unwrap().current_phase, "implementation");
    assert_ne!(
        manager.resolve(&main).unwrap().plan_file_path,
        manager.resolve(&feature).unwrap().plan_file_path
    );
}

#[test]
fn test_plan_driven_progression() {
    let temp = TempDir::new().unwrap();
    let identity = ConversationIdentity::with_branch(temp.path(), "main");
    let manager = manager();
    let plans = PlanManager::new();
    let engine = TransitionEngine::new();
    let def = WorkflowDefinition::from_yaml(THREE_PHASES).unwrap();

    let state = manager.create_if_absent(&identity, &def, false).unwrap();
    plans.ensure(&state.plan_file_path, "app", "main", &def).unwrap();
    let created = manager.resolve(&identity).unwrap();

    let step = |content: &str| {
        fs::write(&state.plan_file_path, content).unwrap();
        let state = manager.resolve(&identity).unwrap();
        let plan = plans.analyze_file(&state.plan_file_path);
        let req = AnalyzeRequest {
            current_phase: def.phase_id(&state.current_phase),
            plan: Some(&plan),
            ..AnalyzeRequest::default()
        };
        let result = engine.analyze(&def, &req);
        if result.new_phase != state.current_phase {
            manager.update(&identity, &ConversationUpdate::phase(&result.new_phase)).unwrap();
        }
        result
    };

    let r = step("## Requirements\n- [x] a\n- [ ] b\n");
    assert_eq!(r.new_phase, "requirements");
    let untouched = manager.resolve(&identity).unwrap();
    assert_eq!(untouched.updated_at, created.updated_at);

    let r = step("## Requirements\n- [x] a\n- [x] b\n");
    assert_eq!(r.new_phase, "design");
    assert!(r.is_modeled);

    let r = step("## Requirements\n- [x] a\n- [x] b\n## Design\n- [x] api\n");
    assert_eq!(r.new_phase, "implementation");

    // Last phase has no outgoing edges; completion keeps it there.
    let r = step("## Implementation\n- [x] code\n");
    assert_eq!(r.new_phase, "implementation");
    assert!(!r.phase_changed);
}
