//! Tool and resource handlers.
//!
//! Each advancing call runs the same sequence: resolve the conversation,
//! load its workflow, read the plan, ask the engine, persist the phase if
//! it changed, render the instructions and log the interaction.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Value};

use super::tools::{
    parse_args, ConductReviewArgs, ProceedArgs, ResetArgs, ReviewState, StartDevelopmentArgs,
    ToolError, WhatsNextArgs, CONDUCT_REVIEW, LIST_WORKFLOWS, PROCEED_TO_PHASE, RESET_DEVELOPMENT,
    START_DEVELOPMENT, WHATS_NEXT,
};
use crate::core::Config;
use crate::engine::{AnalyzeRequest, TransitionEngine, TransitionResult};
use crate::error::{FlowError, FlowResult};
use crate::instructions::{InstructionGenerator, RenderContext};
use crate::plan::PlanManager;
use crate::state::{
    ConversationIdentity, ConversationManager, ConversationState, ConversationUpdate, StateStore,
};
use crate::workflow::{LoadedWorkflow, PhaseId, ReviewPerspective, WorkflowLoader, WorkflowSource};

/// Resource URIs.
pub const STATE_RESOURCE: &str = "devflow://state";
pub const PLAN_RESOURCE: &str = "devflow://plan";
pub const WORKFLOW_RESOURCE: &str = "devflow://workflow";

/// Response of every phase-advancing tool.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseResponse {
    /// Resulting phase
    pub phase: String,
    /// Rendered instructions
    pub instructions: String,
    /// Plan document location
    pub plan_file_path: PathBuf,
    /// Whether an authored transition was followed
    pub is_modeled: bool,
    /// Why this phase was chosen
    pub transition_reason: String,
    /// Perspectives attached to the transition taken
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub review_perspectives: Vec<ReviewPerspective>,
    /// Workflow in use
    pub workflow: String,
}

/// Handles tool calls and resource reads for one project directory.
pub struct ToolHandler {
    project_path: PathBuf,
    config: Config,
    conversations: ConversationManager,
    plans: PlanManager,
    engine: TransitionEngine,
    loader: WorkflowLoader,
    instructions: InstructionGenerator,
}

impl ToolHandler {
    /// Open the project's database and build a handler.
    pub fn open(project_path: &Path, config: Config) -> FlowResult<Self> {
        let store = StateStore::open(&config.database_path(project_path))?;
        Ok(Self::with_store(project_path, config, store))
    }

    /// Build a handler on an existing store.
    pub fn with_store(project_path: &Path, config: Config, store: StateStore) -> Self {
        let identity = ConversationIdentity::derive(project_path);
        let project_path = identity.project_path;
        Self {
            loader: WorkflowLoader::new(&project_path).with_default(&config.workflow.default),
            instructions: InstructionGenerator::new(&project_path, &config.documents, &config.git),
            conversations: ConversationManager::new(store),
            plans: PlanManager::new(),
            engine: TransitionEngine::new(),
            project_path,
            config,
        }
    }

    /// Project this handler serves.
    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    /// Dispatch a tool call by name.
    pub fn call_tool(&self, name: &str, args: Option<Value>) -> Result<Value, ToolError> {
        tracing::debug!(tool = name, "Handling tool call");
        let input = args.clone().unwrap_or_else(|| json!({}));

        let (response, phase) = match name {
            START_DEVELOPMENT => {
                let r = self.start_development(&parse_args(name, args)?)?;
                let phase = r.phase.clone();
                (serde_json::to_value(r).map_err(FlowError::from)?, Some(phase))
            }
            WHATS_NEXT => {
                let r = self.whats_next(&parse_args(name, args)?)?;
                let phase = r.phase.clone();
                (serde_json::to_value(r).map_err(FlowError::from)?, Some(phase))
            }
            PROCEED_TO_PHASE => {
                let r = self.proceed_to_phase(&parse_args(name, args)?)?;
                let phase = r.phase.clone();
                (serde_json::to_value(r).map_err(FlowError::from)?, Some(phase))
            }
            CONDUCT_REVIEW => {
                let r = self.conduct_review(&parse_args(name, args)?)?;
                let phase = r["current_phase"].as_str().map(String::from);
                (r, phase)
            }
            RESET_DEVELOPMENT => (self.reset_development(&parse_args(name, args)?)?, None),
            LIST_WORKFLOWS => (self.list_workflows(), None),
            other => return Err(ToolError::UnknownTool(other.to_string())),
        };

        // Only conversation-scoped calls are logged; resets and listings are not.
        if let Some(phase) = phase {
            let identity = self.identity();
            self.conversations.store().log_interaction(&identity.id, name, &input, &response, &phase)?;
        }

        Ok(response)
    }

    /// Start (or rejoin) the conversation for this project and branch.
    pub fn start_development(&self, args: &StartDevelopmentArgs) -> FlowResult<PhaseResponse> {
        let identity = self.identity();
        let loaded = self.loader.load(args.workflow.as_deref());
        let def = &loaded.definition;

        let require_reviews = args.require_reviews.unwrap_or(self.config.workflow.require_reviews);
        let state = self.conversations.create_if_absent(&identity, def, require_reviews)?;
        if state.workflow_name != def.name() {
            tracing::warn!(
                conversation_id = %state.id,
                existing = %state.workflow_name,
                requested = def.name(),
                "Conversation already uses another workflow; reset to switch"
            );
        }

        let loaded = self.workflow_for(&state);
        let def = &loaded.definition;
        self.plans.ensure(&state.plan_file_path, &identity.project_name(), &identity.branch, def)?;

        // Rejoining a conversation that has moved on repeats its current phase.
        let current = self.current_phase(&state, &loaded);
        let result = if current == def.initial_phase() {
            self.engine.analyze(def, &AnalyzeRequest::default())
        } else {
            self.engine.explicit_transition(def, current, &def.phase(current).id, None)?
        };

        Ok(self.respond(&state, def.name(), None, result))
    }

    /// Analyze progress and advance when the plan shows the phase complete.
    ///
    /// Creates the conversation with the default workflow when none exists.
    pub fn whats_next(&self, args: &WhatsNextArgs) -> FlowResult<PhaseResponse> {
        let identity = self.identity();
        let state = match self.conversations.resolve(&identity) {
            Ok(state) => state,
            Err(FlowError::ConversationNotFound { .. }) => {
                let loaded = self.loader.load(None);
                self.conversations.create_if_absent(
                    &identity,
                    &loaded.definition,
                    self.config.workflow.require_reviews,
                )?
            }
            Err(e) => return Err(e),
        };
        let loaded = self.workflow_for(&state);
        let def = &loaded.definition;

        self.plans.ensure(&state.plan_file_path, &identity.project_name(), &identity.branch, def)?;
        let plan = self.plans.analyze_file(&state.plan_file_path);

        // A conversation that has already moved on is never restarted.
        let current = self.current_phase(&state, &loaded);
        let first_call =
            current == def.initial_phase() && self.conversations.is_first_call(&identity)?;
        let messages = args.message_texts();

        let mut result = self.engine.analyze(
            def,
            &AnalyzeRequest {
                current_phase: (!first_call).then_some(current),
                plan: Some(&plan),
                user_input: &args.user_input,
                context: &args.context,
                conversation_summary: &args.conversation_summary,
                recent_messages: &messages,
            },
        );

        if !first_call && self.review_pending(&state, &result) {
            tracing::info!(
                conversation_id = %state.id,
                from = %state.current_phase,
                to = %result.new_phase,
                "Automatic transition withheld pending review"
            );
            result = hold_for_review(def.phase(current).id.as_str(), current, result);
        }

        self.persist_phase(&identity, &state, &result)?;
        Ok(self.respond(&state, def.name(), Some(state.current_phase.as_str()), result))
    }

    /// Move to an explicitly requested phase.
    pub fn proceed_to_phase(&self, args: &ProceedArgs) -> FlowResult<PhaseResponse> {
        let identity = self.identity();
        let state = self.conversations.resolve(&identity)?;
        let loaded = self.workflow_for(&state);
        let def = &loaded.definition;

        let current = self.current_phase(&state, &loaded);
        let result =
            self.engine.explicit_transition(def, current, &args.target_phase, args.reason.as_deref())?;

        if args.review_state != ReviewState::Performed && self.review_pending(&state, &result) {
            tracing::info!(
                conversation_id = %state.id,
                from = %state.current_phase,
                to = %result.new_phase,
                "Transition withheld pending review"
            );
            return Err(FlowError::ReviewRequired {
                from: state.current_phase.clone(),
                to: result.new_phase,
            });
        }

        self.plans.ensure(&state.plan_file_path, &identity.project_name(), &identity.branch, def)?;
        self.persist_phase(&identity, &state, &result)?;
        Ok(self.respond(&state, def.name(), Some(state.current_phase.as_str()), result))
    }

    /// Review perspectives for a prospective transition. Changes nothing.
    pub fn conduct_review(&self, args: &ConductReviewArgs) -> FlowResult<Value> {
        let state = self.conversations.resolve(&self.identity())?;
        let loaded = self.workflow_for(&state);
        let def = &loaded.definition;

        let current = self.current_phase(&state, &loaded);
        let preview = self.engine.explicit_transition(def, current, &args.target_phase, None)?;

        let instructions = if preview.review_perspectives.is_empty() {
            format!(
                "No review is defined for {} → {}. Proceed with review_state 'not-required'.",
                state.current_phase, preview.new_phase
            )
        } else {
            let mut text = format!(
                "Review the work of the {} phase before moving to {}. Work through each perspective, report findings to the user, then call proceed_to_phase with review_state 'performed'.",
                state.current_phase, preview.new_phase
            );
            for p in &preview.review_perspectives {
                let prompt = self.instructions.substitute(&p.prompt, &state.plan_file_path);
                text.push_str(&format!("\n\n**{}:** {prompt}", p.perspective));
            }
            text
        };

        Ok(json!({
            "current_phase": state.current_phase,
            "target_phase": preview.new_phase,
            "review_required": state.require_reviews && !preview.review_perspectives.is_empty(),
            "perspectives": preview.review_perspectives,
            "instructions": instructions,
        }))
    }

    /// Delete the conversation after explicit confirmation.
    pub fn reset_development(&self, args: &ResetArgs) -> FlowResult<Value> {
        let outcome =
            self.conversations.reset(&self.identity(), args.confirm, args.reason.as_deref())?;
        Ok(serde_json::to_value(outcome)?)
    }

    /// Bundled and project workflows.
    pub fn list_workflows(&self) -> Value {
        json!({
            "default": self.config.workflow.default,
            "workflows": self.loader.list(),
        })
    }

    /// Snapshot of the conversation row.
    pub fn read_state(&self) -> FlowResult<Value> {
        let state = self.conversations.resolve(&self.identity())?;
        Ok(serde_json::to_value(state)?)
    }

    /// The plan document as markdown.
    pub fn read_plan(&self) -> FlowResult<String> {
        let state = self.conversations.resolve(&self.identity())?;
        let info = self.plans.info(&state.plan_file_path);
        Ok(info.content.unwrap_or_else(|| {
            format!("Plan file {} does not exist yet.", state.plan_file_path.display())
        }))
    }

    /// Summary of the active workflow (the conversation's, or the default).
    pub fn read_workflow(&self) -> FlowResult<Value> {
        let loaded = match self.conversations.resolve(&self.identity()) {
            Ok(state) => self.workflow_for(&state),
            Err(FlowError::ConversationNotFound { .. }) => self.loader.load(None),
            Err(e) => return Err(e),
        };
        let def = &loaded.definition;

        let phases: Vec<Value> = def
            .phases()
            .map(|(id, phase)| {
                let transitions: Vec<Value> = def
                    .transitions_from(id)
                    .iter()
                    .map(|t| json!({"trigger": t.trigger, "to": def.phase(t.to).id}))
                    .collect();
                json!({"id": phase.id, "description": phase.description, "transitions": transitions})
            })
            .collect();

        Ok(json!({
            "name": def.name(),
            "description": def.description(),
            "initial_phase": def.phase(def.initial_phase()).id,
            "requires_documentation": def.requires_documentation(),
            "domain": def.domain(),
            "source": loaded.source,
            "phases": phases,
        }))
    }

    fn identity(&self) -> ConversationIdentity {
        ConversationIdentity::derive(&self.project_path)
    }

    fn workflow_for(&self, state: &ConversationState) -> LoadedWorkflow {
        let loaded = self.loader.load(Some(&state.workflow_name));
        if loaded.source == WorkflowSource::Fallback {
            tracing::warn!(
                conversation_id = %state.id,
                workflow = %state.workflow_name,
                "Conversation workflow unavailable, using fallback"
            );
        }
        loaded
    }

    /// Stored phase, or the initial phase when the workflow no longer has it.
    fn current_phase(&self, state: &ConversationState, loaded: &LoadedWorkflow) -> PhaseId {
        let def = &loaded.definition;
        def.phase_id(&state.current_phase).unwrap_or_else(|| {
            tracing::warn!(
                conversation_id = %state.id,
                phase = %state.current_phase,
                workflow = def.name(),
                "Stored phase not in workflow, using initial phase"
            );
            def.initial_phase()
        })
    }

    /// Whether `result` leaves the phase along an edge that needs a review first.
    fn review_pending(&self, state: &ConversationState, result: &TransitionResult) -> bool {
        state.require_reviews && result.phase_changed && !result.review_perspectives.is_empty()
    }

    fn persist_phase(
        &self,
        identity: &ConversationIdentity,
        state: &ConversationState,
        result: &TransitionResult,
    ) -> FlowResult<()> {
        if result.new_phase == state.current_phase {
            return Ok(());
        }
        self.conversations.update(identity, &ConversationUpdate::phase(&result.new_phase))
    }

    fn respond(
        &self,
        state: &ConversationState,
        workflow: &str,
        previous: Option<&str>,
        result: TransitionResult,
    ) -> PhaseResponse {
        let plan_file_exists = state.plan_file_path.exists();
        let instructions = self.instructions.render(
            &result.instructions,
            &RenderContext {
                phase: &result.new_phase,
                previous_phase: previous,
                transition_reason: &result.transition_reason,
                is_modeled: result.is_modeled,
                plan_file_path: &state.plan_file_path,
                plan_file_exists,
            },
        );

        PhaseResponse {
            phase: result.new_phase,
            instructions,
            plan_file_path: state.plan_file_path.clone(),
            is_modeled: result.is_modeled,
            transition_reason: result.transition_reason,
            review_perspectives: result.review_perspectives,
            workflow: workflow.to_string(),
        }
    }
}

/// Keep the conversation in `phase` and point the assistant at the review
/// that must happen before `withheld` can be taken.
fn hold_for_review(phase: &str, current: PhaseId, withheld: TransitionResult) -> TransitionResult {
    let target = withheld.new_phase;
    TransitionResult {
        phase: current,
        new_phase: phase.to_string(),
        instructions: format!(
            "The {phase} phase is complete, but a review is required before moving to {target}. Call conduct_review with target_phase '{target}', work through each perspective with the user, then call proceed_to_phase with target_phase '{target}' and review_state 'performed'."
        ),
        transition_reason: format!("Review required before moving from {phase} to {target}"),
        is_modeled: withheld.is_modeled,
        phase_changed: false,
        review_perspectives: withheld.review_perspectives,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn handler(temp: &TempDir) -> ToolHandler {
        ToolHandler::with_store(temp.path(), Config::default(), StateStore::open_in_memory().unwrap())
    }

    #[test]
    fn test_whats_next_creates_conversation() {
        let temp = TempDir::new().unwrap();
        let h = handler(&temp);
        let args = WhatsNextArgs { user_input: "implement search".to_string(), ..Default::default() };
        let r = h.whats_next(&args).unwrap();

        assert_eq!(r.phase, "requirements");
        assert!(!r.is_modeled);
        assert!(r.transition_reason.contains("New feature"));
        assert!(r.plan_file_path.exists());
    }

    #[test]
    fn test_proceed_before_start() {
        let temp = TempDir::new().unwrap();
        let args = ProceedArgs {
            target_phase: "design".to_string(),
            reason: None,
            review_state: ReviewState::NotRequired,
        };
        let err = handler(&temp).proceed_to_phase(&args).unwrap_err();
        assert!(matches!(err, FlowError::ConversationNotFound { .. }));
    }

    #[test]
    fn test_start_creates_plan() {
        let temp = TempDir::new().unwrap();
        let h = handler(&temp);
        let r = h.start_development(&StartDevelopmentArgs::default()).unwrap();

        assert_eq!(r.phase, "requirements");
        assert_eq!(r.workflow, "waterfall");
        assert!(r.plan_file_path.exists());
        assert!(r.instructions.contains("**Plan File:**"));
    }

    #[test]
    fn test_advance_after_plan_complete() {
        let temp = TempDir::new().unwrap();
        let h = handler(&temp);
        let start = h.call_tool(START_DEVELOPMENT, None).unwrap();
        let plan_path = PathBuf::from(start["plan_file_path"].as_str().unwrap());

        std::fs::write(&plan_path, "## Requirements\n- [x] gather\n- [x] confirm\n").unwrap();
        let next = h.call_tool(WHATS_NEXT, Some(json!({"user_input": "done"}))).unwrap();

        assert_eq!(next["phase"], "design");
        assert_eq!(next["is_modeled"], true);
        assert_eq!(h.read_state().unwrap()["current_phase"], "design");
    }

    #[test]
    fn test_completed_phase_waits_for_review() {
        let temp = TempDir::new().unwrap();
        let h = handler(&temp);
        let start = h.call_tool(START_DEVELOPMENT, Some(json!({"require_reviews": true}))).unwrap();
        let plan_path = PathBuf::from(start["plan_file_path"].as_str().unwrap());

        std::fs::write(&plan_path, "## Requirements\n- [x] gather\n- [x] confirm\n").unwrap();
        let next = h.call_tool(WHATS_NEXT, Some(json!({"user_input": "done"}))).unwrap();

        assert_eq!(next["phase"], "requirements");
        assert!(next["instructions"].as_str().unwrap().contains("conduct_review"));
        assert!(!next["review_perspectives"].as_array().unwrap().is_empty());
        assert_eq!(h.read_state().unwrap()["current_phase"], "requirements");

        let done = h
            .call_tool(
                PROCEED_TO_PHASE,
                Some(json!({"target_phase": "design", "review_state": "performed"})),
            )
            .unwrap();
        assert_eq!(done["phase"], "design");
        assert_eq!(h.read_state().unwrap()["current_phase"], "design");
    }

    #[test]
    fn test_whats_next_keeps_later_phase_without_logs() {
        let temp = TempDir::new().unwrap();
        let h = handler(&temp);
        h.start_development(&StartDevelopmentArgs::default()).unwrap();
        h.conversations.update(&h.identity(), &ConversationUpdate::phase("design")).unwrap();
        assert!(h.conversations.is_first_call(&h.identity()).unwrap());

        let r = h.whats_next(&WhatsNextArgs::default()).unwrap();
        assert_eq!(r.phase, "design");
        assert_eq!(h.read_state().unwrap()["current_phase"], "design");
    }

    #[test]
    fn test_custom_workflow_with_other_inner_name() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join(crate::PROJECT_DIR);
        std::fs::create_dir_all(&base).unwrap();
        std::fs::write(
            base.join("workflow.yaml"),
            "name: team-flow\ninitial_state: draft\nstates:\n  draft:\n    description: Draft it\n    transitions:\n      - trigger: drafted\n        to: publish\n  publish:\n    description: Ship it\n",
        )
        .unwrap();
        let h = handler(&temp);

        let start = h.call_tool(START_DEVELOPMENT, Some(json!({"workflow": "custom"}))).unwrap();
        assert_eq!(start["phase"], "draft");
        assert_eq!(start["workflow"], "team-flow");

        let next = h.call_tool(WHATS_NEXT, None).unwrap();
        assert_eq!(next["phase"], "draft");
        assert_eq!(next["workflow"], "team-flow");

        let moved = h.call_tool(PROCEED_TO_PHASE, Some(json!({"target_phase": "publish"}))).unwrap();
        assert_eq!(moved["phase"], "publish");
        assert_eq!(h.read_workflow().unwrap()["name"], "team-flow");
    }

    #[test]
    fn test_proceed_invalid_target_leaves_state() {
        let temp = TempDir::new().unwrap();
        let h = handler(&temp);
        h.call_tool(START_DEVELOPMENT, None).unwrap();

        let err = h
            .call_tool(PROCEED_TO_PHASE, Some(json!({"target_phase": "deploy"})))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidTargetPhase");
        assert_eq!(h.read_state().unwrap()["current_phase"], "requirements");
    }

    #[test]
    fn test_review_gate() {
        let temp = TempDir::new().unwrap();
        let h = handler(&temp);
        h.call_tool(START_DEVELOPMENT, Some(json!({"require_reviews": true}))).unwrap();

        let err = h
            .call_tool(PROCEED_TO_PHASE, Some(json!({"target_phase": "design"})))
            .unwrap_err();
        assert_eq!(err.kind(), "ReviewRequired");
        assert_eq!(h.read_state().unwrap()["current_phase"], "requirements");

        let review = h.call_tool(CONDUCT_REVIEW, Some(json!({"target_phase": "design"}))).unwrap();
        assert_eq!(review["review_required"], true);
        assert!(!review["perspectives"].as_array().unwrap().is_empty());

        let done = h
            .call_tool(
                PROCEED_TO_PHASE,
                Some(json!({"target_phase": "design", "review_state": "performed"})),
            )
            .unwrap();
        assert_eq!(done["phase"], "design");
    }

    #[test]
    fn test_reset_then_state_missing() {
        let temp = TempDir::new().unwrap();
        let h = handler(&temp);
        h.call_tool(START_DEVELOPMENT, None).unwrap();

        let err = h.call_tool(RESET_DEVELOPMENT, None).unwrap_err();
        assert_eq!(err.kind(), "ResetNotConfirmed");
        assert!(h.read_state().is_ok());

        h.call_tool(RESET_DEVELOPMENT, Some(json!({"confirm": true}))).unwrap();
        assert!(matches!(h.read_state(), Err(FlowError::ConversationNotFound { .. })));
    }

    #[test]
    fn test_unknown_tool() {
        let temp = TempDir::new().unwrap();
        let err = handler(&temp).call_tool("deploy", None).unwrap_err();
        assert_eq!(err.kind(), "UnknownTool");
    }

    #[test]
    fn test_read_workflow_without_conversation() {
        let temp = TempDir::new().unwrap();
        let summary = handler(&temp).read_workflow().unwrap();
        assert_eq!(summary["name"], "waterfall");
        assert_eq!(summary["initial_phase"], "requirements");
        assert_eq!(summary["requires_documentation"], true);
        assert_eq!(summary["phases"].as_array().unwrap().len(), 6);
    }
}
