//! Conversation lifecycle on top of [`StateStore`].

use chrono::Utc;
use serde::Serialize;

use super::identity::ConversationIdentity;
use super::store::{ConversationState, ConversationUpdate, StateStore};
use crate::error::{FlowError, FlowResult};
use crate::plan::PlanManager;
use crate::workflow::WorkflowDefinition;

/// What a reset removed.
#[derive(Debug, Clone, Serialize)]
pub struct ResetOutcome {
    /// Human-readable list of removed items
    pub reset_items: Vec<String>,
    /// Summary message
    pub message: String,
}

/// Resolves, creates, updates and resets conversations.
pub struct ConversationManager {
    store: StateStore,
}

impl ConversationManager {
    /// Wrap a store.
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Conversation for an identity, or [`FlowError::ConversationNotFound`].
    pub fn resolve(&self, identity: &ConversationIdentity) -> FlowResult<ConversationState> {
        tracing::debug!(conversation_id = %identity.id, "Resolving conversation");
        self.store.get(&identity.id)?.ok_or_else(|| FlowError::ConversationNotFound {
            project_path: identity.project_path.clone(),
            branch: identity.branch.clone(),
        })
    }

    /// Existing conversation, or a new one starting in the definition's
    /// initial phase.
    ///
    /// Only creation assigns the phase and plan path. An existing row is
    /// returned as-is even if `definition` names a different workflow.
    pub fn create_if_absent(
        &self,
        identity: &ConversationIdentity,
        definition: &WorkflowDefinition,
        require_reviews: bool,
    ) -> FlowResult<ConversationState> {
        if let Some(existing) = self.store.get(&identity.id)? {
            return Ok(existing);
        }

        let now = Utc::now();
        let state = ConversationState {
            id: identity.id.clone(),
            project_path: identity.project_path.clone(),
            branch: identity.branch.clone(),
            current_phase: definition.phase(definition.initial_phase()).id.clone(),
            workflow_name: definition.name().to_string(),
            plan_file_path: identity.plan_file_path(),
            require_reviews,
            created_at: now,
            updated_at: now,
        };

        if self.store.insert_if_absent(&state)? {
            tracing::info!(
                conversation_id = %state.id,
                workflow = %state.workflow_name,
                phase = %state.current_phase,
                "Created conversation"
            );
            return Ok(state);
        }

        // Lost a race with another writer; theirs wins.
        self.resolve(identity)
    }

    /// Apply a partial update.
    pub fn update(&self, identity: &ConversationIdentity, update: &ConversationUpdate) -> FlowResult<()> {
        if !self.store.update(&identity.id, update)? {
            return Err(FlowError::ConversationNotFound {
                project_path: identity.project_path.clone(),
                branch: identity.branch.clone(),
            });
        }
        if let Some(phase) = &update.current_phase {
            tracing::info!(conversation_id = %identity.id, phase = %phase, "Updated conversation phase");
        }
        Ok(())
    }

    /// Delete the conversation and its plan file, and mark its interaction
    /// logs as reset.
    ///
    /// Nothing is touched unless `confirmed` is set.
    pub fn reset(
        &self,
        identity: &ConversationIdentity,
        confirmed: bool,
        reason: Option<&str>,
    ) -> FlowResult<ResetOutcome> {
        if !confirmed {
            return Err(FlowError::ResetNotConfirmed);
        }

        let mut reset_items = Vec::new();

        let marked = self.store.soft_delete_interactions(&identity.id)?;
        if marked > 0 {
            reset_items.push(format!("interaction_logs ({marked} marked as reset)"));
        }

        let plan_path = match self.store.get(&identity.id)? {
            Some(state) => state.plan_file_path,
            None => identity.plan_file_path(),
        };

        if self.store.delete_conversation(&identity.id)? {
            reset_items.push("conversation_state".to_string());
        }

        if PlanManager::new().delete(&plan_path)? {
            reset_items.push(format!("plan_file ({})", plan_path.display()));
        }

        let message = match reason {
            Some(reason) if !reason.trim().is_empty() => {
                format!("Reset development conversation: {}", reason.trim())
            }
            _ => "Reset development conversation".to_string(),
        };

        tracing::info!(
            conversation_id = %identity.id,
            items = reset_items.len(),
            reason = reason.unwrap_or(""),
            "Conversation reset"
        );

        Ok(ResetOutcome { reset_items, message })
    }

    /// Whether no live interaction has been logged for this conversation.
    pub fn is_first_call(&self, identity: &ConversationIdentity) -> FlowResult<bool> {
        Ok(self.store.interaction_count(&identity.id)? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::default_definition;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ConversationManager, ConversationIdentity) {
        let temp = TempDir::new().unwrap();
        let manager = ConversationManager::new(StateStore::open_in_memory().unwrap());
        let identity = ConversationIdentity::with_branch(temp.path(), "main");
        (temp, manager, identity)
    }

    #[test]
    fn test_resolve_missing() {
        let (_temp, manager, identity) = setup();
        let err = manager.resolve(&identity).unwrap_err();
        assert!(matches!(err, FlowError::ConversationNotFound { .. }));
    }

    #[test]
    fn test_create_assigns_initial_phase() {
        let (_temp, manager, identity) = setup();
        let def = default_definition();

        let state = manager.create_if_absent(&identity, &def, false).unwrap();
        assert_eq!(state.current_phase, "requirements");
        assert_eq!(state.workflow_name, "waterfall");
        assert_eq!(state.plan_file_path, identity.plan_file_path());
    }

    #[test]
    fn test_create_is_idempotent() {
        let (_temp, manager, identity) = setup();
        let def = default_definition();

        manager.create_if_absent(&identity, &def, false).unwrap();
        manager.update(&identity, &ConversationUpdate::phase("design")).unwrap();

        let again = manager.create_if_absent(&identity, &def, false).unwrap();
        assert_eq!(again.current_phase, "design");
    }

    #[test]
    fn test_update_missing_conversation() {
        let (_temp, manager, identity) = setup();
        let err = manager.update(&identity, &ConversationUpdate::phase("design")).unwrap_err();
        assert!(matches!(err, FlowError::ConversationNotFound { .. }));
    }

    #[test]
    fn test_reset_requires_confirmation() {
        let (_temp, manager, identity) = setup();
        let def = default_definition();
        manager.create_if_absent(&identity, &def, false).unwrap();
        manager.update(&identity, &ConversationUpdate::phase("design")).unwrap();

        let err = manager.reset(&identity, false, None).unwrap_err();
        assert!(matches!(err, FlowError::ResetNotConfirmed));
        assert_eq!(manager.resolve(&identity).unwrap().current_phase, "design");
    }

    #[test]
    fn test_reset_deletes_state_and_plan() {
        let (_temp, manager, identity) = setup();
        let def = default_definition();
        let state = manager.create_if_absent(&identity, &def, false).unwrap();

        std::fs::create_dir_all(state.plan_file_path.parent().unwrap()).unwrap();
        std::fs::write(&state.plan_file_path, "# Plan\n").unwrap();
        manager.store().log_interaction(&identity.id, "whats_next", &json!({}), &json!({}), "requirements")
            .unwrap();

        let outcome = manager.reset(&identity, true, Some("starting over")).unwrap();
        assert_eq!(outcome.reset_items.len(), 3);
        assert!(outcome.message.contains("starting over"));
        assert!(!state.plan_file_path.exists());

        let err = manager.resolve(&identity).unwrap_err();
        assert!(matches!(err, FlowError::ConversationNotFound { .. }));

        assert!(manager.is_first_call(&identity).unwrap());
        assert_eq!(manager.store().interactions(&identity.id, true).unwrap().len(), 1);
    }

    #[test]
    fn test_reset_without_plan_file() {
        let (_temp, manager, identity) = setup();
        manager.create_if_absent(&identity, &default_definition(), false).unwrap();

        let outcome = manager.reset(&identity, true, None).unwrap();
        assert_eq!(outcome.reset_items, vec!["conversation_state".to_string()]);
        assert_eq!(outcome.message, "Reset development conversation");
    }

    #[test]
    fn test_first_call_tracking() {
        let (_temp, manager, identity) = setup();
        assert!(manager.is_first_call(&identity).unwrap());
        manager.store().log_interaction(&identity.id, "whats_next", &json!({}), &json!({}), "requirements")
            .unwrap();
        assert!(!manager.is_first_call(&identity).unwrap());
    }
}
