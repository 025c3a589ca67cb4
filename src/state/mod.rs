//! Conversation identity and persistence.
//!
//! A conversation is the unit of tracked progress: one per project
//! directory and branch. Its row records the active phase, workflow and
//! plan file; interaction logs record every handled tool call.

mod identity;
mod manager;
mod store;

pub use identity::{conversation_id, detect_branch, ConversationIdentity, DEFAULT_BRANCH};
pub use manager::{ConversationManager, ResetOutcome};
pub use store::{ConversationState, ConversationUpdate, InteractionLog, StateStore};
