//! Transition engine.
//!
//! Decides which phase a conversation is in after each call, either from
//! plan progress ([`TransitionEngine::analyze`]) or on explicit request
//! ([`TransitionEngine::explicit_transition`]). The engine never touches
//! storage; callers persist the result.

mod detection;
mod transition;

pub use detection::is_new_feature_request;
pub use transition::{AnalyzeRequest, TransitionEngine, TransitionResult};
