//! Plan documents.
//!
//! The plan is a markdown file with one `##` section per phase and checkbox
//! task lists. Progress is never stored; it is recomputed from the file on
//! every read.

mod analysis;
mod manager;

pub use analysis::{analyze, PlanAnalysis, SectionProgress};
pub use manager::{render_template, PlanInfo, PlanManager};
