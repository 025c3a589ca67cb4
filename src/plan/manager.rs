//! Plan document files.

use std::fs;
use std::path::Path;

use serde::Serialize;

use super::analysis::{analyze, PlanAnalysis};
use crate::error::FlowResult;
use crate::workflow::WorkflowDefinition;

/// Snapshot of a plan file.
#[derive(Debug, Clone, Serialize)]
pub struct PlanInfo {
    /// Whether the file exists
    pub exists: bool,
    /// File content, when it exists and is readable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Creates, reads and deletes plan documents.
///
/// Holds no state: every call goes back to disk, so edits made outside
/// devflow are always seen.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanManager;

impl PlanManager {
    /// Create a manager.
    pub fn new() -> Self {
        Self
    }

    /// Write the plan template unless the file already exists.
    ///
    /// Returns `true` when a new file was created.
    pub fn ensure(
        &self,
        path: &Path,
        project_name: &str,
        branch: &str,
        definition: &WorkflowDefinition,
    ) -> FlowResult<bool> {
        if path.exists() {
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, render_template(project_name, branch, definition))?;
        tracing::info!(path = ?path, workflow = definition.name(), "Created plan document");
        Ok(true)
    }

    /// Whether the plan exists, and its content.
    pub fn info(&self, path: &Path) -> PlanInfo {
        match fs::read_to_string(path) {
            Ok(content) => PlanInfo { exists: true, content: Some(content) },
            Err(e) => {
                if path.exists() {
                    tracing::warn!(path = ?path, error = %e, "Plan document unreadable");
                }
                PlanInfo { exists: path.exists(), content: None }
            }
        }
    }

    /// Analyse the plan file. Missing or unreadable files analyse as empty.
    pub fn analyze_file(&self, path: &Path) -> PlanAnalysis {
        self.info(path).content.map(|c| analyze(&c)).unwrap_or_default()
    }

    /// Remove the plan file. Returns whether a file was removed.
    pub fn delete(&self, path: &Path) -> FlowResult<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Plan scaffold: one section per phase, then decision log and notes.
pub fn render_template(project_name: &str, branch: &str, definition: &WorkflowDefinition) -> String {
    let mut md = format!("# Development Plan: {project_name} ({branch} branch)\n\n");
    md.push_str(&format!(
        "*Generated on {} by devflow ({} workflow)*\n\n",
        chrono::Utc::now().format("%Y-%m-%d"),
        definition.name()
    ));

    md.push_str("## Goal\n\n_Describe what this development effort should achieve._\n\n");

    for (_, phase) in definition.phases() {
        md.push_str(&format!("## {}\n\n", phase_heading(&phase.id)));
        if !phase.description.is_empty() {
            md.push_str(&format!("_{}_\n\n", phase.description.trim()));
        }
        md.push_str("### Tasks\n\n_Add tasks as they are identified._\n\n");
        md.push_str("### Completed\n\n_Tick tasks as they are finished._\n\n");
    }

    md.push_str("## Decision Log\n\n_Record important decisions here._\n\n");
    md.push_str("## Notes\n\n_Additional context and observations._\n");
    md
}

/// `code_review` → `Code Review`.
fn phase_heading(id: &str) -> String {
    id.split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::default_definition;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_creates_once() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".devflow").join("development-plan.md");
        let manager = PlanManager::new();
        let def = default_definition();

        assert!(manager.ensure(&path, "app", "main", &def).unwrap());
        fs::write(&path, "## Requirements\n- [x] edited by hand\n").unwrap();
        assert!(!manager.ensure(&path, "app", "main", &def).unwrap());

        let content = manager.info(&path).content.unwrap();
        assert!(content.contains("edited by hand"));
    }

    #[test]
    fn test_template_has_phase_sections() {
        let def = default_definition();
        let md = render_template("app", "feature-x", &def);

        assert!(md.starts_with("# Development Plan: app (feature-x branch)"));
        for heading in ["## Requirements", "## Design", "## Implementation", "## Qa", "## Testing"] {
            assert!(md.contains(heading), "missing {heading}");
        }
        assert!(md.contains("## Decision Log"));
        assert!(md.contains("## Notes"));

        let analysis = analyze(&md);
        assert_eq!(analysis.tasks_total, 0);
        assert!(analysis.decisions.is_empty());
        assert!(analysis.phase_progress("qa").is_some());
    }

    #[test]
    fn test_info_missing_file() {
        let temp = TempDir::new().unwrap();
        let info = PlanManager::new().info(&temp.path().join("nope.md"));
        assert!(!info.exists);
        assert!(info.content.is_none());
    }

    #[test]
    fn test_analyze_file_reads_current_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("plan.md");
        let manager = PlanManager::new();

        fs::write(&path, "## Design\n- [ ] api\n").unwrap();
        assert!(!manager.analyze_file(&path).is_phase_complete("design"));

        fs::write(&path, "## Design\n- [x] api\n").unwrap();
        assert!(manager.analyze_file(&path).is_phase_complete("design"));
    }

    #[test]
    fn test_delete() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("plan.md");
        fs::write(&path, "x").unwrap();
        let manager = PlanManager::new();
        assert!(manager.delete(&path).unwrap());
        assert!(!manager.delete(&path).unwrap());
    }

    #[test]
    fn test_phase_heading() {
        assert_eq!(phase_heading("code_review"), "Code Review");
        assert_eq!(phase_heading("qa"), "Qa");
    }
}
