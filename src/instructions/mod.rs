//! Instruction rendering.
//!
//! Workflow instructions may reference project documents through tokens
//! (`$ARCHITECTURE_DOC`, `$REQUIREMENTS_DOC`, `$DESIGN_DOC`, `$PLAN_FILE`).
//! Known tokens become absolute paths; anything else that looks like a
//! token is left exactly as written.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::core::{DocumentsConfig, GitConfig};

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$([A-Z][A-Z0-9_]*)").expect("token pattern is valid"));

/// Per-call inputs to [`InstructionGenerator::render`].
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    /// Phase the instructions belong to
    pub phase: &'a str,
    /// Phase being left, when the phase changed
    pub previous_phase: Option<&'a str>,
    /// Why the phase was chosen
    pub transition_reason: &'a str,
    /// Whether a modeled edge was followed
    pub is_modeled: bool,
    /// Plan document location
    pub plan_file_path: &'a Path,
    /// Whether the plan document exists
    pub plan_file_exists: bool,
}

/// Renders raw workflow instructions for one project.
#[derive(Debug, Clone)]
pub struct InstructionGenerator {
    architecture_doc: PathBuf,
    requirements_doc: PathBuf,
    design_doc: PathBuf,
    commit_template: Option<String>,
}

impl InstructionGenerator {
    /// Create a generator for a project.
    pub fn new(project_path: &Path, documents: &DocumentsConfig, git: &GitConfig) -> Self {
        Self {
            architecture_doc: documents.architecture_path(project_path),
            requirements_doc: documents.requirements_path(project_path),
            design_doc: documents.design_path(project_path),
            commit_template: git
                .commit_on_transition
                .then(|| git.commit_message_template.clone()),
        }
    }

    /// Substitute tokens and append the plan and commit notes.
    pub fn render(&self, raw: &str, ctx: &RenderContext<'_>) -> String {
        let mut out = self.substitute(raw.trim(), ctx.plan_file_path);

        out.push_str("\n\n");
        if ctx.plan_file_exists {
            out.push_str(&format!(
                "**Plan File:** Track progress for the {} phase in `{}`. Mark tasks `- [x]` as you finish them and record important decisions in the Decision Log.",
                ctx.phase,
                ctx.plan_file_path.display()
            ));
        } else {
            out.push_str(&format!(
                "**Plan File:** `{}` does not exist yet. Create it with a section for the {} phase before continuing.",
                ctx.plan_file_path.display(),
                ctx.phase
            ));
        }

        if let (Some(template), Some(previous)) = (&self.commit_template, ctx.previous_phase) {
            if previous != ctx.phase {
                let message = template.replace("{phase}", previous);
                out.push_str(&format!(
                    "\n\n**Git Commit:** Before starting work in the {} phase, commit the current changes with message: `{message}`",
                    ctx.phase
                ));
            }
        }

        out
    }

    /// Replace known document tokens. Unknown tokens stay verbatim.
    pub fn substitute(&self, raw: &str, plan_file_path: &Path) -> String {
        TOKEN
            .replace_all(raw, |caps: &Captures<'_>| {
                let path: &Path = match &caps[1] {
                    "ARCHITECTURE_DOC" => &self.architecture_doc,
                    "REQUIREMENTS_DOC" => &self.requirements_doc,
                    "DESIGN_DOC" => &self.design_doc,
                    "PLAN_FILE" => plan_file_path,
                    _ => return caps[0].to_string(),
                };
                path.display().to_string()
            })
            .into_owned()
    }
}
