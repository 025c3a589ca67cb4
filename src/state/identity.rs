//! Conversation identity.
//!
//! A conversation is identified by the project directory and the branch
//! checked out in it. The id is a pure function of those two values, so it
//! is the same across restarts and no lookup is needed to find it.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::PROJECT_DIR;

/// Branch name used outside version control or on a detached HEAD.
pub const DEFAULT_BRANCH: &str = "default";

/// Branches whose plan file carries no branch suffix.
const PRIMARY_BRANCHES: &[&str] = &["main", "master", DEFAULT_BRANCH];

/// The (project path, branch) pair a conversation belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationIdentity {
    /// Conversation id derived from path and branch
    pub id: String,
    /// Absolute project path
    pub project_path: PathBuf,
    /// Current branch
    pub branch: String,
}

impl ConversationIdentity {
    /// Identity for a project, detecting the checked-out branch.
    pub fn derive(project_path: &Path) -> Self {
        let project_path = absolute(project_path);
        let branch = detect_branch(&project_path);
        Self::from_parts(project_path, branch)
    }

    /// Identity for an explicit branch.
    pub fn with_branch(project_path: &Path, branch: impl Into<String>) -> Self {
        Self::from_parts(absolute(project_path), branch.into())
    }

    fn from_parts(project_path: PathBuf, branch: String) -> Self {
        let branch = if branch.trim().is_empty() { DEFAULT_BRANCH.to_string() } else { branch };
        let id = conversation_id(&project_path, &branch);
        Self { id, project_path, branch }
    }

    /// Where this conversation's plan document lives.
    ///
    /// Deterministic, so a re-derived identity always finds the same file.
    pub fn plan_file_path(&self) -> PathBuf {
        let dir = self.project_path.join(PROJECT_DIR);
        if PRIMARY_BRANCHES.contains(&self.branch.as_str()) {
            dir.join("development-plan.md")
        } else {
            dir.join(format!("development-plan-{}.md", slugify(&self.branch)))
        }
    }

    /// Project directory name, for display.
    pub fn project_name(&self) -> String {
        self.project_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("project")
            .to_string()
    }
}

/// Stable conversation id for a path and branch.
pub fn conversation_id(project_path: &Path, branch: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project_path.to_string_lossy().as_bytes());
    hasher.update([0u8]);
    hasher.update(branch.as_bytes());
    let digest = hasher.finalize();
    let short: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();

    let name = project_path.file_name().and_then(|n| n.to_str()).unwrap_or("project");
    format!("{}-{}-{short}", slugify(name), slugify(branch))
}

/// Current branch of the repository containing `path`, or [`DEFAULT_BRANCH`].
#[cfg(feature = "git")]
pub fn detect_branch(path: &Path) -> String {
    let Ok(repo) = git2::Repository::discover(path) else {
        tracing::debug!(path = ?path, "Not a git repository");
        return DEFAULT_BRANCH.to_string();
    };

    let branch = match repo.head() {
        Ok(head) if head.is_branch() => head.shorthand().map(String::from),
        Ok(_) => None,
        // Unborn branch: HEAD points at a ref that has no commit yet.
        Err(_) => repo
            .find_reference("HEAD")
            .ok()
            .and_then(|r| r.symbolic_target().map(String::from))
            .and_then(|t| t.strip_prefix("refs/heads/").map(String::from)),
    };

    branch.unwrap_or_else(|| DEFAULT_BRANCH.to_string())
}

/// Current branch of the repository containing `path`, or [`DEFAULT_BRANCH`].
#[cfg(not(feature = "git"))]
pub fn detect_branch(_path: &Path) -> String {
    DEFAULT_BRANCH.to_string()
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn slugify(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
