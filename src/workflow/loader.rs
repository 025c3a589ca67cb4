//! Workflow resolution.
//!
//! Resolves a workflow name to a validated definition: project override
//! first, then bundled workflows, then the bundled default. Loading never
//! fails; a broken override is logged and replaced by the default.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use super::bundled::{bundled_names, bundled_source, default_definition, DEFAULT_WORKFLOW};
use super::definition::{DefinitionError, WorkflowDefinition};
use crate::PROJECT_DIR;

/// Directory under [`PROJECT_DIR`] holding one file per workflow.
const WORKFLOWS_DIR: &str = "workflows";

/// Legacy single-file override names, checked in order.
const LEGACY_FILES: &[&str] = &["workflow.yaml", "workflow.yml"];

/// Name a migrated legacy override is stored under.
pub const CUSTOM_WORKFLOW: &str = "custom";

/// Where a loaded definition came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "lowercase")]
pub enum WorkflowSource {
    /// A project-local override file
    Project(PathBuf),
    /// A workflow compiled into the binary
    Bundled,
    /// The bundled default, used because the requested workflow was unusable
    Fallback,
}

/// Result of [`WorkflowLoader::load`].
#[derive(Debug, Clone)]
pub struct LoadedWorkflow {
    /// The definition to use
    pub definition: Arc<WorkflowDefinition>,
    /// Where it came from
    pub source: WorkflowSource,
}

/// Summary of an available workflow.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowInfo {
    /// Workflow name
    pub name: String,
    /// Description
    pub description: String,
    /// Phase ids in declaration order
    pub phases: Vec<String>,
    /// `bundled` or `project`
    pub source: &'static str,
}

impl WorkflowInfo {
    fn from_definition(def: &WorkflowDefinition, source: &'static str) -> Self {
        Self {
            name: def.name().to_string(),
            description: def.description().to_string(),
            phases: def.phase_names().into_iter().map(String::from).collect(),
            source,
        }
    }
}

/// Loads workflow definitions for one project.
#[derive(Debug, Clone)]
pub struct WorkflowLoader {
    project_path: PathBuf,
    default_name: String,
}

impl WorkflowLoader {
    /// Create a loader for a project directory.
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self { project_path: project_path.into(), default_name: DEFAULT_WORKFLOW.to_string() }
    }

    /// Use a different workflow when no name is given.
    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default_name = name.into();
        self
    }

    /// Directory holding project workflow overrides.
    pub fn workflows_dir(&self) -> PathBuf {
        self.project_path.join(PROJECT_DIR).join(WORKFLOWS_DIR)
    }

    /// Resolve a workflow by name, or the configured default.
    pub fn load(&self, name: Option<&str>) -> LoadedWorkflow {
        self.migrate_legacy();

        let name = name.map(str::trim).filter(|n| !n.is_empty()).unwrap_or(self.default_name.as_str());

        if let Some(loaded) = self.resolve(name) {
            return loaded;
        }

        if name != self.default_name {
            tracing::warn!(workflow = name, "Unknown workflow, using default");
            if let Some(loaded) = self.resolve(&self.default_name) {
                return LoadedWorkflow { source: WorkflowSource::Fallback, ..loaded };
            }
        }

        tracing::warn!(workflow = name, "Falling back to bundled default workflow");
        LoadedWorkflow { definition: default_definition(), source: WorkflowSource::Fallback }
    }

    /// Project override, then bundled. `None` when the name is unknown.
    fn resolve(&self, name: &str) -> Option<LoadedWorkflow> {
        if !is_safe_name(name) {
            tracing::warn!(workflow = name, "Rejecting workflow name with path components");
            return None;
        }

        if let Some(path) = self.project_file(name) {
            return Some(match load_file(&path) {
                Ok(def) => {
                    tracing::debug!(workflow = name, path = ?path, "Loaded project workflow");
                    LoadedWorkflow { definition: Arc::new(def), source: WorkflowSource::Project(path) }
                }
                Err(e) => {
                    tracing::error!(
                        workflow = name,
                        path = ?path,
                        error = %e,
                        "Workflow validation failed, using default"
                    );
                    LoadedWorkflow { definition: default_definition(), source: WorkflowSource::Fallback }
                }
            });
        }

        if let Some((path, def)) = self.project_file_named(name) {
            tracing::debug!(workflow = name, path = ?path, "Loaded project workflow by name");
            return Some(LoadedWorkflow {
                definition: Arc::new(def),
                source: WorkflowSource::Project(path),
            });
        }

        let source = bundled_source(name)?;
        if name == DEFAULT_WORKFLOW {
            return Some(LoadedWorkflow {
                definition: default_definition(),
                source: WorkflowSource::Bundled,
            });
        }
        match WorkflowDefinition::from_yaml(source) {
            Ok(def) => {
                Some(LoadedWorkflow { definition: Arc::new(def), source: WorkflowSource::Bundled })
            }
            Err(e) => {
                tracing::error!(workflow = name, error = %e, "Bundled workflow is invalid");
                None
            }
        }
    }

    /// Override file for a workflow name, if one exists.
    fn project_file(&self, name: &str) -> Option<PathBuf> {
        let dir = self.workflows_dir();
        ["yaml", "yml"].iter().map(|ext| dir.join(format!("{name}.{ext}"))).find(|p| p.is_file())
    }

    /// Valid override whose `name:` is `name`, whatever its file is called.
    fn project_file_named(&self, name: &str) -> Option<(PathBuf, WorkflowDefinition)> {
        self.project_files()
            .into_iter()
            .filter_map(|path| load_file(&path).ok().map(|def| (path, def)))
            .find(|(_, def)| def.name() == name)
    }

    /// Override files in name order.
    fn project_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.workflows_dir()) else {
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "yaml" || e == "yml"))
            .collect();
        paths.sort();
        paths
    }

    /// Move a legacy single-file override into the workflows directory.
    ///
    /// Runs only while the workflows directory does not exist yet. An
    /// existing destination is left untouched.
    pub fn migrate_legacy(&self) {
        let workflows_dir = self.workflows_dir();
        if workflows_dir.exists() {
            return;
        }

        let base = self.project_path.join(PROJECT_DIR);
        let Some(legacy) = LEGACY_FILES.iter().map(|f| base.join(f)).find(|p| p.is_file()) else {
            return;
        };

        let target = workflows_dir.join(format!("{CUSTOM_WORKFLOW}.yaml"));
        if target.exists() {
            return;
        }

        if let Err(e) = fs::create_dir_all(&workflows_dir).and_then(|()| fs::rename(&legacy, &target))
        {
            tracing::warn!(from = ?legacy, to = ?target, error = %e, "Legacy workflow migration failed");
        } else {
            tracing::info!(from = ?legacy, to = ?target, "Migrated legacy workflow file");
        }
    }

    /// All workflows usable in this project. Project overrides shadow
    /// bundled workflows of the same name; invalid overrides are skipped.
    pub fn list(&self) -> Vec<WorkflowInfo> {
        self.migrate_legacy();

        let mut infos: Vec<WorkflowInfo> = Vec::new();
        let project_files = self.project_files();

        for path in &project_files {
            match load_file(path) {
                Ok(def) => infos.push(WorkflowInfo::from_definition(&def, "project")),
                Err(e) => tracing::warn!(path = ?path, error = %e, "Skipping invalid workflow"),
            }
        }

        for name in bundled_names() {
            // Shadowed by a project file of that name or stem.
            if infos.iter().any(|i| i.name == name)
                || project_files.iter().any(|p| p.file_stem().is_some_and(|s| s == name))
            {
                continue;
            }
            if let Some(Ok(def)) = bundled_source(name).map(WorkflowDefinition::from_yaml) {
                infos.push(WorkflowInfo::from_definition(&def, "bundled"));
            }
        }

        infos
    }
}

/// Read and validate a workflow file without any fallback.
pub fn load_file(path: &Path) -> Result<WorkflowDefinition, DefinitionError> {
    let content = fs::read_to_string(path)?;
    WorkflowDefinition::from_yaml(&content)
}

fn is_safe_name(name: &str) -> bool {
    !name.contains(['/', '\\']) && !name.contains("..")
}
