//! Configuration management for devflow.
//!
//! Configuration is layered, later layers winning:
//!
//! 1. built-in defaults
//! 2. user file `<config_dir>/devflow/config.toml`
//! 3. project file `<project>/.devflow/config.toml`
//! 4. environment (`DEVFLOW_WORKFLOW`, `DEVFLOW_DB_PATH`)
//!
//! Files are merged table by table, so a project file only needs the keys
//! it changes. A file that fails to parse is logged and skipped.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::workflow::DEFAULT_WORKFLOW;
use crate::PROJECT_DIR;

/// Environment variable overriding the default workflow.
pub const ENV_WORKFLOW: &str = "DEVFLOW_WORKFLOW";

/// Environment variable overriding the database location.
pub const ENV_DB_PATH: &str = "DEVFLOW_DB_PATH";

/// Default database file name under the project directory.
const DEFAULT_DATABASE: &str = "conversation-state.sqlite";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Workflow selection and review policy
    pub workflow: WorkflowConfig,

    /// Git integration
    pub git: GitConfig,

    /// Project documents referenced from workflow instructions
    pub documents: DocumentsConfig,

    /// Persistence
    pub storage: StorageConfig,
}

/// Workflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Workflow used when a call names none
    pub default: String,

    /// Whether new conversations require reviews before reviewed transitions
    pub require_reviews: bool,
}

/// Git settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Ask the assistant to commit whenever the phase changes
    pub commit_on_transition: bool,

    /// Commit message; `{phase}` is replaced with the phase being left
    pub commit_message_template: String,
}

/// Locations of the documents behind `$ARCHITECTURE_DOC`, `$REQUIREMENTS_DOC`
/// and `$DESIGN_DOC`.
///
/// Relative paths are resolved against the project; `~` and environment
/// variables are expanded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    pub architecture: String,
    pub requirements: String,
    pub design: String,
}

/// Storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file; defaults to `<project>/.devflow/conversation-state.sqlite`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
}

impl Config {
    /// Load every layer for a project.
    pub fn load(project_path: &Path) -> Self {
        let user_file = Self::config_dir().map(|d| d.join("config.toml"));
        let mut config = Self::load_layers(user_file.as_deref(), project_path);
        config.apply_env();
        config
    }

    /// Merge defaults, an optional user file and the project file.
    ///
    /// Environment variables are not consulted.
    pub fn load_layers(user_file: Option<&Path>, project_path: &Path) -> Self {
        let project_file = Self::project_file(project_path);
        let mut merged = toml::Value::Table(toml::map::Map::new());

        for path in user_file.into_iter().chain(std::iter::once(project_file.as_path())) {
            if !path.exists() {
                continue;
            }
            match read_table(path) {
                Ok(layer) => {
                    tracing::debug!(path = ?path, "Loaded config layer");
                    merge(&mut merged, layer);
                }
                Err(e) => tracing::warn!(path = ?path, error = %e, "Ignoring invalid config file"),
            }
        }

        match merged.try_into::<Self>() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid configuration values, using defaults");
                Self::default()
            }
        }
    }

    /// Apply environment overrides.
    pub fn apply_env(&mut self) {
        if let Some(workflow) = env_value(ENV_WORKFLOW) {
            self.workflow.default = workflow;
        }
        if let Some(db) = env_value(ENV_DB_PATH) {
            self.storage.database = Some(PathBuf::from(db));
        }
    }

    /// Database file for a project.
    pub fn database_path(&self, project_path: &Path) -> PathBuf {
        match &self.storage.database {
            Some(path) => resolve_path(project_path, &path.to_string_lossy()),
            None => project_path.join(PROJECT_DIR).join(DEFAULT_DATABASE),
        }
    }

    /// User configuration directory.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("devflow"))
    }

    /// Project configuration file.
    pub fn project_file(project_path: &Path) -> PathBuf {
        project_path.join(PROJECT_DIR).join("config.toml")
    }
}

impl DocumentsConfig {
    /// Absolute path of the architecture document.
    pub fn architecture_path(&self, project_path: &Path) -> PathBuf {
        resolve_path(project_path, &self.architecture)
    }

    /// Absolute path of the requirements document.
    pub fn requirements_path(&self, project_path: &Path) -> PathBuf {
        resolve_path(project_path, &self.requirements)
    }

    /// Absolute path of the design document.
    pub fn design_path(&self, project_path: &Path) -> PathBuf {
        resolve_path(project_path, &self.design)
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self { default: DEFAULT_WORKFLOW.to_string(), require_reviews: false }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            commit_on_transition: false,
            commit_message_template: "chore: complete {phase} phase".to_string(),
        }
    }
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            architecture: format!("{PROJECT_DIR}/docs/architecture.md"),
            requirements: format!("{PROJECT_DIR}/docs/requirements.md"),
            design: format!("{PROJECT_DIR}/docs/design.md"),
        }
    }
}

fn read_table(path: &Path) -> anyhow::Result<toml::Value> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Recursively merge `overlay` into `base`. Tables merge; other values replace.
fn merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Expand `~` and variables, then anchor relative paths at the project.
fn resolve_path(project_path: &Path, raw: &str) -> PathBuf {
    let expanded = shellexpand::full(raw).map_or_else(|_| raw.to_string(), |s| s.into_owned());
    let path = PathBuf::from(expanded);
    if path.is_absolute() {
        path
    } else {
        project_path.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.workflow.default, "waterfall");
        assert!(!config.workflow.require_reviews);
        assert!(!config.git.commit_on_transition);
        assert!(config.git.commit_message_template.contains("{phase}"));
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = toml::to_string(&Config::default()).unwrap();
        assert!(toml_str.contains("[workflow]"));
        assert!(toml_str.contains("[documents]"));
    }

    #[test]
    fn test_project_layer_overrides_user_layer() {
        let temp = TempDir::new().unwrap();
        let user = temp.path().join("user.toml");
        write(
            &user,
            r#"
            [workflow]
            default = "epcc"
            require_reviews = true

            [git]
            commit_on_transition = true
            "#,
        );
        write(
            &Config::project_file(temp.path()),
            r#"
            [workflow]
            default = "minor"
            "#,
        );

        let config = Config::load_layers(Some(&user), temp.path());
        assert_eq!(config.workflow.default, "minor");
        assert!(config.workflow.require_reviews);
        assert!(config.git.commit_on_transition);
    }

    #[test]
    fn test_invalid_file_is_ignored() {
        let temp = TempDir::new().unwrap();
        write(&Config::project_file(temp.path()), "this is [not toml");

        let config = Config::load_layers(None, temp.path());
        assert_eq!(config.workflow.default, "waterfall");
    }

    #[test]
    fn test_database_path() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        assert_eq!(
            config.database_path(temp.path()),
            temp.path().join(".devflow").join("conversation-state.sqlite")
        );

        config.storage.database = Some(PathBuf::from("state/db.sqlite"));
        assert_eq!(config.database_path(temp.path()), temp.path().join("state/db.sqlite"));
    }

    #[test]
    fn test_document_paths_resolve_against_project() {
        let docs = DocumentsConfig::default();
        let root = Path::new("/work/app");
        assert_eq!(docs.design_path(root), PathBuf::from("/work/app/.devflow/docs/design.md"));

        let docs = DocumentsConfig { architecture: "/abs/arch.md".to_string(), ..docs };
        assert_eq!(docs.architecture_path(root), PathBuf::from("/abs/arch.md"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var(ENV_WORKFLOW, "bugfix");
        std::env::set_var(ENV_DB_PATH, "/tmp/devflow-test.sqlite");

        let mut config = Config::default();
        config.apply_env();

        std::env::remove_var(ENV_WORKFLOW);
        std::env::remove_var(ENV_DB_PATH);

        assert_eq!(config.workflow.default, "bugfix");
        assert_eq!(config.storage.database, Some(PathBuf::from("/tmp/devflow-test.sqlite")));
    }
}
