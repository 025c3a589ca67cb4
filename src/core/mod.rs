//! Core application services.

mod config;

pub use config::{
    Config, DocumentsConfig, GitConfig, StorageConfig, WorkflowConfig, ENV_DB_PATH, ENV_WORKFLOW,
};
