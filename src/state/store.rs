//! SQLite persistence for conversations and interaction logs.
//!
//! Two aggregates live here and are deleted differently:
//!
//! - **conversation_states**: one row per (project path, branch); hard
//!   deleted on reset.
//! - **interaction_logs**: one row per handled tool call; soft deleted on
//!   reset (`is_reset = 1`), never purged.
//!
//! Writes are single statements, so concurrent updates of the same row are
//! last-writer-wins.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::error::FlowResult;

/// Current schema version.
const SCHEMA_VERSION: i32 = 1;

/// A persisted conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationState {
    /// Conversation id (derived from path and branch)
    pub id: String,
    /// Absolute project path
    pub project_path: PathBuf,
    /// Branch name
    pub branch: String,
    /// Active phase id
    pub current_phase: String,
    /// Selected workflow name
    pub workflow_name: String,
    /// Plan document location
    pub plan_file_path: PathBuf,
    /// Whether modeled transitions with review perspectives need a review first
    pub require_reviews: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

/// Partial update of a conversation. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct ConversationUpdate {
    pub current_phase: Option<String>,
    pub workflow_name: Option<String>,
    pub plan_file_path: Option<PathBuf>,
    pub require_reviews: Option<bool>,
}

impl ConversationUpdate {
    /// Update only the phase.
    pub fn phase(phase: impl Into<String>) -> Self {
        Self { current_phase: Some(phase.into()), ..Self::default() }
    }
}

/// One logged tool call.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionLog {
    pub id: i64,
    pub conversation_id: String,
    pub tool_name: String,
    pub input_params: String,
    pub response_data: String,
    pub current_phase: String,
    pub timestamp: DateTime<Utc>,
    pub is_reset: bool,
    pub reset_at: Option<DateTime<Utc>>,
}

/// SQLite-backed store.
pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    /// Open (or create) a database file and make sure the schema exists.
    pub fn open(path: &Path) -> FlowResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self { conn };
        store.initialize_schema()?;
        tracing::debug!(path = ?path, "Opened state database");
        Ok(store)
    }

    /// In-memory database, for tests and dry runs.
    pub fn open_in_memory() -> FlowResult<Self> {
        let store = Self { conn: Connection::open_in_memory()? };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> FlowResult<()> {
        self.conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS conversation_states (
                id TEXT PRIMARY KEY,
                project_path TEXT NOT NULL,
                git_branch TEXT NOT NULL,
                current_phase TEXT NOT NULL,
                plan_file_path TEXT NOT NULL,
                workflow_name TEXT NOT NULL,
                require_reviews INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,

                UNIQUE(project_path, git_branch)
            );

            CREATE TABLE IF NOT EXISTS interaction_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                tool_name TEXT NOT NULL,
                input_params TEXT NOT NULL,
                response_data TEXT NOT NULL,
                current_phase TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                is_reset INTEGER NOT NULL DEFAULT 0,
                reset_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_interactions_conversation
                ON interaction_logs(conversation_id, is_reset);

            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            ",
        )?;

        self.conn
            .execute("INSERT OR IGNORE INTO schema_version (version) VALUES (?1)", [SCHEMA_VERSION])?;
        Ok(())
    }

    /// Schema version recorded in the database.
    pub fn schema_version(&self) -> FlowResult<i32> {
        let version = self
            .conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
        Ok(version)
    }

    /// Fetch a conversation by id.
    pub fn get(&self, id: &str) -> FlowResult<Option<ConversationState>> {
        let row = self
            .conn
            .query_row(
                r"
                SELECT id, project_path, git_branch, current_phase, plan_file_path,
                       workflow_name, require_reviews, created_at, updated_at
                FROM conversation_states
                WHERE id = ?1
                ",
                params![id],
                map_conversation_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Insert a conversation unless one with the same id or (path, branch)
    /// exists. Returns whether a row was inserted.
    pub fn insert_if_absent(&self, state: &ConversationState) -> FlowResult<bool> {
        let inserted = self.conn.execute(
            r"
            INSERT OR IGNORE INTO conversation_states (
                id, project_path, git_branch, current_phase, plan_file_path,
                workflow_name, require_reviews, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
            params![
                state.id,
                state.project_path.to_string_lossy(),
                state.branch,
                state.current_phase,
                state.plan_file_path.to_string_lossy(),
                state.workflow_name,
                state.require_reviews,
                state.created_at.to_rfc3339(),
                state.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Apply a partial update. Returns whether the row exists.
    pub fn update(&self, id: &str, update: &ConversationUpdate) -> FlowResult<bool> {
        let changed = self.conn.execute(
            r"
            UPDATE conversation_states
            SET current_phase = COALESCE(?1, current_phase),
                workflow_name = COALESCE(?2, workflow_name),
                plan_file_path = COALESCE(?3, plan_file_path),
                require_reviews = COALESCE(?4, require_reviews),
                updated_at = ?5
            WHERE id = ?6
            ",
            params![
                update.current_phase,
                update.workflow_name,
                update.plan_file_path.as_ref().map(|p| p.to_string_lossy().to_string()),
                update.require_reviews,
                Utc::now().to_rfc3339(),
                id,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Permanently delete a conversation row.
    pub fn delete_conversation(&self, id: &str) -> FlowResult<bool> {
        let deleted = self.conn.execute("DELETE FROM conversation_states WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Record one handled tool call.
    pub fn log_interaction(
        &self,
        conversation_id: &str,
        tool_name: &str,
        input: &serde_json::Value,
        response: &serde_json::Value,
        current_phase: &str,
    ) -> FlowResult<i64> {
        self.conn.execute(
            r"
            INSERT INTO interaction_logs (
                conversation_id, tool_name, input_params, response_data, current_phase, timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                conversation_id,
                tool_name,
                serde_json::to_string(input)?,
                serde_json::to_string(response)?,
                current_phase,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Number of live (not soft-deleted) interactions.
    pub fn interaction_count(&self, conversation_id: &str) -> FlowResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM interaction_logs WHERE conversation_id = ?1 AND is_reset = 0",
            params![conversation_id],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Interactions of a conversation, oldest first.
    pub fn interactions(
        &self,
        conversation_id: &str,
        include_reset: bool,
    ) -> FlowResult<Vec<InteractionLog>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, conversation_id, tool_name, input_params, response_data,
                   current_phase, timestamp, is_reset, reset_at
            FROM interaction_logs
            WHERE conversation_id = ?1 AND (?2 OR is_reset = 0)
            ORDER BY id ASC
            ",
        )?;
        let rows = stmt.query_map(params![conversation_id, include_reset], map_interaction_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Mark all live interactions of a conversation as reset. Returns the
    /// number of rows marked.
    pub fn soft_delete_interactions(&self, conversation_id: &str) -> FlowResult<usize> {
        let marked = self.conn.execute(
            r"
            UPDATE interaction_logs
            SET is_reset = 1, reset_at = ?1
            WHERE conversation_id = ?2 AND is_reset = 0
            ",
            params![Utc::now().to_rfc3339(), conversation_id],
        )?;
        Ok(marked)
    }
}

fn parse_time(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn map_conversation_row(row: &Row) -> rusqlite::Result<ConversationState> {
    let project_path: String = row.get(1)?;
    let plan_file_path: String = row.get(4)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(ConversationState {
        id: row.get(0)?,
        project_path: PathBuf::from(project_path),
        branch: row.get(2)?,
        current_phase: row.get(3)?,
        plan_file_path: PathBuf::from(plan_file_path),
        workflow_name: row.get(5)?,
        require_reviews: row.get(6)?,
        created_at: parse_time(7, &created_at)?,
        updated_at: parse_time(8, &updated_at)?,
    })
}

fn map_interaction_row(row: &Row) -> rusqlite::Result<InteractionLog> {
    let timestamp: String = row.get(6)?;
    let reset_at: Option<String> = row.get(8)?;

    Ok(InteractionLog {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        tool_name: row.get(2)?,
        input_params: row.get(3)?,
        response_data: row.get(4)?,
        current_phase: row.get(5)?,
        timestamp: parse_time(6, &timestamp)?,
        is_reset: row.get(7)?,
        reset_at: reset_at.as_deref().map(|s| parse_time(8, s)).transpose()?,
    })
}
