//! Persistence for users and their agents
//!
//! Every agent operation is scoped to its owner: an agent that belongs to
//! someone else is indistinguishable from one that does not exist.

pub mod memory;
pub mod supabase;

pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

use crate::wizard::WizardConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Postgres DDL for the Supabase backend
pub const SCHEMA_SQL: &str = include_str!("../../schema.sql");

/// Script stored when no code was generated
pub const PLACEHOLDER_SCRIPT: &str = "# Generated agent code will go here";

/// A signed-in user, keyed by the Supabase auth user id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub agents_created: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub python_script: String,
    pub config: Option<WizardConfig>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Whether the script is real code rather than the placeholder
    pub fn has_code(&self) -> bool {
        let script = self.python_script.trim();
        !script.is_empty() && script != PLACEHOLDER_SCRIPT
    }
}

/// Fields of an agent about to be created
#[derive(Debug, Clone, PartialEq)]
pub struct NewAgent {
    pub user_id: String,
    pub name: String,
    pub python_script: String,
    pub config: Option<WizardConfig>,
}

/// Partial update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub python_script: Option<String>,
    pub config: Option<WizardConfig>,
}

impl AgentUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.python_script.is_none() && self.config.is_none()
    }

    pub(crate) fn apply(self, agent: &mut Agent) {
        if let Some(name) = self.name {
            agent.name = name;
        }
        if let Some(script) = self.python_script {
            agent.python_script = script;
        }
        if let Some(config) = self.config {
            agent.config = Some(config);
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Request to storage backend failed: {0}")]
    Request(String),
    #[error("Storage backend returned {status}: {message}")]
    Backend { status: u16, message: String },
    #[error("Unexpected storage response: {0}")]
    InvalidResponse(String),
}

impl From<StorageError> for crate::error::PhilError {
    fn from(error: StorageError) -> Self {
        crate::error::PhilError::storage(error.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Backend holding users and agents
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Backend name for logs and health reports
    fn name(&self) -> &str;

    /// Fetch the user, creating the row on first sight
    async fn ensure_user(&self, id: &str, email: &str) -> StorageResult<User>;

    async fn get_user(&self, id: &str) -> StorageResult<Option<User>>;

    /// The owner's agents, newest first
    async fn list_agents(&self, owner: &str) -> StorageResult<Vec<Agent>>;

    async fn get_agent(&self, id: i64, owner: &str) -> StorageResult<Option<Agent>>;

    /// Store a new agent and bump the owner's `agents_created`
    async fn create_agent(&self, agent: NewAgent) -> StorageResult<Agent>;

    /// Apply an update; `None` when the owner has no such agent
    async fn update_agent(
        &self,
        id: i64,
        owner: &str,
        update: AgentUpdate,
    ) -> StorageResult<Option<Agent>>;

    /// Delete an agent; `false` when the owner has no such agent
    async fn delete_agent(&self, id: i64, owner: &str) -> StorageResult<bool>;

    async fn health_check(&self) -> StorageResult<()>;
}
