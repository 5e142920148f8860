//! Supabase Postgres through its PostgREST interface
//!
//! Requests authenticate with the service key (sent as both `apikey` and
//! bearer token), filter with PostgREST operators (`id=eq.7`), and ask for the
//! affected rows back with `Prefer: return=representation`.

use super::{Agent, AgentStore, AgentUpdate, NewAgent, StorageError, StorageResult, User};
use crate::wizard::WizardConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, Instrument};

const RETURN_ROWS: &str = "return=representation";

pub struct SupabaseStore {
    client: Client,
    rest_url: String,
    service_key: String,
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: String,
    email: String,
    #[serde(default)]
    agents_created: i64,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            agents_created: row.agents_created,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AgentRow {
    id: i64,
    user_id: String,
    name: String,
    python_script: String,
    #[serde(default)]
    config: Option<WizardConfig>,
    created_at: DateTime<Utc>,
}

impl From<AgentRow> for Agent {
    fn from(row: AgentRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            python_script: row.python_script,
            config: row.config,
            created_at: row.created_at,
        }
    }
}

#[derive(Serialize)]
struct UserInsert<'a> {
    id: &'a str,
    email: &'a str,
}

#[derive(Serialize)]
struct AgentInsert<'a> {
    user_id: &'a str,
    name: &'a str,
    python_script: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<&'a WizardConfig>,
}

#[derive(Serialize)]
struct AgentPatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    python_script: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<&'a WizardConfig>,
}

impl SupabaseStore {
    pub fn new(url: &str, service_key: String, timeout: Duration) -> StorageResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Request(e.to_string()))?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", url.trim_end_matches('/')),
            service_key,
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.rest_url, table))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Accept", "application/json")
    }

    /// Send a request and decode the rows it returns
    async fn rows<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        table: &str,
        builder: RequestBuilder,
    ) -> StorageResult<Vec<T>> {
        let span = crate::storage_span!(operation, table);

        async move {
            let response = builder
                .send()
                .await
                .map_err(|e| StorageError::Request(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(StorageError::Backend {
                    status: status.as_u16(),
                    message,
                });
            }

            let rows = response
                .json::<Vec<T>>()
                .await
                .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;
            debug!("{} on {} returned {} rows", operation, table, rows.len());
            Ok(rows)
        }
        .instrument(span)
        .await
    }

    async fn first<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        table: &str,
        builder: RequestBuilder,
    ) -> StorageResult<Option<T>> {
        Ok(self.rows(operation, table, builder).await?.into_iter().next())
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl AgentStore for SupabaseStore {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn ensure_user(&self, id: &str, email: &str) -> StorageResult<User> {
        if let Some(user) = self.get_user(id).await? {
            return Ok(user);
        }

        let insert = self
            .request(Method::POST, "users")
            .query(&[("on_conflict", "id")])
            .header("Prefer", format!("resolution=ignore-duplicates,{RETURN_ROWS}"))
            .json(&[UserInsert { id, email }]);

        if let Some(row) = self.first::<UserRow>("insert", "users", insert).await? {
            return Ok(row.into());
        }

        // Lost a race with a concurrent insert; the row exists now
        self.get_user(id).await?.ok_or_else(|| {
            StorageError::InvalidResponse(format!("user {id} missing after insert"))
        })
    }

    async fn get_user(&self, id: &str) -> StorageResult<Option<User>> {
        let select = self
            .request(Method::GET, "users")
            .query(&[("select", "*".to_string()), ("id", eq(id))]);

        Ok(self
            .first::<UserRow>("select", "users", select)
            .await?
            .map(User::from))
    }

    async fn list_agents(&self, owner: &str) -> StorageResult<Vec<Agent>> {
        let select = self.request(Method::GET, "agents").query(&[
            ("select", "*".to_string()),
            ("user_id", eq(owner)),
            ("order", "created_at.desc,id.desc".to_string()),
        ]);

        Ok(self
            .rows::<AgentRow>("select", "agents", select)
            .await?
            .into_iter()
            .map(Agent::from)
            .collect())
    }

    async fn get_agent(&self, id: i64, owner: &str) -> StorageResult<Option<Agent>> {
        let select = self.request(Method::GET, "agents").query(&[
            ("select", "*".to_string()),
            ("id", eq(id)),
            ("user_id", eq(owner)),
        ]);

        Ok(self
            .first::<AgentRow>("select", "agents", select)
            .await?
            .map(Agent::from))
    }

    async fn create_agent(&self, agent: NewAgent) -> StorageResult<Agent> {
        let insert = self
            .request(Method::POST, "agents")
            .header("Prefer", RETURN_ROWS)
            .json(&[AgentInsert {
                user_id: &agent.user_id,
                name: &agent.name,
                python_script: &agent.python_script,
                config: agent.config.as_ref(),
            }]);

        self.first::<AgentRow>("insert", "agents", insert)
            .await?
            .map(Agent::from)
            .ok_or_else(|| StorageError::InvalidResponse("insert returned no rows".to_string()))
    }

    async fn update_agent(
        &self,
        id: i64,
        owner: &str,
        update: AgentUpdate,
    ) -> StorageResult<Option<Agent>> {
        if update.is_empty() {
            return self.get_agent(id, owner).await;
        }

        let patch = self
            .request(Method::PATCH, "agents")
            .query(&[("id", eq(id)), ("user_id", eq(owner))])
            .header("Prefer", RETURN_ROWS)
            .json(&AgentPatch {
                name: update.name.as_deref(),
                python_script: update.python_script.as_deref(),
                config: update.config.as_ref(),
            });

        Ok(self
            .first::<AgentRow>("update", "agents", patch)
            .await?
            .map(Agent::from))
    }

    async fn delete_agent(&self, id: i64, owner: &str) -> StorageResult<bool> {
        let delete = self
            .request(Method::DELETE, "agents")
            .query(&[("id", eq(id)), ("user_id", eq(owner))])
            .header("Prefer", RETURN_ROWS);

        let deleted = self.rows::<AgentRow>("delete", "agents", delete).await?;
        Ok(!deleted.is_empty())
    }

    async fn health_check(&self) -> StorageResult<()> {
        let probe = self
            .request(Method::GET, "users")
            .query(&[("select", "id"), ("limit", "1")]);

        self.rows::<serde_json::Value>("probe", "users", probe)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_url_is_normalised() {
        let store =
            SupabaseStore::new("https://proj.supabase.co/", "key".into(), Duration::from_secs(5))
                .unwrap();
        assert_eq!(store.rest_url, "https://proj.supabase.co/rest/v1");
    }

    #[test]
    fn test_patch_skips_absent_fields() {
        let patch = AgentPatch {
            name: None,
            python_script: Some("print(1)"),
            config: None,
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, serde_json::json!({"python_script": "print(1)"}));
    }

    #[test]
    fn test_agent_row_tolerates_missing_config() {
        let row: AgentRow = serde_json::from_value(serde_json::json!({
            "id": 3,
            "user_id": "u1",
            "name": "Bot",
            "python_script": "print(1)",
            "created_at": "2025-06-01T10:00:00.123456+00:00"
        }))
        .unwrap();
        let agent = Agent::from(row);
        assert_eq!(agent.id, 3);
        assert!(agent.config.is_none());
    }
}
