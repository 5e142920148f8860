//! In-process store for development and tests

use super::{Agent, AgentStore, AgentUpdate, NewAgent, StorageResult, User};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    agents: HashMap<i64, Agent>,
    next_agent_id: i64,
}

/// Maps behind a single lock; ids are assigned sequentially from 1
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ensure_user(&self, id: &str, email: &str) -> StorageResult<User> {
        let mut tables = self.tables.write().await;
        let user = tables.users.entry(id.to_string()).or_insert_with(|| User {
            id: id.to_string(),
            email: email.to_string(),
            agents_created: 0,
            created_at: Utc::now(),
        });
        Ok(user.clone())
    }

    async fn get_user(&self, id: &str) -> StorageResult<Option<User>> {
        Ok(self.tables.read().await.users.get(id).cloned())
    }

    async fn list_agents(&self, owner: &str) -> StorageResult<Vec<Agent>> {
        let tables = self.tables.read().await;
        let mut agents: Vec<Agent> = tables
            .agents
            .values()
            .filter(|a| a.user_id == owner)
            .cloned()
            .collect();
        agents.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(agents)
    }

    async fn get_agent(&self, id: i64, owner: &str) -> StorageResult<Option<Agent>> {
        let tables = self.tables.read().await;
        Ok(tables
            .agents
            .get(&id)
            .filter(|a| a.user_id == owner)
            .cloned())
    }

    async fn create_agent(&self, agent: NewAgent) -> StorageResult<Agent> {
        let mut tables = self.tables.write().await;
        tables.next_agent_id += 1;

        let created = Agent {
            id: tables.next_agent_id,
            user_id: agent.user_id,
            name: agent.name,
            python_script: agent.python_script,
            config: agent.config,
            created_at: Utc::now(),
        };
        tables.agents.insert(created.id, created.clone());

        if let Some(user) = tables.users.get_mut(&created.user_id) {
            user.agents_created += 1;
        }
        Ok(created)
    }

    async fn update_agent(
        &self,
        id: i64,
        owner: &str,
        update: AgentUpdate,
    ) -> StorageResult<Option<Agent>> {
        let mut tables = self.tables.write().await;
        let Some(agent) = tables.agents.get_mut(&id).filter(|a| a.user_id == owner) else {
            return Ok(None);
        };
        update.apply(agent);
        Ok(Some(agent.clone()))
    }

    async fn delete_agent(&self, id: i64, owner: &str) -> StorageResult<bool> {
        let mut tables = self.tables.write().await;
        if !tables.agents.get(&id).is_some_and(|a| a.user_id == owner) {
            return Ok(false);
        }
        tables.agents.remove(&id);

        if let Some(user) = tables.users.get_mut(owner) {
            user.agents_created = (user.agents_created - 1).max(0);
        }
        Ok(true)
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_agent(owner: &str, name: &str) -> NewAgent {
        NewAgent {
            user_id: owner.to_string(),
            name: name.to_string(),
            python_script: "print('hi')".to_string(),
            config: None,
        }
    }

    #[tokio::test]
    async fn test_ensure_user_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.ensure_user("u1", "a@example.com").await.unwrap();
        let second = store.ensure_user("u1", "changed@example.com").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.agents_created, 0);
    }

    #[tokio::test]
    async fn test_agents_are_owner_scoped() {
        let store = MemoryStore::new();
        store.ensure_user("alice", "alice@example.com").await.unwrap();
        store.ensure_user("bob", "bob@example.com").await.unwrap();

        let agent = store.create_agent(new_agent("alice", "A")).await.unwrap();

        assert!(store.get_agent(agent.id, "alice").await.unwrap().is_some());
        assert!(store.get_agent(agent.id, "bob").await.unwrap().is_none());
        assert!(store.list_agents("bob").await.unwrap().is_empty());
        assert!(store
            .update_agent(agent.id, "bob", AgentUpdate::default())
            .await
            .unwrap()
            .is_none());
        assert!(!store.delete_agent(agent.id, "bob").await.unwrap());
        assert!(store.get_agent(agent.id, "alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_agents_created_counter() {
        let store = MemoryStore::new();
        store.ensure_user("u1", "u1@example.com").await.unwrap();

        let a = store.create_agent(new_agent("u1", "A")).await.unwrap();
        let b = store.create_agent(new_agent("u1", "B")).await.unwrap();
        assert_eq!(store.get_user("u1").await.unwrap().unwrap().agents_created, 2);

        assert!(store.delete_agent(a.id, "u1").await.unwrap());
        assert!(store.delete_agent(b.id, "u1").await.unwrap());
        assert!(!store.delete_agent(b.id, "u1").await.unwrap());
        assert_eq!(store.get_user("u1").await.unwrap().unwrap().agents_created, 0);
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let store = MemoryStore::new();
        let first = store.create_agent(new_agent("u1", "first")).await.unwrap();
        let second = store.create_agent(new_agent("u1", "second")).await.unwrap();

        let ids: Vec<i64> = store
            .list_agents("u1")
            .await
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_update_changes_fields() {
        let store = MemoryStore::new();
        let agent = store.create_agent(new_agent("u1", "A")).await.unwrap();

        let updated = store
            .update_agent(
                agent.id,
                "u1",
                AgentUpdate {
                    python_script: Some("print(2)".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.name, "A");
        assert_eq!(updated.python_script, "print(2)");
    }
}
