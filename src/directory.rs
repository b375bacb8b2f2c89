use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::Deserialize;

use crate::model::{EventDefinition, EventId, UserId};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("lookup timed out after {0} ms")]
    Timeout(u64),
    #[error("directory unreachable: {0}")]
    Unreachable(String),
}

/// Read-only view of the users and events owned by other services.
///
/// Lookups are synchronous from the engine's point of view: it awaits each one
/// and fails the operation, without writing, if the lookup errors.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn event(&self, event_id: EventId) -> Result<Option<EventDefinition>, DirectoryError>;

    async fn user_exists(&self, user_id: UserId) -> Result<bool, DirectoryError>;
}

/// JSON seed for an [`InMemoryDirectory`].
#[derive(Debug, Default, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub users: Vec<UserId>,
    #[serde(default)]
    pub events: Vec<EventDefinition>,
}

/// Directory held in process memory.
#[derive(Default)]
pub struct InMemoryDirectory {
    events: DashMap<EventId, EventDefinition>,
    users: DashSet<UserId>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: DirectorySeed) -> Self {
        let dir = Self::new();
        for user_id in seed.users {
            dir.add_user(user_id);
        }
        for definition in seed.events {
            dir.put_event(definition);
        }
        dir
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::from_seed(serde_json::from_str(json)?))
    }

    pub fn add_user(&self, user_id: UserId) {
        self.users.insert(user_id);
    }

    /// Insert or replace an event. The owner is registered as a user.
    pub fn put_event(&self, definition: EventDefinition) {
        self.users.insert(definition.owner_id);
        self.events.insert(definition.event_id, definition);
    }

    pub fn set_published(&self, event_id: EventId, published: bool) {
        if let Some(mut def) = self.events.get_mut(&event_id) {
            def.is_published = published;
        }
    }

    pub fn set_limit(&self, event_id: EventId, limit: u32) {
        if let Some(mut def) = self.events.get_mut(&event_id) {
            def.participation_limit = limit;
        }
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn event(&self, event_id: EventId) -> Result<Option<EventDefinition>, DirectoryError> {
        Ok(self.events.get(&event_id).map(|e| e.value().clone()))
    }

    async fn user_exists(&self, user_id: UserId) -> Result<bool, DirectoryError> {
        Ok(self.users.contains(&user_id))
    }
}
