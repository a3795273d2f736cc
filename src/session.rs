use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{error::StoreError, models::Role};

/// SessionRecord
///
/// Server-side state established at login and referenced by the `sid` cookie.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

/// SessionStore
///
/// Contract for the server-side session store. Expired sessions read as absent.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stores the record under a fresh id and returns that id.
    async fn create(&self, record: SessionRecord) -> Result<Uuid, StoreError>;
    async fn get(&self, id: Uuid) -> Result<Option<SessionRecord>, StoreError>;
    /// Idempotent: returns `false` when no such session existed.
    async fn destroy(&self, id: Uuid) -> Result<bool, StoreError>;
}

pub type SessionState = Arc<dyn SessionStore>;

/// InMemorySessionStore
///
/// Process-local sessions. Each entry is keyed by its own id, so concurrent
/// requests for different sessions never touch the same record.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, record: SessionRecord) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        self.sessions.write().await.insert(id, record);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<SessionRecord>, StoreError> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(&id) {
                Some(record) if record.expires_at > now => return Ok(Some(record.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: evict on read.
        self.sessions.write().await.remove(&id);
        Ok(None)
    }

    async fn destroy(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(expires_at: DateTime<Utc>) -> SessionRecord {
        SessionRecord {
            user_id: Uuid::new_v4(),
            email: "ann@example.com".into(),
            name: "Ann".into(),
            role: Role::User,
            expires_at,
        }
    }

    #[tokio::test]
    async fn live_session_round_trips_and_destroy_is_idempotent() {
        let store = InMemorySessionStore::new();
        let live = record(Utc::now() + Duration::hours(1));
        let id = store.create(live.clone()).await.unwrap();

        assert_eq!(store.get(id).await.unwrap(), Some(live));
        assert!(store.destroy(id).await.unwrap());
        assert!(!store.destroy(id).await.unwrap());
        assert_eq!(store.get(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_session_reads_as_absent() {
        let store = InMemorySessionStore::new();
        let id = store
            .create(record(Utc::now() - Duration::seconds(1)))
            .await
            .unwrap();
        assert_eq!(store.get(id).await.unwrap(), None);
    }
}
