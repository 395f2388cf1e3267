//! In-memory session store.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{SessionError, SessionResult};
use crate::provider::{SessionStore, SessionUpdate};
use crate::session::{FederationSession, SessionKey};

/// Session store held in process memory.
///
/// Each key's map shard lock is the single-writer slot for that session.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<SessionKey, FederationSession>,
    by_name_id: DashMap<String, SessionKey>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no session is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn index(&self, session: &FederationSession) {
        self.by_name_id
            .insert(session.name_id.clone(), session.key.clone());
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, key: &SessionKey) -> SessionResult<Option<FederationSession>> {
        Ok(self.sessions.get(key).map(|s| s.clone()))
    }

    async fn find_by_name_id(&self, name_id: &str) -> SessionResult<Option<FederationSession>> {
        let Some(key) = self.by_name_id.get(name_id).map(|k| k.clone()) else {
            return Ok(None);
        };
        self.get(&key).await
    }

    async fn create(&self, session: FederationSession) -> SessionResult<()> {
        match self.sessions.entry(session.key.clone()) {
            Entry::Occupied(_) => Err(SessionError::AlreadyExists(session.key.to_string())),
            Entry::Vacant(vacant) => {
                self.index(&session);
                tracing::debug!(session = %session.key, "Session created");
                vacant.insert(session);
                Ok(())
            }
        }
    }

    async fn update(&self, session: FederationSession) -> SessionResult<()> {
        let Some(mut stored) = self.sessions.get_mut(&session.key) else {
            return Err(SessionError::NotFound(session.key.to_string()));
        };
        if stored.name_id != session.name_id {
            self.by_name_id
                .remove_if(&stored.name_id, |_, key| *key == session.key);
            self.index(&session);
        }
        *stored = session;
        Ok(())
    }

    async fn modify(
        &self,
        key: &SessionKey,
        update: SessionUpdate,
    ) -> SessionResult<Option<FederationSession>> {
        let Some(mut stored) = self.sessions.get_mut(key) else {
            return Ok(None);
        };
        let mut copy = stored.clone();
        update(&mut copy);
        *stored = copy.clone();
        Ok(Some(copy))
    }

    async fn remove(&self, key: &SessionKey) -> SessionResult<Option<FederationSession>> {
        let removed = self.sessions.remove(key).map(|(_, session)| session);
        if let Some(session) = &removed {
            self.by_name_id
                .remove_if(&session.name_id, |_, indexed| indexed == key);
            tracing::debug!(session = %key, "Session removed");
        }
        Ok(removed)
    }

    async fn list(&self) -> SessionResult<Vec<FederationSession>> {
        Ok(self.sessions.iter().map(|s| s.value().clone()).collect())
    }
}
