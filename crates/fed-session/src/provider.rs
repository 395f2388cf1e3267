//! Session store trait.

use async_trait::async_trait;

use crate::error::SessionResult;
use crate::session::{FederationSession, SessionKey};

/// An update applied to a copy of a session before it is written back.
pub type SessionUpdate = Box<dyn FnOnce(&mut FederationSession) + Send>;

/// Storage for federation sessions.
///
/// Writes to one key are serialized: [`modify`](Self::modify) must not
/// interleave with another write to the same session. No ordering is
/// promised across different keys.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Gets a session by key.
    async fn get(&self, key: &SessionKey) -> SessionResult<Option<FederationSession>>;

    /// Finds the session for a partner-facing NameID.
    async fn find_by_name_id(&self, name_id: &str) -> SessionResult<Option<FederationSession>>;

    /// Stores a new session.
    async fn create(&self, session: FederationSession) -> SessionResult<()>;

    /// Replaces a stored session.
    async fn update(&self, session: FederationSession) -> SessionResult<()>;

    /// Applies `update` to a copy of the session and writes it back.
    ///
    /// Returns the written session, or `None` if the key is absent.
    async fn modify(
        &self,
        key: &SessionKey,
        update: SessionUpdate,
    ) -> SessionResult<Option<FederationSession>>;

    /// Removes a session, returning it if it was present.
    async fn remove(&self, key: &SessionKey) -> SessionResult<Option<FederationSession>>;

    /// Lists all sessions.
    async fn list(&self) -> SessionResult<Vec<FederationSession>>;
}
