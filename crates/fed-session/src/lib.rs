//! # fed-session
//!
//! Federation sessions and the store that owns them.
//!
//! A [`FederationSession`] records which service providers took part in one
//! authenticated user context. The logout saga shrinks that list as it goes;
//! it never grows again once logout has started.
//!
//! Sessions are plain data owned by a [`SessionStore`]. Callers change them
//! through [`SessionStore::modify`], which applies an update to a copy and
//! writes it back while holding the per-key writer slot.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod memory;
pub mod provider;
pub mod session;

pub use error::{SessionError, SessionResult};
pub use memory::InMemorySessionStore;
pub use provider::{SessionStore, SessionUpdate};
pub use session::{
    FederationSession, LogoutChannel, ServiceProviderParticipant, SessionKey, SessionState,
};
