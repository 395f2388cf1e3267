//! # fed-logout
//!
//! Single logout across every partner of a federation session.
//!
//! [`LogoutOrchestrator`] runs one saga per session. Partners are contacted
//! in the order they joined the session: through the browser when they
//! publish a front-channel endpoint, over SOAP otherwise. Each browser
//! round trip is backed by a fallback deadline owned by
//! [`FallbackScheduler`]; whichever of the returning response and the
//! deadline settles the attempt first wins, and the other finds nothing
//! left to do.
//!
//! A partner that cannot be reached is recorded as abandoned and the saga
//! moves on. The initiator is told whether logout was full or partial.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod artifact;
pub mod attempt;
pub mod error;
pub mod orchestrator;
pub mod scheduler;
pub mod step;
pub mod transport;

#[cfg(test)]
mod testing;

pub use artifact::ArtifactResolver;
pub use attempt::{AttemptKey, AttemptOutcome, LogoutAttempt};
pub use error::{LogoutError, LogoutResult};
pub use orchestrator::{LogoutOrchestrator, LogoutSettings};
pub use scheduler::{FallbackHandler, FallbackScheduler};
pub use step::{LogoutStep, LogoutSummary};
pub use transport::{HttpSoapTransport, LogoutTransport};
