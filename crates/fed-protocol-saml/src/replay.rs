//! Message validity window and replay detection.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fed_cache::AtomicCacheProvider;
use fed_core::event::{EventType, FederationEvent};

use crate::error::{SamlError, SamlResult};

/// Oldest `IssueInstant` accepted, before clock skew.
pub const DEFAULT_MAX_MESSAGE_AGE: Duration = Duration::from_secs(300);

/// Rejects stale, future-dated and replayed inbound messages.
///
/// Message IDs are remembered per issuer for as long as a message with
/// that ID could still pass the validity check.
#[derive(Clone)]
pub struct ReplayGuard {
    cache: Arc<dyn AtomicCacheProvider>,
    skew: Duration,
    max_age: Duration,
}

impl std::fmt::Debug for ReplayGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayGuard")
            .field("skew", &self.skew)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl ReplayGuard {
    /// Creates a guard tolerating `skew` between clocks.
    pub fn new(cache: Arc<dyn AtomicCacheProvider>, skew: Duration) -> Self {
        Self {
            cache,
            skew,
            max_age: DEFAULT_MAX_MESSAGE_AGE,
        }
    }

    /// Overrides the maximum message age.
    #[must_use]
    pub const fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    fn remember_for(&self) -> Duration {
        self.max_age + self.skew * 2
    }

    /// Checks the timing of a message received at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MessageNotYetValid`] for an `IssueInstant` ahead
    /// of `now` by more than the skew, and [`SamlError::MessageExpired`] for
    /// one older than the maximum age or a passed `NotOnOrAfter`.
    pub fn check_validity(
        &self,
        issue_instant: DateTime<Utc>,
        not_on_or_after: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> SamlResult<()> {
        let skew = to_chrono(self.skew);
        if issue_instant > now + skew {
            return Err(SamlError::MessageNotYetValid);
        }
        if issue_instant + to_chrono(self.max_age) + skew < now {
            return Err(SamlError::MessageExpired);
        }
        if not_on_or_after.is_some_and(|limit| now >= limit + skew) {
            return Err(SamlError::MessageExpired);
        }
        Ok(())
    }

    /// Records `id` from `issuer`, failing if it was seen before.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Replayed`] for a repeated ID and
    /// [`SamlError::Storage`] if the cache fails.
    pub async fn remember(&self, issuer: &str, id: &str) -> SamlResult<()> {
        let key = format!(
            "replay:{}:{id}",
            fed_crypto::to_hex(&fed_crypto::sha1(issuer.as_bytes()))
        );
        let fresh = self
            .cache
            .set_nx(&key, String::new(), Some(self.remember_for()))
            .await?;
        if fresh {
            return Ok(());
        }

        tracing::warn!(entity_id = %issuer, message_id = %id, "Replayed message rejected");
        FederationEvent::builder(EventType::ReplayRejected)
            .failure("message ID seen before")
            .partner(issuer)
            .detail("message_id", id)
            .emit();
        Err(SamlError::Replayed(id.to_string()))
    }

    /// Runs [`ReplayGuard::check_validity`] against the current time, then
    /// [`ReplayGuard::remember`].
    ///
    /// # Errors
    ///
    /// See both methods.
    pub async fn check(
        &self,
        issuer: &str,
        id: &str,
        issue_instant: DateTime<Utc>,
        not_on_or_after: Option<DateTime<Utc>>,
    ) -> SamlResult<()> {
        self.check_validity(issue_instant, not_on_or_after, Utc::now())?;
        self.remember(issuer, id).await
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
