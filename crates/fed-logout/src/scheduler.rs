//! Fallback deadlines for front-channel attempts.
//!
//! One task owns every pending deadline, kept in a map ordered by time.
//! There is no cancellation: a deadline whose attempt was already settled
//! reaches the handler anyway and the handler does nothing.

use std::collections::BTreeMap;
use std::sync::Weak;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::attempt::AttemptKey;

/// Receives expired deadlines.
#[async_trait]
pub trait FallbackHandler: Send + Sync {
    /// Called once per scheduled key, at or after its deadline.
    async fn on_deadline(&self, key: AttemptKey);
}

/// Handle to the deadline task.
///
/// The task ends when this handle is dropped or when the handler is gone.
#[derive(Debug, Clone)]
pub struct FallbackScheduler {
    commands: mpsc::UnboundedSender<(Instant, AttemptKey)>,
}

impl FallbackScheduler {
    /// Starts the deadline task. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn spawn(handler: Weak<dyn FallbackHandler>) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, handler));
        Self { commands }
    }

    /// Schedules `key` for `deadline`. Returns false if the task has ended.
    pub fn schedule(&self, deadline: Instant, key: AttemptKey) -> bool {
        self.commands.send((deadline, key)).is_ok()
    }
}

async fn run(
    mut commands: mpsc::UnboundedReceiver<(Instant, AttemptKey)>,
    handler: Weak<dyn FallbackHandler>,
) {
    // Sequence number keeps equal deadlines distinct.
    let mut pending: BTreeMap<(Instant, u64), AttemptKey> = BTreeMap::new();
    let mut sequence = 0u64;

    loop {
        let next = pending.keys().next().map(|(at, _)| *at);
        tokio::select! {
            command = commands.recv() => match command {
                Some((deadline, key)) => {
                    pending.insert((deadline, sequence), key);
                    sequence = sequence.wrapping_add(1);
                }
                None => break,
            },
            () = wait_for(next) => {
                let now = Instant::now();
                while let Some(entry) = pending.first_entry() {
                    if entry.key().0 > now {
                        break;
                    }
                    let key = entry.remove();
                    let Some(handler) = handler.upgrade() else {
                        tracing::debug!("Fallback handler gone, stopping scheduler");
                        return;
                    };
                    tracing::debug!(
                        saga = %key.saga_id,
                        entity_id = %key.entity_id,
                        "Fallback deadline reached"
                    );
                    tokio::spawn(async move { handler.on_deadline(key).await });
                }
            }
        }
    }
    tracing::debug!(dropped = pending.len(), "Fallback scheduler stopped");
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
