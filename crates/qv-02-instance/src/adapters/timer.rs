//! Tokio round timer
//!
//! One timer per controller. Scheduling a round aborts the previous task, so
//! a stale round can never fire after the instance has moved on. The
//! instance also ignores timeouts for rounds other than its current one.

use parking_lot::Mutex;
use shared_types::{Height, Identifier, Round};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::domain::RoundTimeoutPolicy;

/// Timer expiry delivered to the owning controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundTimeout {
    pub identifier: Identifier,
    pub height: Height,
    pub round: Round,
}

pub struct RoundTimer {
    policy: RoundTimeoutPolicy,
    identifier: Identifier,
    tx: mpsc::UnboundedSender<RoundTimeout>,
    running: Mutex<Option<JoinHandle<()>>>,
}

impl RoundTimer {
    pub fn new(
        policy: RoundTimeoutPolicy,
        identifier: Identifier,
        tx: mpsc::UnboundedSender<RoundTimeout>,
    ) -> Self {
        Self {
            policy,
            identifier,
            tx,
            running: Mutex::new(None),
        }
    }

    /// Start the timer for `(height, round)`, replacing any running one.
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, height: Height, round: Round) {
        let duration = self.policy.timeout_for(round);
        let tx = self.tx.clone();
        let expiry = RoundTimeout {
            identifier: self.identifier.clone(),
            height,
            round,
        };
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // receiver gone means the controller shut down
            let _ = tx.send(expiry);
        });
        if let Some(previous) = self.running.lock().replace(task) {
            previous.abort();
        }
        debug!(height, round, timeout_ms = duration.as_millis() as u64, "Round timer armed");
    }

    pub fn cancel(&self) {
        if let Some(previous) = self.running.lock().take() {
            previous.abort();
        }
    }
}

impl Drop for RoundTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
