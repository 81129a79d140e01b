//! Instance state
//!
//! ```text
//! NotStarted ──start──→ Propose ──proposal──→ Prepare ──prepare quorum──→ Commit
//!                          │                     │                          │
//!                          └──────timeout────────┴──→ RoundChange ←─timeout─┘
//!                                                         │
//!                                  justified proposal ────┘ (back to Prepare)
//!
//! any live stage ──commit quorum / force decide──→ Decided
//! any stage ──stop──→ Stopped
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use qv_01_messages::SignedMessage;
use shared_types::{Height, Identifier, Round, Share, FIRST_ROUND, NO_ROUND};

use crate::error::{InstanceError, InstanceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    NotStarted,
    /// Waiting for the round's proposal
    Propose,
    /// Proposal accepted, collecting prepares
    Prepare,
    /// Prepared, collecting commits
    Commit,
    /// Round timed out, collecting round changes
    RoundChange,
    Decided,
    Stopped,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Decided | Stage::Stopped)
    }

    /// Decided may only be left for Stopped; Stopped is final.
    fn can_transition_to(self, to: Stage) -> bool {
        match (self, to) {
            (Stage::Stopped, _) => false,
            (Stage::Decided, Stage::Stopped) => true,
            (Stage::Decided, _) => false,
            (_, Stage::NotStarted) => false,
            _ => true,
        }
    }
}

/// Per-instance consensus state.
#[derive(Debug, Clone)]
pub struct State {
    pub share: Share,
    pub identifier: Identifier,
    pub height: Height,
    pub round: Round,
    pub stage: Stage,
    /// `NO_ROUND` until this node sees a prepare quorum
    pub last_prepared_round: Round,
    /// Present iff `last_prepared_round != NO_ROUND`
    pub last_prepared_value: Option<Vec<u8>>,
    pub proposal_accepted_for_current_round: Option<SignedMessage>,
    /// Value supplied at start
    pub input_value: Option<Vec<u8>>,
    /// Round for which this node already broadcast its commit
    pub commit_sent_round: Option<Round>,
    pub decided_value: Option<Vec<u8>>,
    /// Aggregated commit proving the decision
    pub decided_message: Option<SignedMessage>,
}

impl State {
    pub fn new(share: Share, identifier: Identifier, height: Height) -> Self {
        Self {
            share,
            identifier,
            height,
            round: FIRST_ROUND,
            stage: Stage::NotStarted,
            last_prepared_round: NO_ROUND,
            last_prepared_value: None,
            proposal_accepted_for_current_round: None,
            input_value: None,
            commit_sent_round: None,
            decided_value: None,
            decided_message: None,
        }
    }

    pub fn transition(&mut self, to: Stage) -> InstanceResult<()> {
        if !self.stage.can_transition_to(to) {
            return Err(InstanceError::InvalidTransition {
                from: self.stage,
                to,
            });
        }
        self.stage = to;
        Ok(())
    }

    /// Move to a higher round, forgetting the previous round's proposal.
    pub fn advance_round(&mut self, round: Round, stage: Stage) -> InstanceResult<()> {
        if round <= self.round {
            return Err(InstanceError::StaleRound {
                current: self.round,
                actual: round,
            });
        }
        self.transition(stage)?;
        self.round = round;
        self.proposal_accepted_for_current_round = None;
        Ok(())
    }

    pub fn set_prepared(&mut self, round: Round, value: Vec<u8>) {
        self.last_prepared_round = round;
        self.last_prepared_value = Some(value);
    }

    pub fn is_leader(&self, round: Round) -> bool {
        self.share.is_leader(self.height, round)
    }
}

/// Lock-free view of an instance's decision, shared with the controller.
#[derive(Debug, Clone, Default)]
pub struct DecidedHandle {
    inner: Arc<DecidedInner>,
}

#[derive(Debug, Default)]
struct DecidedInner {
    decided: AtomicBool,
    value: RwLock<Option<Vec<u8>>>,
}

impl DecidedHandle {
    pub fn is_decided(&self) -> bool {
        self.inner.decided.load(Ordering::Acquire)
    }

    pub fn value(&self) -> Option<Vec<u8>> {
        if !self.is_decided() {
            return None;
        }
        self.inner.value.read().clone()
    }

    pub(crate) fn set(&self, value: Vec<u8>) {
        *self.inner.value.write() = Some(value);
        self.inner.decided.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decided_is_terminal_except_stop() {
        assert!(Stage::Decided.can_transition_to(Stage::Stopped));
        assert!(!Stage::Decided.can_transition_to(Stage::RoundChange));
        assert!(!Stage::Stopped.can_transition_to(Stage::Decided));
        assert!(Stage::Commit.can_transition_to(Stage::RoundChange));
        assert!(!Stage::Prepare.can_transition_to(Stage::NotStarted));
    }

    #[test]
    fn test_decided_handle_publishes_value_once_set() {
        let handle = DecidedHandle::default();
        let reader = handle.clone();
        assert!(!reader.is_decided());
        assert_eq!(reader.value(), None);

        handle.set(b"value".to_vec());
        assert!(reader.is_decided());
        assert_eq!(reader.value(), Some(b"value".to_vec()));
    }
}
