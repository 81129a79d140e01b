//! Duty execution state
//!
//! One execution per runner: created when a duty starts consensus, filled
//! with the decided value and the partial signatures that follow, and
//! replaced when the next duty starts.
//!
//! ```text
//! (none) ──start──→ AwaitingConsensus ──decided──→ AwaitingPostConsensus ──quorum──→ Finished
//!                        │ partials buffered            │ partials collected,
//!                        │ (bounded)                    │ first write per signer wins
//! ```

use std::collections::BTreeMap;

use qv_01_messages::SignedPostConsensusMessage;
use shared_types::{Height, OperatorId, Root, Signature};

use super::duty::{ConsensusData, Duty, Slot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunnerPhase {
    AwaitingConsensus,
    AwaitingPostConsensus,
    Finished,
}

/// What [`crate::DutyRunner::start_duty`] set in motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DutyStart {
    /// Consensus started at this height
    Consensus { height: Height },
    /// RANDAO collection started; consensus follows once a quorum of
    /// partials reconstructs the reveal
    PreConsensus { slot: Slot },
}

impl RunnerPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            RunnerPhase::AwaitingConsensus => "awaiting_consensus",
            RunnerPhase::AwaitingPostConsensus => "awaiting_post_consensus",
            RunnerPhase::Finished => "finished",
        }
    }
}

#[derive(Debug)]
pub struct DutyExecutionState {
    pub duty: Duty,
    /// Height of the instance running this duty's consensus
    pub height: Height,
    phase: RunnerPhase,
    decided: Option<ConsensusData>,
    signing_root: Option<Root>,
    quorum: usize,
    partials: BTreeMap<OperatorId, Signature>,
    early: Vec<SignedPostConsensusMessage>,
    signature: Option<Signature>,
}

impl DutyExecutionState {
    pub fn new(duty: Duty, height: Height, quorum: usize) -> Self {
        Self {
            duty,
            height,
            phase: RunnerPhase::AwaitingConsensus,
            decided: None,
            signing_root: None,
            quorum,
            partials: BTreeMap::new(),
            early: Vec::new(),
            signature: None,
        }
    }

    pub fn phase(&self) -> RunnerPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase == RunnerPhase::Finished
    }

    pub fn decided(&self) -> Option<&ConsensusData> {
        self.decided.as_ref()
    }

    pub fn signing_root(&self) -> Option<Root> {
        self.signing_root
    }

    /// Reconstructed validator signature once finished.
    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn set_decided(&mut self, value: ConsensusData) {
        self.signing_root = Some(value.signing_root());
        self.decided = Some(value);
        self.phase = RunnerPhase::AwaitingPostConsensus;
    }

    /// Store `signer`'s partial unless one is already stored.
    pub fn add_partial(&mut self, signer: OperatorId, partial: Signature) -> bool {
        if self.partials.contains_key(&signer) {
            return false;
        }
        self.partials.insert(signer, partial);
        true
    }

    pub fn has_partial(&self, signer: OperatorId) -> bool {
        self.partials.contains_key(&signer)
    }

    pub fn partials(&self) -> &BTreeMap<OperatorId, Signature> {
        &self.partials
    }

    pub fn signers(&self) -> Vec<OperatorId> {
        self.partials.keys().copied().collect()
    }

    pub fn has_quorum(&self) -> bool {
        self.partials.len() >= self.quorum
    }

    /// Keep a partial that arrived before the decision. Returns `false`
    /// when the buffer is full. A signer's later copies are dropped.
    pub fn buffer_early(&mut self, msg: SignedPostConsensusMessage, max: usize) -> bool {
        let signer = msg.signer();
        if self.early.iter().any(|m| m.signer() == signer) {
            return true;
        }
        if self.early.len() >= max {
            return false;
        }
        self.early.push(msg);
        true
    }

    pub fn take_early(&mut self) -> Vec<SignedPostConsensusMessage> {
        std::mem::take(&mut self.early)
    }

    pub fn early_len(&self) -> usize {
        self.early.len()
    }

    pub fn finish(&mut self, signature: Signature) {
        self.signature = Some(signature);
        self.phase = RunnerPhase::Finished;
    }
}
