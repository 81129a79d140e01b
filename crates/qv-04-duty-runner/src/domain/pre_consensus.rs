//! Pre-consensus collection
//!
//! A proposer duty starts by collecting RANDAO partial signatures. Once a
//! quorum reconstructs the validator's reveal, the block built with it goes
//! to consensus.
//!
//! ```text
//! start ──→ collecting (own partial + peers', first write per signer wins)
//!                │ quorum
//!                ↓
//!           reveal reconstructed ──→ consensus on the produced block
//! ```

use std::collections::BTreeMap;

use shared_types::{OperatorId, Root, Signature};

use super::duty::Duty;

#[derive(Debug)]
pub struct PreConsensusState {
    pub duty: Duty,
    /// Caller payload handed to the block producer with the reveal
    pub graffiti: Vec<u8>,
    signing_root: Root,
    quorum: usize,
    partials: BTreeMap<OperatorId, Signature>,
    reveal: Option<Signature>,
}

impl PreConsensusState {
    pub fn new(duty: Duty, graffiti: Vec<u8>, quorum: usize) -> Self {
        let signing_root = duty.randao_root();
        Self {
            duty,
            graffiti,
            signing_root,
            quorum,
            partials: BTreeMap::new(),
            reveal: None,
        }
    }

    pub fn signing_root(&self) -> Root {
        self.signing_root
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

    pub fn reveal(&self) -> Option<&Signature> {
        self.reveal.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.reveal.is_some()
    }

    pub fn finish(&mut self, reveal: Signature) {
        self.reveal = Some(reveal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::RoleType;

    fn state() -> PreConsensusState {
        let duty = Duty {
            role: RoleType::Proposer,
            slot: 40,
            validator_index: 0,
            committee_index: 0,
        };
        PreConsensusState::new(duty, b"graffiti".to_vec(), 3)
    }

    #[test]
    fn test_first_partial_per_signer_wins() {
        let mut state = state();
        assert!(state.add_partial(2, Signature::new([1; 96])));
        assert!(!state.add_partial(2, Signature::new([2; 96])));
        assert_eq!(state.partials()[&2], Signature::new([1; 96]));
    }

    #[test]
    fn test_root_is_duty_epoch() {
        let state = state();
        assert_eq!(state.signing_root(), state.duty.randao_root());
        assert!(!state.is_finished());
    }
}
