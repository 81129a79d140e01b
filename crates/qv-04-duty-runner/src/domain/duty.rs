//! Duties and the value agreed on for them

use qv_01_messages::{codec, MessageResult};
use serde::{Deserialize, Serialize};
use shared_crypto::sha256;
use shared_types::{RoleType, Root, Signature};

/// Beacon chain slot
pub type Slot = u64;

pub const SLOTS_PER_EPOCH: Slot = 32;

/// A beacon duty assigned to the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duty {
    pub role: RoleType,
    pub slot: Slot,
    pub validator_index: u64,
    pub committee_index: u64,
}

impl Duty {
    pub fn epoch(&self) -> u64 {
        self.slot / SLOTS_PER_EPOCH
    }

    /// Root a proposer's RANDAO reveal signs: the duty's epoch.
    pub fn randao_root(&self) -> Root {
        sha256(&self.epoch().to_le_bytes())
    }

    /// Whether the duty collects a validator signature before consensus.
    pub fn needs_pre_consensus(&self) -> bool {
        needs_pre_consensus(self.role)
    }
}

pub fn needs_pre_consensus(role: RoleType) -> bool {
    role == RoleType::Proposer
}

/// The value a QBFT instance decides: the duty and its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusData {
    pub duty: Duty,
    /// Opaque duty payload, e.g. attestation data
    pub data: Vec<u8>,
}

impl ConsensusData {
    pub fn encode(&self) -> MessageResult<Vec<u8>> {
        codec::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> MessageResult<Self> {
        codec::decode(bytes)
    }

    /// Root the post-consensus partial signatures are taken over.
    pub fn signing_root(&self) -> Root {
        sha256(&self.data)
    }
}

/// A duty with its reconstructed validator signature, ready for the
/// beacon node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDuty {
    pub duty: Duty,
    pub data: Vec<u8>,
    pub signing_root: Root,
    pub signature: Signature,
}
