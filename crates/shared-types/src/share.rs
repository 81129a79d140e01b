//! # Committee Share
//!
//! A committee member's view of a distributed validator: who it is, who the
//! other operators are, and the thresholds every quorum decision uses.
//!
//! Reference: Byzantine quorum sizes for `n >= 3f + 1`.

use crate::consensus::{Height, OperatorId, Round};
use crate::errors::TypesError;
use crate::signature::{BlsPublicKey, DomainType};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};

/// A committee member and its share public key.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: OperatorId,
    /// Public key of this operator's key share.
    #[serde_as(as = "Bytes")]
    pub public_key: BlsPublicKey,
}

/// Committee descriptor. Immutable for the lifetime of an instance.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    /// This node's operator id.
    pub operator_id: OperatorId,
    /// Aggregate (validator) public key.
    #[serde_as(as = "Bytes")]
    pub validator_public_key: BlsPublicKey,
    /// Ordered committee. Leader election indexes into this order.
    pub committee: Vec<Operator>,
    pub domain: DomainType,
}

impl Share {
    /// Build a share. Rejects an empty committee, duplicated ids, or a
    /// committee that does not contain `operator_id`.
    pub fn new(
        operator_id: OperatorId,
        validator_public_key: BlsPublicKey,
        committee: Vec<Operator>,
        domain: DomainType,
    ) -> Result<Self, TypesError> {
        if committee.is_empty() {
            return Err(TypesError::InvalidCommittee("empty committee".into()));
        }
        let mut ids: Vec<OperatorId> = committee.iter().map(|o| o.id).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != committee.len() {
            return Err(TypesError::InvalidCommittee("duplicate operator id".into()));
        }
        if !ids.contains(&operator_id) {
            return Err(TypesError::InvalidCommittee(format!(
                "operator {} not in committee",
                operator_id
            )));
        }
        Ok(Self {
            operator_id,
            validator_public_key,
            committee,
            domain,
        })
    }

    pub fn committee_size(&self) -> usize {
        self.committee.len()
    }

    /// Strong quorum: `ceil((2n + 1) / 3)`.
    pub fn quorum(&self) -> usize {
        let n = self.committee.len();
        (2 * n + 1).div_ceil(3)
    }

    /// Partial quorum: `ceil((n + 1) / 3)`.
    pub fn partial_quorum(&self) -> usize {
        let n = self.committee.len();
        (n + 1).div_ceil(3)
    }

    pub fn has_quorum(&self, count: usize) -> bool {
        count >= self.quorum()
    }

    pub fn has_partial_quorum(&self, count: usize) -> bool {
        count >= self.partial_quorum()
    }

    pub fn operator(&self, id: OperatorId) -> Option<&Operator> {
        self.committee.iter().find(|o| o.id == id)
    }

    pub fn is_member(&self, id: OperatorId) -> bool {
        self.operator(id).is_some()
    }

    /// Deterministic round-robin proposer for `(height, round)`.
    pub fn leader(&self, height: Height, round: Round) -> OperatorId {
        let n = self.committee.len() as u64;
        let index = height.wrapping_add(round) % n;
        self.committee[index as usize].id
    }

    pub fn is_leader(&self, height: Height, round: Round) -> bool {
        self.leader(height, round) == self.operator_id
    }
}
