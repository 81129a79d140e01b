//! Signed consensus messages
//!
//! A [`SignedMessage`] carries one BLS signature and the set of operators
//! that produced it. Single-signer messages are what operators broadcast;
//! multi-signer messages are aggregates (decided proofs, justifications).
//!
//! ## Aggregation Invariant
//!
//! Two signed messages combine only if their roots are equal and their
//! signer sets are disjoint. A failed aggregation leaves both inputs as they
//! were.

use serde::{Deserialize, Serialize};
use shared_crypto::{aggregate_signatures, fast_aggregate_verify, signing_root, KeyManager};
use shared_types::{
    BlsPublicKey, DomainType, Operator, OperatorId, Root, Signature, QBFT_SIG_TYPE,
};

use super::codec;
use super::message::Message;
use crate::error::{MessageError, MessageResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    pub message: Message,
    pub signature: Signature,
    /// Sorted when built locally; peers' ordering is not trusted.
    pub signers: Vec<OperatorId>,
}

impl SignedMessage {
    pub fn new(message: Message, signature: Signature, mut signers: Vec<OperatorId>) -> Self {
        signers.sort_unstable();
        Self {
            message,
            signature,
            signers,
        }
    }

    /// Sign `message` as `operator_id` through the signer capability.
    pub fn sign(
        message: Message,
        operator_id: OperatorId,
        key_manager: &dyn KeyManager,
        domain: &DomainType,
        share_public_key: &BlsPublicKey,
    ) -> MessageResult<Self> {
        let root = message.root()?;
        let signature = key_manager.sign_root(&root, QBFT_SIG_TYPE, domain, share_public_key)?;
        Ok(Self::new(message, signature, vec![operator_id]))
    }

    /// Structural checks: at least one signer, no signer repeated.
    pub fn validate(&self) -> MessageResult<()> {
        if self.signers.is_empty() {
            return Err(MessageError::NoSigners);
        }
        let mut sorted = self.signers.clone();
        sorted.sort_unstable();
        if let Some(dup) = sorted.windows(2).find(|w| w[0] == w[1]) {
            return Err(MessageError::DuplicateSigner(dup[0]));
        }
        Ok(())
    }

    /// Proposal, Prepare, Commit and RoundChange broadcasts are signed by
    /// exactly one operator.
    pub fn validate_single_signer(&self) -> MessageResult<()> {
        if self.signers.len() != 1 {
            return Err(MessageError::UnexpectedSignerCount {
                expected: 1,
                actual: self.signers.len(),
            });
        }
        Ok(())
    }

    /// Verify the (possibly aggregate) signature against the signers' keys.
    ///
    /// Every signer must be a committee member.
    pub fn verify(&self, domain: &DomainType, committee: &[Operator]) -> MessageResult<()> {
        self.validate()?;
        let public_keys = self
            .signers
            .iter()
            .map(|id| {
                committee
                    .iter()
                    .find(|op| op.id == *id)
                    .map(|op| op.public_key)
                    .ok_or(MessageError::UnknownSigner(*id))
            })
            .collect::<MessageResult<Vec<_>>>()?;
        let root = signing_root(&self.message.root()?, domain, QBFT_SIG_TYPE);
        fast_aggregate_verify(&public_keys, &root, &self.signature)?;
        Ok(())
    }

    /// Fold `other` into `self`.
    pub fn aggregate(&mut self, other: &SignedMessage) -> MessageResult<()> {
        if self.message.root()? != other.message.root()? {
            return Err(MessageError::RootMismatch);
        }
        let overlap = self.common_signers(other);
        if !overlap.is_empty() {
            return Err(MessageError::OverlappingSigners(overlap));
        }
        let signature = aggregate_signatures(&[self.signature, other.signature])?;

        let mut signers = self.signers.clone();
        signers.extend_from_slice(&other.signers);
        signers.sort_unstable();

        self.signature = signature;
        self.signers = signers;
        Ok(())
    }

    pub fn common_signers(&self, other: &SignedMessage) -> Vec<OperatorId> {
        self.signers
            .iter()
            .filter(|id| other.signers.contains(id))
            .copied()
            .collect()
    }

    pub fn has_signer(&self, id: OperatorId) -> bool {
        self.signers.contains(&id)
    }

    /// Order-insensitive equality of signer multisets.
    pub fn matched_signers(&self, ids: &[OperatorId]) -> bool {
        matched_signers(&self.signers, ids)
    }

    pub fn root(&self) -> MessageResult<Root> {
        self.message.root()
    }

    pub fn encode(&self) -> MessageResult<Vec<u8>> {
        codec::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> MessageResult<Self> {
        codec::decode(bytes)
    }
}

/// Multiset equality of two signer lists.
pub fn matched_signers(a: &[OperatorId], b: &[OperatorId]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{identifier, multi_signed, signed};
    use shared_crypto::test_utils::TestCommittee;

    #[test]
    fn test_single_signer_verifies() {
        let committee = TestCommittee::new(4);
        let msg = Message::prepare(1, 1, identifier(&committee), b"value").unwrap();
        let signed_msg = signed(&committee, 2, msg);

        assert!(signed_msg
            .verify(&committee.domain, &committee.operators())
            .is_ok());
        assert!(signed_msg.validate_single_signer().is_ok());
    }

    #[test]
    fn test_verify_rejects_wrong_claimed_signer() {
        let committee = TestCommittee::new(4);
        let msg = Message::prepare(1, 1, identifier(&committee), b"value").unwrap();
        let mut signed_msg = signed(&committee, 2, msg);
        signed_msg.signers = vec![3];

        assert!(matches!(
            signed_msg.verify(&committee.domain, &committee.operators()),
            Err(MessageError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_verify_rejects_non_member() {
        let committee = TestCommittee::new(4);
        let msg = Message::prepare(1, 1, identifier(&committee), b"value").unwrap();
        let mut signed_msg = signed(&committee, 2, msg);
        signed_msg.signers = vec![9];

        assert_eq!(
            signed_msg.verify(&committee.domain, &committee.operators()),
            Err(MessageError::UnknownSigner(9))
        );
    }

    #[test]
    fn test_validate_rejects_duplicates_and_empty() {
        let committee = TestCommittee::new(4);
        let msg = Message::commit(1, 1, identifier(&committee), b"value").unwrap();
        let mut signed_msg = signed(&committee, 1, msg);

        signed_msg.signers = vec![];
        assert_eq!(signed_msg.validate(), Err(MessageError::NoSigners));

        signed_msg.signers = vec![2, 1, 2];
        assert_eq!(signed_msg.validate(), Err(MessageError::DuplicateSigner(2)));
        assert_eq!(
            signed_msg.validate().unwrap_err().kind(),
            shared_types::ErrorKind::ProtocolViolation
        );
    }

    #[test]
    fn test_aggregate_disjoint_signers() {
        let committee = TestCommittee::new(4);
        let msg = Message::commit(1, 1, identifier(&committee), b"value").unwrap();
        let mut agg = signed(&committee, 3, msg.clone());
        agg.aggregate(&signed(&committee, 1, msg.clone())).unwrap();
        agg.aggregate(&signed(&committee, 2, msg)).unwrap();

        assert_eq!(agg.signers, vec![1, 2, 3]);
        assert!(agg.verify(&committee.domain, &committee.operators()).is_ok());
    }

    #[test]
    fn test_aggregate_overlap_leaves_inputs_unchanged() {
        let committee = TestCommittee::new(4);
        let msg = Message::commit(1, 1, identifier(&committee), b"value").unwrap();
        let mut a = multi_signed(&committee, &[1, 2], msg.clone());
        let b = multi_signed(&committee, &[2, 3], msg);
        let (a_before, b_before) = (a.clone(), b.clone());

        assert_eq!(a.aggregate(&b), Err(MessageError::OverlappingSigners(vec![2])));
        assert_eq!(a, a_before);
        assert_eq!(b, b_before);
    }

    #[test]
    fn test_aggregate_different_roots_fails() {
        let committee = TestCommittee::new(4);
        let id = identifier(&committee);
        let mut a = signed(&committee, 1, Message::commit(1, 1, id.clone(), b"a").unwrap());
        let b = signed(&committee, 2, Message::commit(1, 1, id, b"b").unwrap());
        let before = a.clone();

        assert_eq!(a.aggregate(&b), Err(MessageError::RootMismatch));
        assert_eq!(a, before);
    }

    #[test]
    fn test_matched_signers_is_multiset_equality() {
        assert!(matched_signers(&[3, 1, 2], &[1, 2, 3]));
        assert!(!matched_signers(&[1, 2], &[1, 2, 3]));
        assert!(!matched_signers(&[1, 2, 3], &[1, 2]));
        assert!(!matched_signers(&[1, 1, 2], &[1, 2, 2]));
    }
}
