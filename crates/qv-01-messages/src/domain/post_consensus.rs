//! Post-consensus partial signature messages
//!
//! After a height is decided every operator signs the duty's signing root
//! with its key share and broadcasts the partial signature. The partial is
//! wrapped in a signed envelope so the sender is authenticated independently
//! of the partial's own validity.

use serde::{Deserialize, Serialize};
use shared_crypto::{signing_root, verify, KeyManager};
use shared_types::{
    BlsPublicKey, DomainType, Height, Operator, OperatorId, Root, Signature,
    POST_CONSENSUS_SIG_TYPE,
};

use super::codec;
use super::signed::matched_signers;
use crate::error::{MessageError, MessageResult};

/// A signer's partial signature over a decided duty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostConsensusMessage {
    pub height: Height,
    /// Partial signature over `duty_signing_root`
    pub duty_signature: Signature,
    pub duty_signing_root: Root,
    pub signers: Vec<OperatorId>,
}

impl PostConsensusMessage {
    /// Signature and root lengths are enforced by their types; a partial
    /// comes from exactly one signer.
    pub fn validate(&self) -> MessageResult<()> {
        if self.signers.len() != 1 {
            return Err(MessageError::UnexpectedSignerCount {
                expected: 1,
                actual: self.signers.len(),
            });
        }
        Ok(())
    }

    pub fn root(&self) -> MessageResult<Root> {
        codec::root(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPostConsensusMessage {
    pub message: PostConsensusMessage,
    pub signature: Signature,
    pub signers: Vec<OperatorId>,
}

impl SignedPostConsensusMessage {
    /// Produce the partial signature for `duty_signing_root` and sign the
    /// envelope, both with the operator's share key.
    pub fn sign(
        height: Height,
        duty_signing_root: Root,
        operator_id: OperatorId,
        key_manager: &dyn KeyManager,
        domain: &DomainType,
        share_public_key: &BlsPublicKey,
    ) -> MessageResult<Self> {
        let duty_signature = key_manager.sign_root(
            &duty_signing_root,
            POST_CONSENSUS_SIG_TYPE,
            domain,
            share_public_key,
        )?;
        let message = PostConsensusMessage {
            height,
            duty_signature,
            duty_signing_root,
            signers: vec![operator_id],
        };
        let signature = key_manager.sign_root(
            &message.root()?,
            POST_CONSENSUS_SIG_TYPE,
            domain,
            share_public_key,
        )?;
        Ok(Self {
            message,
            signature,
            signers: vec![operator_id],
        })
    }

    /// Exactly one signer, matching the inner message's signer.
    pub fn validate(&self) -> MessageResult<()> {
        if self.signers.len() != 1 {
            return Err(MessageError::UnexpectedSignerCount {
                expected: 1,
                actual: self.signers.len(),
            });
        }
        self.message.validate()?;
        if !self.matched_signers(&self.message.signers) {
            return Err(MessageError::InvalidPostConsensus(
                "envelope and partial signers differ".into(),
            ));
        }
        Ok(())
    }

    /// Verify the envelope signature against the signer's share key.
    pub fn verify(&self, domain: &DomainType, committee: &[Operator]) -> MessageResult<()> {
        self.validate()?;
        let signer = self.signer();
        let operator = committee
            .iter()
            .find(|op| op.id == signer)
            .ok_or(MessageError::UnknownSigner(signer))?;
        let root = signing_root(&self.message.root()?, domain, POST_CONSENSUS_SIG_TYPE);
        verify(&operator.public_key, &root, &self.signature)?;
        Ok(())
    }

    /// The single signer. Meaningful only after [`Self::validate`].
    pub fn signer(&self) -> OperatorId {
        self.signers.first().copied().unwrap_or_default()
    }

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

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::test_utils::TestCommittee;

    fn partial(committee: &TestCommittee, signer: OperatorId) -> SignedPostConsensusMessage {
        SignedPostConsensusMessage::sign(
            1,
            [7u8; 32],
            signer,
            committee.key_manager_for(signer).as_ref(),
            &committee.domain,
            &committee.share_pair(signer).public_key(),
        )
        .unwrap()
    }

    #[test]
    fn test_signed_partial_verifies() {
        let committee = TestCommittee::new(4);
        let msg = partial(&committee, 3);
        assert!(msg.verify(&committee.domain, &committee.operators()).is_ok());
        assert_eq!(msg.signer(), 3);
    }

    #[test]
    fn test_validate_requires_exactly_one_signer() {
        let committee = TestCommittee::new(4);
        let mut msg = partial(&committee, 1);
        msg.signers = vec![1, 2];
        assert!(matches!(
            msg.validate(),
            Err(MessageError::UnexpectedSignerCount { expected: 1, actual: 2 })
        ));

        let mut msg = partial(&committee, 1);
        msg.signers = vec![];
        assert!(msg.validate().is_err());

        let mut msg = partial(&committee, 1);
        msg.message.signers = vec![];
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_envelope_signer_must_match_partial_signer() {
        let committee = TestCommittee::new(4);
        let mut msg = partial(&committee, 1);
        msg.signers = vec![2];
        assert!(matches!(
            msg.validate(),
            Err(MessageError::InvalidPostConsensus(_))
        ));
    }

    #[test]
    fn test_tampered_partial_fails_envelope_check() {
        let committee = TestCommittee::new(4);
        let mut msg = partial(&committee, 1);
        msg.message.duty_signing_root = [8u8; 32];
        assert!(msg.verify(&committee.domain, &committee.operators()).is_err());
    }

    #[test]
    fn test_short_signature_rejected_on_decode() {
        let json = r#"{"height":1,"duty_signature":[1,2,3],"duty_signing_root":[0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0],"signers":[1]}"#;
        assert!(serde_json::from_str::<PostConsensusMessage>(json).is_err());
    }
}
