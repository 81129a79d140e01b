//! Pre-consensus partial signature messages
//!
//! Some duties need a validator signature before there is anything to agree
//! on: a proposer must reveal its RANDAO signature for the epoch before a
//! block can be built. Operators sign that root with their share and
//! exchange the partials in a signed envelope, like post-consensus partials
//! but keyed by slot, since no instance height exists yet.

use serde::{Deserialize, Serialize};
use shared_crypto::{signing_root, verify, KeyManager};
use shared_types::{BlsPublicKey, DomainType, Operator, OperatorId, Root, Signature, PRE_CONSENSUS_SIG_TYPE};

use super::codec;
use super::signed::matched_signers;
use crate::error::{MessageError, MessageResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreConsensusMessage {
    /// Beacon slot of the duty
    pub slot: u64,
    /// Partial signature over `signing_root`
    pub partial_signature: Signature,
    pub signing_root: Root,
    pub signers: Vec<OperatorId>,
}

impl PreConsensusMessage {
    pub fn root(&self) -> MessageResult<Root> {
        codec::root(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPreConsensusMessage {
    pub message: PreConsensusMessage,
    pub signature: Signature,
    pub signers: Vec<OperatorId>,
}

impl SignedPreConsensusMessage {
    /// Partial signature over `signing_root` and the envelope signature,
    /// both with the operator's share key.
    pub fn sign(
        slot: u64,
        signing_root: Root,
        operator_id: OperatorId,
        key_manager: &dyn KeyManager,
        domain: &DomainType,
        share_public_key: &BlsPublicKey,
    ) -> MessageResult<Self> {
        let partial_signature =
            key_manager.sign_root(&signing_root, PRE_CONSENSUS_SIG_TYPE, domain, share_public_key)?;
        let message = PreConsensusMessage {
            slot,
            partial_signature,
            signing_root,
            signers: vec![operator_id],
        };
        let signature = key_manager.sign_root(&message.root()?, PRE_CONSENSUS_SIG_TYPE, domain, share_public_key)?;
        Ok(Self {
            message,
            signature,
            signers: vec![operator_id],
        })
    }

    pub fn validate(&self) -> MessageResult<()> {
        for signers in [&self.signers, &self.message.signers] {
            if signers.len() != 1 {
                return Err(MessageError::UnexpectedSignerCount {
                    expected: 1,
                    actual: signers.len(),
                });
            }
        }
        if !matched_signers(&self.signers, &self.message.signers) {
            return Err(MessageError::InvalidPreConsensus(
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
        let root = signing_root(&self.message.root()?, domain, PRE_CONSENSUS_SIG_TYPE);
        verify(&operator.public_key, &root, &self.signature)?;
        Ok(())
    }

    pub fn signer(&self) -> OperatorId {
        self.signers.first().copied().unwrap_or_default()
    }
}
