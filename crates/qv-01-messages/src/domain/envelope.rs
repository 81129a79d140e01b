//! Network envelope
//!
//! Everything exchanged between operators travels as an [`SsvMessage`]; the
//! identifier routes it to one validator's role pipeline and the type tells
//! the receiver how to decode `data`.

use serde::{Deserialize, Serialize};
use shared_types::Identifier;

use super::codec;
use super::post_consensus::SignedPostConsensusMessage;
use super::pre_consensus::SignedPreConsensusMessage;
use super::signed::SignedMessage;
use super::sync::{SyncRequest, SyncResponse};
use crate::error::{MessageError, MessageResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SsvMsgType {
    /// Single-signer QBFT message
    Consensus,
    /// Aggregated commit proving a decided height
    Decided,
    /// Partial signature after consensus
    PostConsensus,
    /// History request or response
    Sync,
    /// Partial signature before consensus, e.g. a proposer's RANDAO reveal
    PreConsensus,
}

/// Sync envelopes carry either side of the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPayload {
    Request(SyncRequest),
    Response(SyncResponse),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsvMessage {
    pub msg_type: SsvMsgType,
    pub id: Identifier,
    pub data: Vec<u8>,
}

impl SsvMessage {
    pub fn consensus(msg: &SignedMessage) -> MessageResult<Self> {
        Self::wrap(SsvMsgType::Consensus, msg.message.identifier.clone(), msg)
    }

    pub fn decided(msg: &SignedMessage) -> MessageResult<Self> {
        Self::wrap(SsvMsgType::Decided, msg.message.identifier.clone(), msg)
    }

    pub fn post_consensus(id: Identifier, msg: &SignedPostConsensusMessage) -> MessageResult<Self> {
        Self::wrap(SsvMsgType::PostConsensus, id, msg)
    }

    pub fn pre_consensus(id: Identifier, msg: &SignedPreConsensusMessage) -> MessageResult<Self> {
        Self::wrap(SsvMsgType::PreConsensus, id, msg)
    }

    pub fn sync(id: Identifier, payload: &SyncPayload) -> MessageResult<Self> {
        Self::wrap(SsvMsgType::Sync, id, payload)
    }

    fn wrap<T: Serialize>(msg_type: SsvMsgType, id: Identifier, payload: &T) -> MessageResult<Self> {
        Ok(Self {
            msg_type,
            id,
            data: codec::encode(payload)?,
        })
    }

    fn expect_type(&self, expected: &[SsvMsgType]) -> MessageResult<()> {
        if !expected.contains(&self.msg_type) {
            return Err(MessageError::Decoding(format!(
                "unexpected envelope type {:?}",
                self.msg_type
            )));
        }
        Ok(())
    }

    /// Inner signed message of a Consensus or Decided envelope. The inner
    /// identifier must match the envelope's.
    pub fn signed_message(&self) -> MessageResult<SignedMessage> {
        self.expect_type(&[SsvMsgType::Consensus, SsvMsgType::Decided])?;
        let msg: SignedMessage = codec::decode(&self.data)?;
        if msg.message.identifier != self.id {
            return Err(MessageError::Decoding("identifier mismatch".into()));
        }
        Ok(msg)
    }

    pub fn post_consensus_message(&self) -> MessageResult<SignedPostConsensusMessage> {
        self.expect_type(&[SsvMsgType::PostConsensus])?;
        codec::decode(&self.data)
    }

    pub fn pre_consensus_message(&self) -> MessageResult<SignedPreConsensusMessage> {
        self.expect_type(&[SsvMsgType::PreConsensus])?;
        codec::decode(&self.data)
    }

    pub fn sync_payload(&self) -> MessageResult<SyncPayload> {
        self.expect_type(&[SsvMsgType::Sync])?;
        codec::decode(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Message;
    use crate::test_utils::{identifier, signed};
    use shared_crypto::test_utils::TestCommittee;
    use shared_types::RoleType;

    #[test]
    fn test_envelope_unwraps_by_type() {
        let committee = TestCommittee::new(4);
        let msg = signed(
            &committee,
            1,
            Message::commit(3, 1, identifier(&committee), b"v").unwrap(),
        );

        let env = SsvMessage::decided(&msg).unwrap();
        assert_eq!(env.msg_type, SsvMsgType::Decided);
        assert_eq!(env.signed_message().unwrap(), msg);
        assert!(env.post_consensus_message().is_err());
        assert!(env.pre_consensus_message().is_err());
        assert!(env.sync_payload().is_err());
    }

    #[test]
    fn test_identifier_mismatch_rejected() {
        let committee = TestCommittee::new(4);
        let msg = signed(
            &committee,
            1,
            Message::commit(3, 1, identifier(&committee), b"v").unwrap(),
        );
        let mut env = SsvMessage::consensus(&msg).unwrap();
        env.id = Identifier::new(&[9u8; 48], RoleType::Proposer);
        assert!(env.signed_message().is_err());
    }
}
