//! QBFT consensus messages
//!
//! A [`Message`] is the unsigned envelope `{type, height, round, identifier,
//! data}`; `data` holds the canonical encoding of the type-specific payload.

use serde::{Deserialize, Serialize};
use shared_types::{Height, Identifier, Root, Round, NO_ROUND};

use super::codec;
use super::signed::SignedMessage;
use crate::error::{MessageError, MessageResult};

/// Consensus message family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageType {
    Proposal,
    Prepare,
    Commit,
    RoundChange,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Proposal => "proposal",
            MessageType::Prepare => "prepare",
            MessageType::Commit => "commit",
            MessageType::RoundChange => "round_change",
        }
    }
}

/// Proposal payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalData {
    /// Value the instance tries to decide
    pub data: Vec<u8>,
    /// Quorum of round-change messages for the proposal's round (round > 1)
    pub round_change_justification: Vec<SignedMessage>,
    /// Prepare quorum backing the highest prepared value, if any
    pub prepare_justification: Vec<SignedMessage>,
}

/// Prepare payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareData {
    pub data: Vec<u8>,
}

/// Commit payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitData {
    pub data: Vec<u8>,
}

/// Round-change payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundChangeData {
    /// Value prepared in `prepared_round`; `None` if never prepared
    pub prepared_value: Option<Vec<u8>>,
    /// Last prepared round, `NO_ROUND` if never prepared
    pub prepared_round: Round,
    /// Value the sender would propose if it leads the next round
    pub next_proposal_data: Option<Vec<u8>>,
    /// Prepare quorum for `(prepared_round, prepared_value)`
    pub round_change_justification: Vec<SignedMessage>,
}

impl RoundChangeData {
    /// Round change of a node that never prepared.
    pub fn unprepared(next_proposal_data: Option<Vec<u8>>) -> Self {
        Self {
            prepared_value: None,
            prepared_round: NO_ROUND,
            next_proposal_data,
            round_change_justification: Vec::new(),
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared_round != NO_ROUND
    }

    /// `prepared_value` is present iff `prepared_round != NO_ROUND`, and a
    /// prepared claim carries its justification.
    pub fn validate(&self) -> MessageResult<()> {
        match (self.prepared_round == NO_ROUND, &self.prepared_value) {
            (true, None) => Ok(()),
            (true, Some(_)) => Err(MessageError::InvalidRoundChangeData(
                "prepared value without prepared round".into(),
            )),
            (false, None) => Err(MessageError::InvalidRoundChangeData(
                "prepared round without prepared value".into(),
            )),
            (false, Some(_)) if self.round_change_justification.is_empty() => Err(
                MessageError::InvalidRoundChangeData("prepared claim without justification".into()),
            ),
            (false, Some(_)) => Ok(()),
        }
    }
}

/// Unsigned consensus message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub msg_type: MessageType,
    pub height: Height,
    pub round: Round,
    pub identifier: Identifier,
    /// Canonically encoded type-specific payload
    pub data: Vec<u8>,
}

impl Message {
    pub fn proposal(
        height: Height,
        round: Round,
        identifier: Identifier,
        payload: &ProposalData,
    ) -> MessageResult<Self> {
        Self::with_payload(MessageType::Proposal, height, round, identifier, payload)
    }

    pub fn prepare(height: Height, round: Round, identifier: Identifier, value: &[u8]) -> MessageResult<Self> {
        let payload = PrepareData {
            data: value.to_vec(),
        };
        Self::with_payload(MessageType::Prepare, height, round, identifier, &payload)
    }

    pub fn commit(height: Height, round: Round, identifier: Identifier, value: &[u8]) -> MessageResult<Self> {
        let payload = CommitData {
            data: value.to_vec(),
        };
        Self::with_payload(MessageType::Commit, height, round, identifier, &payload)
    }

    pub fn round_change(
        height: Height,
        round: Round,
        identifier: Identifier,
        payload: &RoundChangeData,
    ) -> MessageResult<Self> {
        Self::with_payload(MessageType::RoundChange, height, round, identifier, payload)
    }

    fn with_payload<T: Serialize>(
        msg_type: MessageType,
        height: Height,
        round: Round,
        identifier: Identifier,
        payload: &T,
    ) -> MessageResult<Self> {
        Ok(Self {
            msg_type,
            height,
            round,
            identifier,
            data: codec::encode(payload)?,
        })
    }

    fn expect_type(&self, expected: MessageType) -> MessageResult<()> {
        if self.msg_type != expected {
            return Err(MessageError::WrongMessageType {
                expected,
                actual: self.msg_type,
            });
        }
        Ok(())
    }

    pub fn proposal_data(&self) -> MessageResult<ProposalData> {
        self.expect_type(MessageType::Proposal)?;
        codec::decode(&self.data)
    }

    pub fn prepare_data(&self) -> MessageResult<PrepareData> {
        self.expect_type(MessageType::Prepare)?;
        codec::decode(&self.data)
    }

    pub fn commit_data(&self) -> MessageResult<CommitData> {
        self.expect_type(MessageType::Commit)?;
        codec::decode(&self.data)
    }

    pub fn round_change_data(&self) -> MessageResult<RoundChangeData> {
        self.expect_type(MessageType::RoundChange)?;
        codec::decode(&self.data)
    }

    /// The value a Proposal, Prepare or Commit is about. Round changes carry
    /// no single value and return `None`.
    pub fn value(&self) -> MessageResult<Option<Vec<u8>>> {
        Ok(match self.msg_type {
            MessageType::Proposal => Some(self.proposal_data()?.data),
            MessageType::Prepare => Some(self.prepare_data()?.data),
            MessageType::Commit => Some(self.commit_data()?.data),
            MessageType::RoundChange => None,
        })
    }

    pub fn encode(&self) -> MessageResult<Vec<u8>> {
        codec::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> MessageResult<Self> {
        codec::decode(bytes)
    }

    /// Digest used for signing and verification.
    pub fn root(&self) -> MessageResult<Root> {
        codec::root(self)
    }
}
