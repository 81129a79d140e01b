//! Error types for the QBFT instance

use qv_01_messages::{MessageError, MessageType};
use shared_crypto::CryptoError;
use shared_types::{ErrorKind, Height, OperatorId, Round};
use thiserror::Error;

use crate::domain::Stage;

/// Instance errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstanceError {
    /// Message arrived before `start`
    #[error("Instance not started")]
    NotStarted,

    /// Instance was stopped by its controller
    #[error("Instance stopped")]
    Stopped,

    /// Message for another height
    #[error("Wrong height: expected {expected}, got {actual}")]
    WrongHeight { expected: Height, actual: Height },

    /// Message for another identifier
    #[error("Wrong identifier")]
    WrongIdentifier,

    /// Message for a round this instance already left
    #[error("Stale round: current {current}, message {actual}")]
    StaleRound { current: Round, actual: Round },

    /// Message for a round this instance has not reached
    #[error("Future round: current {current}, message {actual}")]
    FutureRound { current: Round, actual: Round },

    /// Proposal signed by someone other than the round leader
    #[error("Wrong proposer for round {round}: expected {expected}, got {actual}")]
    WrongProposer {
        round: Round,
        expected: OperatorId,
        actual: OperatorId,
    },

    /// Proposal or round change whose justification does not hold
    #[error("Unjustified {msg_type:?}: {reason}")]
    Unjustified {
        msg_type: MessageType,
        reason: String,
    },

    /// Second, different proposal for a round that already has one
    #[error("Conflicting proposal for round {round}")]
    ConflictingProposal { round: Round },

    /// Prepare whose value differs from the accepted proposal
    #[error("Prepare value does not match accepted proposal")]
    PrepareValueMismatch,

    /// Proposed value rejected by the value check
    #[error("Invalid proposed value: {0}")]
    InvalidValue(String),

    /// Aggregated commit without a quorum of signers
    #[error("No quorum: have {have} signers, need {need}")]
    NoQuorum { have: usize, need: usize },

    /// Two different values decided at one height
    #[error("Conflicting decided value at height {height}")]
    ConflictingDecision { height: Height },

    /// State machine asked to take an impossible edge
    #[error("Invalid stage transition from {from:?} to {to:?}")]
    InvalidTransition { from: Stage, to: Stage },

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("Signer error: {0}")]
    Signer(#[from] CryptoError),
}

impl InstanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InstanceError::ConflictingProposal { .. } | InstanceError::WrongProposer { .. } => {
                ErrorKind::ProtocolViolation
            }
            InstanceError::ConflictingDecision { .. } | InstanceError::InvalidTransition { .. } => {
                ErrorKind::Internal
            }
            InstanceError::Message(e) => e.kind(),
            InstanceError::Signer(e) => match e {
                CryptoError::UnknownShare(_) | CryptoError::InvalidPrivateKey => ErrorKind::Internal,
                _ => ErrorKind::Validation,
            },
            _ => ErrorKind::Validation,
        }
    }

    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            InstanceError::NotStarted => "not_started",
            InstanceError::Stopped => "stopped",
            InstanceError::WrongHeight { .. } => "wrong_height",
            InstanceError::WrongIdentifier => "wrong_identifier",
            InstanceError::StaleRound { .. } => "stale_round",
            InstanceError::FutureRound { .. } => "future_round",
            InstanceError::WrongProposer { .. } => "wrong_proposer",
            InstanceError::Unjustified { .. } => "unjustified",
            InstanceError::ConflictingProposal { .. } => "conflicting_proposal",
            InstanceError::PrepareValueMismatch => "prepare_value_mismatch",
            InstanceError::InvalidValue(_) => "invalid_value",
            InstanceError::NoQuorum { .. } => "no_quorum",
            InstanceError::ConflictingDecision { .. } => "conflicting_decision",
            InstanceError::InvalidTransition { .. } => "invalid_transition",
            InstanceError::Message(_) => "malformed",
            InstanceError::Signer(_) => "signature",
        }
    }
}

/// Result type for instance operations
pub type InstanceResult<T> = Result<T, InstanceError>;
