//! Error types for the duty runner

use qv_01_messages::MessageError;
use qv_03_controller::ControllerError;
use shared_crypto::CryptoError;
use shared_types::{ErrorKind, Height, OperatorId, RoleType};
use thiserror::Error;

use crate::domain::Slot;

/// Duty runner errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    /// Duty for a role this runner does not serve
    #[error("Runner for {expected} got a {actual} duty")]
    WrongRole { expected: RoleType, actual: RoleType },

    /// Previous duty has not decided yet
    #[error("Consensus for height {height} still running")]
    ConsensusRunning { height: Height },

    /// Previous proposer duty is still collecting its RANDAO reveal
    #[error("Pre-consensus collection for slot {slot} still running")]
    PreConsensusRunning { slot: Slot },

    /// Previous duty decided but is still collecting partial signatures
    #[error("Post-consensus collection for slot {slot} still running")]
    PostConsensusRunning { slot: Slot },

    #[error("No duty execution in progress")]
    NoRunningDuty,

    #[error("Post-consensus message for height {actual}, executing {expected}")]
    WrongHeight { expected: Height, actual: Height },

    #[error("Pre-consensus message for slot {actual}, collecting {expected}")]
    WrongSlot { expected: Slot, actual: Slot },

    /// Duty input rejected before consensus started
    #[error("Invalid duty input: {0}")]
    InvalidInput(String),

    /// Partial signature over another root than the decided one
    #[error("Operator {signer} signed an unexpected root")]
    RootMismatch { signer: OperatorId },

    /// Partial signature does not verify against the signer's share key
    #[error("Invalid partial signature from operator {signer}: {reason}")]
    InvalidPartial { signer: OperatorId, reason: String },

    /// Too many partial signatures arrived before the local decision
    #[error("Early partial signature buffer full")]
    EarlyBufferFull,

    /// Quorum of partials did not combine into a valid signature
    #[error("Signature reconstruction failed: {0}")]
    Reconstruction(String),

    #[error("Duty submission failed: {0}")]
    Submission(String),

    /// Proposer duty on a runner built without a block producer
    #[error("No block producer configured")]
    NoBlockProducer,

    #[error("Block production failed: {0}")]
    BlockProduction(String),

    #[error("Unexpected envelope type: {0}")]
    UnexpectedMessage(String),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl RunnerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunnerError::Reconstruction(_) => ErrorKind::Reconstruction,
            RunnerError::RootMismatch { .. } | RunnerError::InvalidPartial { .. } => {
                ErrorKind::ProtocolViolation
            }
            RunnerError::Submission(_) | RunnerError::NoBlockProducer | RunnerError::BlockProduction(_) => {
                ErrorKind::Internal
            }
            RunnerError::Controller(e) => e.kind(),
            RunnerError::Message(e) => e.kind(),
            RunnerError::Crypto(e) => e.kind(),
            _ => ErrorKind::Validation,
        }
    }
}

/// Result type for duty runner operations
pub type RunnerResult<T> = Result<T, RunnerError>;
