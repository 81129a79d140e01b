//! Error types for the message model

use shared_crypto::CryptoError;
use shared_types::{ErrorKind, OperatorId};
use thiserror::Error;

use crate::domain::MessageType;

/// Message model errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// Canonical encoding failed (local bug)
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// Bytes received from a peer do not decode
    #[error("Decoding failed: {0}")]
    Decoding(String),

    /// Payload accessor used on the wrong message type
    #[error("Wrong message type: expected {expected:?}, got {actual:?}")]
    WrongMessageType {
        expected: MessageType,
        actual: MessageType,
    },

    /// Signed message carries no signers
    #[error("Message has no signers")]
    NoSigners,

    /// Signer appears more than once
    #[error("Duplicate signer {0}")]
    DuplicateSigner(OperatorId),

    /// Message family requires a fixed signer count
    #[error("Expected {expected} signer(s), got {actual}")]
    UnexpectedSignerCount { expected: usize, actual: usize },

    /// Signer is not a committee member
    #[error("Unknown signer {0}")]
    UnknownSigner(OperatorId),

    /// Signature does not verify
    #[error("Invalid signature: {0}")]
    InvalidSignature(#[from] CryptoError),

    /// Aggregation of messages with different roots
    #[error("Cannot aggregate messages with different roots")]
    RootMismatch,

    /// Aggregation of messages sharing signers
    #[error("Signer sets overlap: {0:?}")]
    OverlappingSigners(Vec<OperatorId>),

    /// Round-change payload violates prepared-state consistency
    #[error("Invalid round change data: {0}")]
    InvalidRoundChangeData(String),

    /// Post-consensus message is malformed
    #[error("Invalid post-consensus message: {0}")]
    InvalidPostConsensus(String),

    /// Pre-consensus message is malformed
    #[error("Invalid pre-consensus message: {0}")]
    InvalidPreConsensus(String),
}

impl MessageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MessageError::Encoding(_) => ErrorKind::Internal,
            MessageError::DuplicateSigner(_) | MessageError::OverlappingSigners(_) => {
                ErrorKind::ProtocolViolation
            }
            _ => ErrorKind::Validation,
        }
    }
}

/// Result type for message operations
pub type MessageResult<T> = Result<T, MessageError>;
