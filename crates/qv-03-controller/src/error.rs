//! Error types for the controller

use qv_01_messages::MessageError;
use qv_02_instance::InstanceError;
use shared_types::{ErrorKind, Height};
use thiserror::Error;

/// Key-value storage failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvStoreError {
    #[error("IO error: {message}")]
    IoError { message: String },

    #[error("Corrupted value under key {key}: {message}")]
    Corrupted { key: String, message: String },
}

/// Controller errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    /// The current instance has not decided yet
    #[error("Instance at height {height} still running")]
    InstanceRunning { height: Height },

    /// Envelope addressed to another validator/role
    #[error("Message for another identifier")]
    WrongIdentifier,

    /// Consensus message for a height with no running instance
    #[error("No running instance for height {height}")]
    NoInstance { height: Height },

    /// No room left for messages ahead of the next instance
    #[error("Pending buffer full at height {height}")]
    PendingFull { height: Height },

    /// Decided message whose proof does not hold
    #[error("Invalid decided message: {0}")]
    InvalidDecided(String),

    /// Two different values decided at one height
    #[error("Conflicting decided value at height {height}")]
    ConflictingDecided { height: Height },

    /// Frame with an unknown version tag or undecodable body
    #[error("Wire codec error: {0}")]
    Codec(String),

    /// Envelope type this component does not handle
    #[error("Unexpected envelope type: {0}")]
    UnexpectedMessage(String),

    #[error("Storage error: {0}")]
    Storage(#[from] KvStoreError),

    #[error("Network error: {0}")]
    Network(String),

    /// Sync request budget exhausted
    #[error("Sync rate limited")]
    RateLimited,

    /// Peer did not answer within the sync timeout
    #[error("Sync request timed out")]
    SyncTimeout,

    /// Peer answered a sync request with an error
    #[error("Sync request refused: {0}")]
    SyncRefused(String),

    #[error(transparent)]
    Instance(#[from] InstanceError),

    #[error(transparent)]
    Message(#[from] MessageError),
}

impl ControllerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControllerError::Storage(_) => ErrorKind::Storage,
            ControllerError::SyncTimeout | ControllerError::Network(_) => ErrorKind::Timeout,
            ControllerError::ConflictingDecided { .. } => ErrorKind::Internal,
            ControllerError::Instance(e) => e.kind(),
            ControllerError::Message(e) => e.kind(),
            _ => ErrorKind::Validation,
        }
    }
}

/// Result type for controller operations
pub type ControllerResult<T> = Result<T, ControllerError>;
