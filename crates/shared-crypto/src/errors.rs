//! Crypto error types.

use shared_types::{ErrorKind, OperatorId};
use thiserror::Error;

/// Result alias for signer-capability operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Cryptographic operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Bytes do not decode to a G1 point
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Bytes are not a valid scalar in the BLS field
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Bytes do not decode to a G2 point
    #[error("Invalid signature encoding")]
    InvalidSignature,

    /// Signature does not verify against the expected key and root
    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    /// No secret registered for the requested share public key
    #[error("No share key for public key {0}")]
    UnknownShare(String),

    /// BLS aggregation failed
    #[error("BLS aggregation failed")]
    AggregationFailed,

    /// Not enough partial signatures to interpolate
    #[error("Insufficient partial signatures: have {have}, need {need}")]
    InsufficientShares { have: usize, need: usize },

    /// Operator id cannot be used as an interpolation point
    #[error("Invalid share index {0}")]
    InvalidShareIndex(OperatorId),

    /// Invalid input for cryptographic operation
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CryptoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CryptoError::SignatureVerificationFailed
            | CryptoError::InvalidSignature
            | CryptoError::InvalidPublicKey => ErrorKind::Validation,
            CryptoError::AggregationFailed
            | CryptoError::InsufficientShares { .. }
            | CryptoError::InvalidShareIndex(_) => ErrorKind::Reconstruction,
            CryptoError::InvalidPrivateKey
            | CryptoError::UnknownShare(_)
            | CryptoError::InvalidInput(_) => ErrorKind::Internal,
        }
    }
}
