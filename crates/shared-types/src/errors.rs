//! # Error Types
//!
//! Errors raised while constructing shared types, plus the error taxonomy
//! every subsystem maps its own errors onto.

use thiserror::Error;

/// Errors raised by the shared types themselves.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    /// Signature is not exactly 96 bytes.
    #[error("Invalid signature length: expected 96, got {0}")]
    InvalidSignatureLength(usize),

    /// Identifier too short to carry a role tag.
    #[error("Malformed identifier: {len} bytes")]
    MalformedIdentifier { len: usize },

    /// Role tag not known to this client.
    #[error("Unknown role type: {0}")]
    UnknownRole(u32),

    /// Committee descriptor cannot reach any quorum.
    #[error("Invalid committee: {0}")]
    InvalidCommittee(String),
}

/// Classification of failures across the consensus core.
///
/// Only `Internal` denotes a local bug; every other kind is a normal outcome
/// of adversarial or slow peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad signature, wrong type/round/height, no quorum yet. Message dropped.
    Validation,
    /// Conflicting proposal, duplicate signer in an aggregate. May be scored.
    ProtocolViolation,
    /// Persistence failed; the decision is not final.
    Storage,
    /// Round or collection expiry.
    Timeout,
    /// Partial signatures did not combine into a valid signature.
    Reconstruction,
    /// Impossible state transition: a consensus-safety bug.
    Internal,
}

impl ErrorKind {
    /// Label used for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::ProtocolViolation => "protocol_violation",
            ErrorKind::Storage => "storage",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Reconstruction => "reconstruction",
            ErrorKind::Internal => "internal",
        }
    }
}
