//! # Identifier
//!
//! Scopes every message to one duty pipeline of one validator.
//!
//! Layout: `validator public key ++ role (u32, little endian)`.

use crate::errors::TypesError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the trailing role tag.
const ROLE_LEN: usize = 4;

/// Beacon duty role a pipeline is dedicated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoleType {
    Attester,
    Aggregator,
    Proposer,
    SyncCommittee,
}

impl RoleType {
    pub fn as_u32(self) -> u32 {
        match self {
            RoleType::Attester => 0,
            RoleType::Aggregator => 1,
            RoleType::Proposer => 2,
            RoleType::SyncCommittee => 3,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(RoleType::Attester),
            1 => Some(RoleType::Aggregator),
            2 => Some(RoleType::Proposer),
            3 => Some(RoleType::SyncCommittee),
            _ => None,
        }
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoleType::Attester => "ATTESTER",
            RoleType::Aggregator => "AGGREGATOR",
            RoleType::Proposer => "PROPOSER",
            RoleType::SyncCommittee => "SYNC_COMMITTEE",
        };
        f.write_str(name)
    }
}

/// Opaque message identifier. Immutable once constructed.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier(Vec<u8>);

impl Identifier {
    /// Build the identifier for a validator's role pipeline.
    pub fn new(validator_pk: &[u8], role: RoleType) -> Self {
        let mut bytes = Vec::with_capacity(validator_pk.len() + ROLE_LEN);
        bytes.extend_from_slice(validator_pk);
        bytes.extend_from_slice(&role.as_u32().to_le_bytes());
        Self(bytes)
    }

    /// Wrap raw bytes received from the wire.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Role encoded in the trailing four bytes.
    pub fn role(&self) -> Result<RoleType, TypesError> {
        if self.0.len() < ROLE_LEN {
            return Err(TypesError::MalformedIdentifier { len: self.0.len() });
        }
        let mut tag = [0u8; ROLE_LEN];
        tag.copy_from_slice(&self.0[self.0.len() - ROLE_LEN..]);
        let raw = u32::from_le_bytes(tag);
        RoleType::from_u32(raw).ok_or(TypesError::UnknownRole(raw))
    }

    /// Validator public key prefix.
    pub fn validator_pk(&self) -> &[u8] {
        let end = self.0.len().saturating_sub(ROLE_LEN);
        &self.0[..end]
    }

    /// True if this identifier was derived from `validator_pk`.
    pub fn belongs_to(&self, validator_pk: &[u8]) -> bool {
        self.validator_pk() == validator_pk
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self)
    }
}

impl AsRef<[u8]> for Identifier {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_layout() {
        let pk = [7u8; 48];
        let id = Identifier::new(&pk, RoleType::Proposer);

        assert_eq!(id.as_bytes().len(), 52);
        assert_eq!(&id.as_bytes()[48..], &[2, 0, 0, 0]);
        assert_eq!(id.role().unwrap(), RoleType::Proposer);
        assert!(id.belongs_to(&pk));
        assert!(!id.belongs_to(&[8u8; 48]));
    }

    #[test]
    fn test_identifier_unknown_role() {
        let id = Identifier::from_bytes(vec![1, 2, 3, 9, 0, 0, 0]);
        assert_eq!(id.role(), Err(TypesError::UnknownRole(9)));
    }

    #[test]
    fn test_identifier_too_short() {
        let id = Identifier::from_bytes(vec![1, 2]);
        assert!(matches!(
            id.role(),
            Err(TypesError::MalformedIdentifier { len: 2 })
        ));
        assert!(id.validator_pk().is_empty());
    }
}
