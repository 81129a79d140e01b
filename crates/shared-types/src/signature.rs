//! # Signature Containers
//!
//! BLS12-381 (min-pk) sizes: public keys are 48 bytes, signatures 96 bytes.
//! Signatures travel on the wire as length-prefixed bytes so a wrong length
//! is rejected at decode time instead of being silently truncated.

use crate::errors::TypesError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Compressed BLS signature length.
pub const SIGNATURE_LEN: usize = 96;

/// Compressed BLS public key length.
pub const PUBLIC_KEY_LEN: usize = 48;

/// Compressed BLS public key.
pub type BlsPublicKey = [u8; PUBLIC_KEY_LEN];

/// Signature type tag mixed into every signing root.
pub type SignatureType = [u8; 4];

/// Signatures over QBFT consensus messages.
pub const QBFT_SIG_TYPE: SignatureType = [1, 0, 0, 0];

/// Signatures over post-consensus partial signature messages.
pub const POST_CONSENSUS_SIG_TYPE: SignatureType = [2, 0, 0, 0];

/// Signatures over pre-consensus (RANDAO) partial signature messages.
pub const PRE_CONSENSUS_SIG_TYPE: SignatureType = [3, 0, 0, 0];

/// Domain separation: identical data signed under different domains yields
/// different signatures.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainType(Vec<u8>);

impl DomainType {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Default test network domain.
    pub fn primus_testnet() -> Self {
        Self(b"primus_testnet".to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DomainType({})", String::from_utf8_lossy(&self.0))
    }
}

/// A 96-byte BLS signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    pub fn new(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from an arbitrary slice, rejecting any length but 96.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypesError> {
        let array: [u8; SIGNATURE_LEN] = bytes
            .try_into()
            .map_err(|_| TypesError::InvalidSignatureLength(bytes.len()))?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}

impl TryFrom<Vec<u8>> for Signature {
    type Error = TypesError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_slice(&value)
    }
}

impl From<Signature> for Vec<u8> {
    fn from(sig: Signature) -> Self {
        sig.0.to_vec()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", hex::encode(&self.0[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_rejects_wrong_length() {
        assert_eq!(
            Signature::from_slice(&[0u8; 95]),
            Err(TypesError::InvalidSignatureLength(95))
        );
        assert_eq!(
            Signature::from_slice(&[0u8; 97]),
            Err(TypesError::InvalidSignatureLength(97))
        );
        assert!(Signature::from_slice(&[0u8; 96]).is_ok());
    }

    #[test]
    fn test_signature_decode_rejects_short_bytes() {
        let short = bincode::serialize(&vec![1u8; 64]).unwrap();
        assert!(bincode::deserialize::<Signature>(&short).is_err());

        let json = serde_json::to_string(&vec![1u8; 10]).unwrap();
        assert!(serde_json::from_str::<Signature>(&json).is_err());
    }

    #[test]
    fn test_signature_wire_is_length_prefixed() {
        let sig = Signature::new([3u8; 96]);
        let bytes = bincode::serialize(&sig).unwrap();
        // u64 length prefix + payload
        assert_eq!(bytes.len(), 8 + 96);
        assert_eq!(bincode::deserialize::<Signature>(&bytes).unwrap(), sig);
    }
}
