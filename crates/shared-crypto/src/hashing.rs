//! # Hashing and Signing Roots
//!
//! Every signature in the system is taken over a signing root rather than the
//! raw object digest, so that the same object cannot be replayed across
//! networks (domain) or across message families (signature type):
//!
//! ```text
//! signing_root = SHA-256(object_root || domain || signature_type)
//! ```

use sha2::{Digest, Sha256};
use shared_types::{DomainType, Root, SignatureType};

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> Root {
    Sha256::digest(data).into()
}

/// Domain- and type-separated root that is actually signed.
pub fn signing_root(object_root: &Root, domain: &DomainType, sig_type: SignatureType) -> Root {
    let mut hasher = Sha256::new();
    hasher.update(object_root);
    hasher.update(domain.as_bytes());
    hasher.update(sig_type);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{POST_CONSENSUS_SIG_TYPE, QBFT_SIG_TYPE};

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_signing_root_separates_domain_and_type() {
        let root = sha256(b"value");
        let testnet = DomainType::primus_testnet();
        let other = DomainType::new(b"mainnet".to_vec());

        let a = signing_root(&root, &testnet, QBFT_SIG_TYPE);
        assert_eq!(a, signing_root(&root, &testnet, QBFT_SIG_TYPE));
        assert_ne!(a, signing_root(&root, &other, QBFT_SIG_TYPE));
        assert_ne!(a, signing_root(&root, &testnet, POST_CONSENSUS_SIG_TYPE));
    }
}
