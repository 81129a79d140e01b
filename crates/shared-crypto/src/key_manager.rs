//! # Signer Capability
//!
//! The consensus core never touches secret keys directly. It asks a
//! [`KeyManager`] to sign roots with a share key, to reconstruct full
//! signatures from partials, and to verify.
//!
//! [`SsvKeyManager`] is an explicitly constructed, injectable implementation
//! holding share secrets in memory; one is owned by each node's composition
//! root.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use shared_types::{BlsPublicKey, DomainType, OperatorId, Root, Signature, SignatureType};
use tracing::debug;

use crate::bls::{self, BlsKeyPair, BlsSecretKey};
use crate::errors::{CryptoError, CryptoResult};
use crate::hashing::signing_root;
use crate::threshold;

/// Signing, reconstruction and verification over domain-separated roots.
pub trait KeyManager: Send + Sync {
    /// Sign `root` with the share key whose public key is `public_key`.
    fn sign_root(
        &self,
        root: &Root,
        sig_type: SignatureType,
        domain: &DomainType,
        public_key: &BlsPublicKey,
    ) -> CryptoResult<Signature>;

    /// Combine partial signatures (keyed by signer) into a full signature.
    fn reconstruct(&self, partials: &BTreeMap<OperatorId, Signature>) -> CryptoResult<Signature>;

    /// Verify `signature` over `root` against `public_key`.
    fn verify(
        &self,
        root: &Root,
        sig_type: SignatureType,
        domain: &DomainType,
        signature: &Signature,
        public_key: &BlsPublicKey,
    ) -> CryptoResult<()>;
}

/// In-memory share key store.
#[derive(Default)]
pub struct SsvKeyManager {
    keys: RwLock<HashMap<BlsPublicKey, BlsSecretKey>>,
}

impl SsvKeyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a share secret, returning its public key.
    pub fn add_share_key(&self, secret: BlsSecretKey) -> CryptoResult<BlsPublicKey> {
        let public_key = BlsKeyPair::from_secret(&secret)?.public_key();
        self.keys.write().insert(public_key, secret);
        debug!(public_key = %hex_prefix(&public_key), "Share key added");
        Ok(public_key)
    }

    pub fn remove_share_key(&self, public_key: &BlsPublicKey) -> bool {
        self.keys.write().remove(public_key).is_some()
    }

    pub fn has_share(&self, public_key: &BlsPublicKey) -> bool {
        self.keys.read().contains_key(public_key)
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    hex::encode(&bytes[..4])
}

impl KeyManager for SsvKeyManager {
    fn sign_root(
        &self,
        root: &Root,
        sig_type: SignatureType,
        domain: &DomainType,
        public_key: &BlsPublicKey,
    ) -> CryptoResult<Signature> {
        let keys = self.keys.read();
        let secret = keys
            .get(public_key)
            .ok_or_else(|| CryptoError::UnknownShare(hex_prefix(public_key)))?;
        let pair = BlsKeyPair::from_secret(secret)?;
        Ok(pair.sign(&signing_root(root, domain, sig_type)))
    }

    fn reconstruct(&self, partials: &BTreeMap<OperatorId, Signature>) -> CryptoResult<Signature> {
        threshold::reconstruct_signature(partials)
    }

    fn verify(
        &self,
        root: &Root,
        sig_type: SignatureType,
        domain: &DomainType,
        signature: &Signature,
        public_key: &BlsPublicKey,
    ) -> CryptoResult<()> {
        bls::verify(public_key, &signing_root(root, domain, sig_type), signature)
    }
}
