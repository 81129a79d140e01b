//! BLS12-381 Signature Implementation
//!
//! Minimal-public-key-size variant (48-byte public keys in G1, 96-byte
//! signatures in G2), the scheme used by Ethereum validators and therefore
//! by distributed-validator share keys.
//!
//! Provides:
//! - Key generation and import
//! - Sign / verify over 32-byte signing roots
//! - Signature aggregation and fast aggregate verification (same message)

use blst::min_pk as bls;
use blst::BLST_ERROR;
use rand::RngCore;
use shared_types::{BlsPublicKey, Signature};
use zeroize::Zeroize;

use crate::errors::{CryptoError, CryptoResult};

/// Domain separation tag for BLS signatures (Ethereum 2.0 compatible)
const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// BLS secret key bytes (32 bytes, big endian). Wiped on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct BlsSecretKey([u8; 32]);

impl BlsSecretKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(*bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// BLS key pair for signing operations
pub struct BlsKeyPair {
    secret: bls::SecretKey,
    public: bls::PublicKey,
}

impl BlsKeyPair {
    /// Generate a new random key pair
    pub fn generate() -> CryptoResult<Self> {
        let mut ikm = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut ikm);
        let pair = Self::from_ikm(&ikm);
        ikm.zeroize();
        pair
    }

    /// Derive a key pair from input keying material (at least 32 bytes).
    pub fn from_ikm(ikm: &[u8]) -> CryptoResult<Self> {
        let secret = bls::SecretKey::key_gen(ikm, &[])
            .map_err(|e| CryptoError::InvalidInput(format!("key_gen: {:?}", e)))?;
        let public = secret.sk_to_pk();
        Ok(Self { secret, public })
    }

    /// Create from existing secret key bytes
    pub fn from_secret(secret: &BlsSecretKey) -> CryptoResult<Self> {
        let secret =
            bls::SecretKey::from_bytes(secret.as_bytes()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        let public = secret.sk_to_pk();
        Ok(Self { secret, public })
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature::new(self.secret.sign(message, DST, &[]).to_bytes())
    }

    /// Compressed public key
    pub fn public_key(&self) -> BlsPublicKey {
        self.public.to_bytes()
    }

    pub fn secret(&self) -> BlsSecretKey {
        BlsSecretKey(self.secret.to_bytes())
    }
}

fn parse_public_key(bytes: &BlsPublicKey) -> CryptoResult<bls::PublicKey> {
    bls::PublicKey::from_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey)
}

fn parse_signature(sig: &Signature) -> CryptoResult<bls::Signature> {
    bls::Signature::from_bytes(sig.as_bytes()).map_err(|_| CryptoError::InvalidSignature)
}

/// Verify a single signature.
pub fn verify(public_key: &BlsPublicKey, message: &[u8], signature: &Signature) -> CryptoResult<()> {
    let pk = parse_public_key(public_key)?;
    let sig = parse_signature(signature)?;
    match sig.verify(true, message, DST, &[], &pk, true) {
        BLST_ERROR::BLST_SUCCESS => Ok(()),
        _ => Err(CryptoError::SignatureVerificationFailed),
    }
}

/// Verify an aggregate signature of several keys over one message.
pub fn fast_aggregate_verify(
    public_keys: &[BlsPublicKey],
    message: &[u8],
    signature: &Signature,
) -> CryptoResult<()> {
    if public_keys.is_empty() {
        return Err(CryptoError::InvalidInput("empty key list".into()));
    }
    let pks = public_keys
        .iter()
        .map(parse_public_key)
        .collect::<CryptoResult<Vec<_>>>()?;
    for pk in &pks {
        pk.validate().map_err(|_| CryptoError::InvalidPublicKey)?;
    }
    let refs: Vec<&bls::PublicKey> = pks.iter().collect();
    let sig = parse_signature(signature)?;
    match sig.fast_aggregate_verify(true, message, DST, &refs) {
        BLST_ERROR::BLST_SUCCESS => Ok(()),
        _ => Err(CryptoError::SignatureVerificationFailed),
    }
}

/// Aggregate multiple signatures into one
///
/// The result verifies against the aggregate of the signers' public keys.
pub fn aggregate_signatures(signatures: &[Signature]) -> CryptoResult<Signature> {
    if signatures.is_empty() {
        return Err(CryptoError::InvalidInput("empty signature list".into()));
    }
    let sigs = signatures
        .iter()
        .map(parse_signature)
        .collect::<CryptoResult<Vec<_>>>()?;
    let refs: Vec<&bls::Signature> = sigs.iter().collect();
    bls::AggregateSignature::aggregate(&refs, true)
        .map(|agg| Signature::new(agg.to_signature().to_bytes()))
        .map_err(|_| CryptoError::AggregationFailed)
}
