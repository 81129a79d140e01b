//! # Threshold Keys
//!
//! Shamir sharing of a validator secret key over the BLS12-381 scalar field
//! and Lagrange interpolation of partial signatures "in the exponent".
//!
//! Operator ids are the interpolation points, so id `0` is never valid: the
//! polynomial evaluated at zero is the validator secret itself.
//!
//! Reference: Boldyreva, "Threshold Signatures, Multisignatures and Blind
//! Signatures Based on the Gap-Diffie-Hellman-Group Signature Scheme".

use std::collections::BTreeMap;

use bls12_381::{G2Affine, G2Projective, Scalar};
use rand::RngCore;
use shared_types::{OperatorId, Signature};
use zeroize::Zeroize;

use crate::bls::{BlsKeyPair, BlsSecretKey};
use crate::errors::{CryptoError, CryptoResult};

// =============================================================================
// Scalar field helpers
// =============================================================================

/// Secret keys are big-endian, field elements little-endian.
fn scalar_from_secret(secret: &BlsSecretKey) -> CryptoResult<Scalar> {
    let mut bytes = *secret.as_bytes();
    bytes.reverse();
    let scalar: Option<Scalar> = Option::from(Scalar::from_bytes(&bytes));
    bytes.zeroize();
    scalar.ok_or_else(|| CryptoError::InvalidInput("secret key outside the scalar field".into()))
}

fn scalar_to_secret(value: &Scalar) -> BlsSecretKey {
    let mut bytes = value.to_bytes();
    bytes.reverse();
    let secret = BlsSecretKey::from_bytes(&bytes);
    bytes.zeroize();
    secret
}

fn random_scalar<R: RngCore>(rng: &mut R) -> Scalar {
    let mut wide = [0u8; 64];
    rng.fill_bytes(&mut wide);
    let scalar = Scalar::from_bytes_wide(&wide);
    wide.zeroize();
    scalar
}

fn interpolation_point(id: OperatorId) -> CryptoResult<Scalar> {
    if id == 0 {
        return Err(CryptoError::InvalidShareIndex(id));
    }
    Ok(Scalar::from(id))
}

// =============================================================================
// Dealer
// =============================================================================

/// Split `master` into one share per operator id, any `threshold` of which
/// reconstruct signatures of the master key.
pub fn split_secret(
    master: &BlsSecretKey,
    ids: &[OperatorId],
    threshold: usize,
) -> CryptoResult<BTreeMap<OperatorId, BlsSecretKey>> {
    split_secret_with_rng(&mut rand::thread_rng(), master, ids, threshold)
}

/// [`split_secret`] with an explicit randomness source for the polynomial
/// coefficients.
pub fn split_secret_with_rng<R: RngCore>(
    rng: &mut R,
    master: &BlsSecretKey,
    ids: &[OperatorId],
    threshold: usize,
) -> CryptoResult<BTreeMap<OperatorId, BlsSecretKey>> {
    if threshold == 0 || threshold > ids.len() {
        return Err(CryptoError::InvalidInput(format!(
            "threshold {} for {} shares",
            threshold,
            ids.len()
        )));
    }

    let mut coefficients = Vec::with_capacity(threshold);
    coefficients.push(scalar_from_secret(master)?);
    coefficients.extend((1..threshold).map(|_| random_scalar(rng)));

    let mut shares = BTreeMap::new();
    for &id in ids {
        let x = interpolation_point(id)?;
        // Horner evaluation of f(x)
        let acc = coefficients
            .iter()
            .rev()
            .fold(Scalar::zero(), |acc, coefficient| acc * x + coefficient);
        // Reject a zero share up front rather than at signing time.
        let secret = scalar_to_secret(&acc);
        BlsKeyPair::from_secret(&secret)?;
        if shares.insert(id, secret).is_some() {
            return Err(CryptoError::InvalidInput(format!("duplicate share id {}", id)));
        }
    }
    Ok(shares)
}

// =============================================================================
// Reconstruction
// =============================================================================

/// Lagrange coefficient at zero for point `i` among `points`.
fn lagrange_at_zero(i: OperatorId, points: &[OperatorId]) -> CryptoResult<Scalar> {
    let xi = interpolation_point(i)?;
    let mut numerator = Scalar::one();
    let mut denominator = Scalar::one();
    for &j in points.iter().filter(|&&j| j != i) {
        let xj = interpolation_point(j)?;
        numerator *= xj;
        denominator *= xj - xi;
    }
    let inverse: Option<Scalar> = Option::from(denominator.invert());
    inverse
        .map(|inv| numerator * inv)
        .ok_or_else(|| CryptoError::InvalidInput(format!("no Lagrange coefficient for share {}", i)))
}

fn decompress_g2(sig: &Signature) -> CryptoResult<G2Projective> {
    let affine: Option<G2Affine> = Option::from(G2Affine::from_compressed(sig.as_bytes()));
    affine.map(G2Projective::from).ok_or(CryptoError::InvalidSignature)
}

/// Interpolate the full signature from partial signatures keyed by signer.
///
/// Any subset of at least `threshold` correct partials yields the same
/// signature; the caller is responsible for verifying the result.
pub fn reconstruct_signature(partials: &BTreeMap<OperatorId, Signature>) -> CryptoResult<Signature> {
    if partials.is_empty() {
        return Err(CryptoError::InsufficientShares { have: 0, need: 1 });
    }
    let points: Vec<OperatorId> = partials.keys().copied().collect();

    let mut sum = G2Projective::identity();
    for (&id, sig) in partials {
        let point = decompress_g2(sig)?;
        sum += point * lagrange_at_zero(id, &points)?;
    }
    if bool::from(sum.is_identity()) {
        return Err(CryptoError::AggregationFailed);
    }
    Ok(Signature::new(G2Affine::from(sum).to_compressed()))
}
