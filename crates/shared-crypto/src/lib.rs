//! # Shared Crypto
//!
//! BLS12-381 primitives behind the validator's signer capability.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `bls` | BLS12-381 min-pk | Share signatures, aggregate commit proofs |
//! | `hashing` | SHA-256 | Object roots, domain-separated signing roots |
//! | `threshold` | Shamir / Lagrange over Fr | Dealer split, full-signature reconstruction |
//! | `key_manager` | - | Injectable signer capability |
//!
//! ## Security Properties
//!
//! - Secret key bytes are zeroized on drop.
//! - Signatures are group-checked and public keys validated before use.
//! - Signing roots bind domain and signature type, preventing replay across
//!   networks and message families.

#![warn(clippy::all)]

pub mod bls;
pub mod errors;
pub mod hashing;
pub mod key_manager;
pub mod threshold;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-exports
pub use bls::{aggregate_signatures, fast_aggregate_verify, verify, BlsKeyPair, BlsSecretKey};
pub use errors::{CryptoError, CryptoResult};
pub use hashing::{sha256, signing_root};
pub use key_manager::{KeyManager, SsvKeyManager};
pub use threshold::{reconstruct_signature, split_secret};
