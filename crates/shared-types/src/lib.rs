//! # Shared Types Crate
//!
//! Types shared by every subsystem of the QBFT validator client.
//!
//! ## Contents
//!
//! - **Identity**: `Identifier` (validator public key ++ role), `RoleType`
//! - **Committee**: `Operator`, `Share` and the strong/partial quorum math
//! - **Consensus primitives**: `Height`, `Round` and their sentinel values
//! - **Signatures**: the 96-byte BLS `Signature`, `DomainType`, `SignatureType`
//! - **Rate limiting**: token bucket used to bound sync requests
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: cross-subsystem types are defined here only.
//! - **Immutable committee**: a `Share` never changes for the lifetime of an
//!   instance; every quorum decision is derived from it.

pub mod consensus;
pub mod errors;
pub mod identifier;
pub mod rate_limiter;
pub mod share;
pub mod signature;

pub use consensus::*;
pub use errors::*;
pub use identifier::{Identifier, RoleType};
pub use rate_limiter::RateLimiter;
pub use share::{Operator, Share};
pub use signature::*;
