//! # qv-01-messages
//!
//! QBFT message and signature model.
//!
//! ## Overview
//!
//! - **Messages**: Proposal, Prepare, Commit and RoundChange with typed
//!   payloads, canonically encoded
//! - **Signed messages**: BLS-signed wrappers with signer sets, verification
//!   against the committee and disjoint-signer aggregation
//! - **Post-consensus**: partial signature messages exchanged after a decision
//! - **Envelope**: `SsvMessage` routing by identifier and message family
//!
//! ## Digests
//!
//! ```text
//! root         = SHA-256(canonical_bincode(message))
//! signing_root = SHA-256(root || domain || signature_type)
//! ```
//!
//! Roots never depend on the wire codec; fork-specific transport encodings
//! live in the controller.

pub mod domain;
pub mod error;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use domain::*;
pub use error::{MessageError, MessageResult};
