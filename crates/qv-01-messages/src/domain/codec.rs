//! Canonical encoding.
//!
//! Fixed-width little-endian bincode. This is the byte layout digests and
//! signing roots are computed over, independent of the wire codec a fork
//! uses for transport.

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_crypto::sha256;
use shared_types::Root;

use crate::error::{MessageError, MessageResult};

/// Upper bound on any decoded frame.
pub const MAX_MESSAGE_SIZE: u64 = 4 * 1024 * 1024;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(MAX_MESSAGE_SIZE)
}

pub fn encode<T: Serialize>(value: &T) -> MessageResult<Vec<u8>> {
    options()
        .serialize(value)
        .map_err(|e| MessageError::Encoding(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> MessageResult<T> {
    options()
        .deserialize(bytes)
        .map_err(|e| MessageError::Decoding(e.to_string()))
}

/// SHA-256 of the canonical encoding.
pub fn root<T: Serialize>(value: &T) -> MessageResult<Root> {
    Ok(sha256(&encode(value)?))
}
