//! # Outbound Ports (Driven Ports)
//!
//! Capabilities the controller requires from the host:
//!
//! - [`Network`]: broadcast frames to the committee and ask a peer for
//!   decided history
//! - [`QbftStore`]: decided messages and the last round change per
//!   identifier
//! - [`KeyValueStore`]: the raw byte store [`crate::adapters::KvQbftStore`]
//!   is built on
//!
//! Production: `RocksDbStore` (node-runtime/adapters/storage)
//! Testing: `InMemoryKvStore`, `RecordingNetwork`

use async_trait::async_trait;
use qv_01_messages::SignedMessage;
use shared_types::{Height, Identifier};

use crate::error::{ControllerResult, KvStoreError};

/// Transport to the other committee members.
#[async_trait]
pub trait Network: Send + Sync {
    /// Send a frame to every other committee member. Delivery is best
    /// effort; an error only means the frame could not be handed off.
    async fn broadcast(&self, frame: Vec<u8>) -> ControllerResult<()>;

    /// Send a request frame to one peer and wait for its reply frame.
    async fn request(&self, frame: Vec<u8>) -> ControllerResult<Vec<u8>>;
}

/// Persistence of decided history.
pub trait QbftStore: Send + Sync {
    /// Store a decided message under its identifier and height, moving the
    /// highest-decided pointer forward when needed.
    fn save_decided(&self, msg: &SignedMessage) -> ControllerResult<()>;

    /// Decided messages for `from..=to`, skipping missing heights.
    fn get_decided(&self, identifier: &Identifier, from: Height, to: Height) -> ControllerResult<Vec<SignedMessage>>;

    fn get_last_decided(&self, identifier: &Identifier) -> ControllerResult<Option<SignedMessage>>;

    fn save_last_change_round(&self, msg: &SignedMessage) -> ControllerResult<()>;

    fn get_last_change_round(&self, identifier: &Identifier) -> ControllerResult<Option<SignedMessage>>;
}

/// Abstract interface for key-value database operations.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvStoreError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvStoreError>;

    /// Either all operations are applied or none.
    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), KvStoreError>;
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    Put { key: Vec<u8>, value: Vec<u8> },
}

impl BatchOperation {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }
}
