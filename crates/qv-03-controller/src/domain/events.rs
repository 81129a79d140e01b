//! Events published by the controller

use qv_01_messages::SignedMessage;
use shared_types::{Height, Identifier};

/// A height of this identifier was decided and persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecidedEvent {
    pub identifier: Identifier,
    pub height: Height,
    pub value: Vec<u8>,
    pub aggregated_commit: SignedMessage,
}
