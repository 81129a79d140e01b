//! Decided-history sync protocol messages.

use serde::{Deserialize, Serialize};
use shared_types::Height;

use super::signed::SignedMessage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncRequest {
    /// Highest decided message the peer knows
    LastDecided,
    /// Decided messages for heights `from..=to`
    DecidedRange { from: Height, to: Height },
    /// The peer's last round change, to learn the height and round it is
    /// working on
    CurrentInstance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Decided messages, or at most one round change for `CurrentInstance`
    pub messages: Vec<SignedMessage>,
    /// Set when the responder could not serve the request
    pub error: Option<String>,
}

impl SyncResponse {
    pub fn ok(messages: Vec<SignedMessage>) -> Self {
        Self {
            messages,
            error: None,
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            error: Some(reason.into()),
        }
    }
}
