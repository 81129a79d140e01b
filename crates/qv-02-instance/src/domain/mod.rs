//! Domain layer for the QBFT instance

pub mod config;
pub mod container;
pub mod justification;
pub mod state;

pub use config::{InstanceConfig, RoundTimeoutPolicy};
pub use container::{distinct_signers, MsgContainer};
pub use justification::{RoundChangeJustification, Scope};
pub use state::{DecidedHandle, Stage, State};

use qv_01_messages::SignedMessage;
use shared_types::{Height, Round};

/// Side effects requested by the instance, in the order they must happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceOutput {
    /// Send to the other committee members
    Broadcast(SignedMessage),
    /// (Re)arm the round timer, replacing any running one
    ScheduleTimeout { height: Height, round: Round },
    /// First decision of this instance
    Decided {
        value: Vec<u8>,
        aggregated_commit: SignedMessage,
    },
    /// A late commit added a signer to the decided proof
    DecidedProofGrown(SignedMessage),
}
