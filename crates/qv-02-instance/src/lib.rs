//! # qv-02-instance
//!
//! One QBFT consensus instance: agreement on a single value at a single
//! height among the committee of a distributed validator.
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────── Instance (service) ────────────────┐
//! message ──→│ validate → container insert → quorum check → stage │──→ Vec<InstanceOutput>
//! timeout ──→│                                                    │     Broadcast / ScheduleTimeout
//!            └────────────────────────────────────────────────────┘     Decided / DecidedProofGrown
//! ```
//!
//! The instance never touches the network or a clock. Its owner (the
//! controller) performs the returned outputs in order, arms the
//! [`adapters::RoundTimer`] and feeds expiries back through
//! [`Instance::on_round_timeout`].
//!
//! ## Safety
//!
//! - A signer is counted at most once per (round, message type)
//! - At most one commit broadcast per round
//! - A proposal for round `r > 1` must be justified by a round-change
//!   quorum and carry the highest prepared value when one exists
//! - A decision is never revised; a conflicting force-decide is an
//!   internal error
//!
//! ## Usage
//!
//! ```rust,ignore
//! use qv_02_instance::{Instance, InstanceOutput};
//!
//! let mut instance = Instance::new(share, identifier, key_manager, value_check);
//! for output in instance.start(value, height)? {
//!     match output {
//!         InstanceOutput::Broadcast(msg) => network.broadcast(msg).await,
//!         InstanceOutput::ScheduleTimeout { height, round } => timer.schedule(height, round),
//!         _ => {}
//!     }
//! }
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapters::{RoundTimeout, RoundTimer};
pub use domain::{
    DecidedHandle, InstanceConfig, InstanceOutput, MsgContainer, RoundChangeJustification,
    RoundTimeoutPolicy, Stage, State,
};
pub use error::{InstanceError, InstanceResult};
pub use ports::{AcceptAll, ValueCheck};
pub use service::{aggregate_all, Instance};
