//! # qv-04-duty-runner
//!
//! Drives a validator duty from start to a fully signed result:
//!
//! ```text
//! Duty + payload ──→ ConsensusData ──→ Controller (QBFT) ──decided──┐
//!                                                                   ↓
//!          DutySubmitter ←── reconstruct ←── quorum of partials ←── sign root, broadcast
//! ```
//!
//! Proposer duties first collect RANDAO partial signatures; the reveal they
//! reconstruct goes to a [`BlockProducer`] and the block it returns is the
//! consensus payload.
//!
//! A runner serves one role of one validator and executes one duty at a
//! time. A new duty may replace the previous execution once it finished,
//! or once its current collection window (RANDAO, or partial signatures
//! after the decision) of `duty_execution_slot_timeout` slots has passed.

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapters::{ChannelSubmitter, ConsensusDataCheck};
pub use domain::{
    ConsensusData, Duty, DutyExecutionState, DutyStart, PreConsensusState, RunnerConfig, RunnerPhase, SignedDuty, Slot,
};
pub use error::{RunnerError, RunnerResult};
pub use ports::{BlockProducer, DutySubmitter};
pub use service::DutyRunner;
