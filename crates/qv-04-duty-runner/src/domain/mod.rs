//! Domain layer for the duty runner

pub mod config;
pub mod duty;
pub mod execution;
pub mod pre_consensus;

pub use config::RunnerConfig;
pub use duty::{ConsensusData, Duty, SignedDuty, Slot, SLOTS_PER_EPOCH};
pub use execution::{DutyExecutionState, DutyStart, RunnerPhase};
pub use pre_consensus::PreConsensusState;
