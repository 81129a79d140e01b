//! Adapters (hexagonal architecture)

pub mod submitter;
pub mod value_check;

pub use submitter::ChannelSubmitter;
pub use value_check::ConsensusDataCheck;
