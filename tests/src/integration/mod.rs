//! Cross-crate scenarios.

pub mod byzantine;
pub mod consensus_flows;
pub mod post_consensus;
