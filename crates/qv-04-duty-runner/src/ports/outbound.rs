//! # Outbound Ports (Driven Ports)
//!
//! Besides the controller (network, storage, signer), the runner needs the
//! beacon node for two things: handing over a fully signed duty, and, for
//! proposers, building the block once the RANDAO reveal is known.
//!
//! Production: `ChannelSubmitter` drained by the node runtime
//! Testing: `RecordingSubmitter`, `RecordingBlockProducer`

use async_trait::async_trait;
use shared_types::Signature;

use crate::domain::{Duty, SignedDuty};
use crate::error::RunnerResult;

/// Publishes reconstructed duties.
#[async_trait]
pub trait DutySubmitter: Send + Sync {
    async fn submit(&self, duty: SignedDuty) -> RunnerResult<()>;
}

/// Builds the unsigned block a proposer duty reaches consensus on.
#[async_trait]
pub trait BlockProducer: Send + Sync {
    async fn produce_block(&self, duty: &Duty, randao_reveal: &Signature, graffiti: &[u8]) -> RunnerResult<Vec<u8>>;
}
