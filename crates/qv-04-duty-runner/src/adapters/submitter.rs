//! Channel-backed duty submitter

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::SignedDuty;
use crate::error::{RunnerError, RunnerResult};
use crate::ports::DutySubmitter;

/// Forwards signed duties to whoever talks to the beacon node.
pub struct ChannelSubmitter {
    tx: mpsc::UnboundedSender<SignedDuty>,
}

impl ChannelSubmitter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SignedDuty>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl DutySubmitter for ChannelSubmitter {
    async fn submit(&self, duty: SignedDuty) -> RunnerResult<()> {
        self.tx
            .send(duty)
            .map_err(|_| RunnerError::Submission("beacon channel closed".into()))
    }
}
