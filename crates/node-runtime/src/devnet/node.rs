//! One operator: controller, duty runner and the tasks that feed them.

use std::sync::Arc;

use qv_02_instance::RoundTimeout;
use qv_03_controller::{Controller, QbftStore};
use qv_04_duty_runner::{ConsensusDataCheck, DutyRunner, DutySubmitter};
use shared_types::{Identifier, OperatorId, RoleType};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::NodeConfig;
use crate::devnet::committee::DealtCommittee;
use crate::error::NodeResult;
use crate::network::{Inbound, LoopbackHub};

pub struct OperatorNode {
    operator_id: OperatorId,
    runner: DutyRunner,
    hub: Arc<LoopbackHub>,
    tasks: Vec<JoinHandle<()>>,
}

impl OperatorNode {
    /// Wire operator `operator_id` into `hub` and start its inbox, timer
    /// and decision tasks.
    pub fn spawn(
        operator_id: OperatorId,
        committee: &DealtCommittee,
        config: &NodeConfig,
        hub: &Arc<LoopbackHub>,
        store: Arc<dyn QbftStore>,
        submitter: Arc<dyn DutySubmitter>,
    ) -> NodeResult<Self> {
        let role = RoleType::Attester;
        let identifier = Identifier::new(committee.validator_public_key(), role);
        let share = committee.share_for(operator_id)?;
        let signer = committee.key_manager_for(operator_id)?;
        let value_check = Arc::new(ConsensusDataCheck { role });
        let (network, inbox) = hub.join(operator_id);

        let (controller, timeouts) = Controller::new(
            identifier,
            share,
            config.controller.clone(),
            signer.clone(),
            value_check.clone(),
            Arc::new(network),
            store,
        )?;
        let runner = DutyRunner::new(
            role,
            config.runner.clone(),
            controller.clone(),
            signer,
            value_check,
            submitter,
        );

        let tasks = vec![
            tokio::spawn(serve_inbox(operator_id, runner.clone(), inbox)),
            tokio::spawn(fire_timeouts(operator_id, controller.clone(), timeouts)),
            tokio::spawn(runner.clone().listen_decided(controller.subscribe_decided())),
        ];
        Ok(Self {
            operator_id,
            runner,
            hub: Arc::clone(hub),
            tasks,
        })
    }

    pub fn operator_id(&self) -> OperatorId {
        self.operator_id
    }

    pub fn runner(&self) -> &DutyRunner {
        &self.runner
    }

    pub fn controller(&self) -> &Controller {
        self.runner.controller()
    }

    /// Leave the hub and stop every task.
    pub fn shutdown(&mut self) {
        self.hub.leave(self.operator_id);
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for OperatorNode {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Frames are processed concurrently so a sync waiting on a peer never
/// blocks this operator from answering that peer's requests.
async fn serve_inbox(operator_id: OperatorId, runner: DutyRunner, mut inbox: mpsc::UnboundedReceiver<Inbound>) {
    while let Some(inbound) = inbox.recv().await {
        match inbound {
            Inbound::Frame(frame) => {
                let runner = runner.clone();
                tokio::spawn(async move {
                    if let Err(e) = runner.process_frame(&frame).await {
                        debug!(operator = operator_id, kind = e.kind().as_str(), error = %e, "Frame dropped");
                    }
                });
            }
            Inbound::Request { frame, reply } => {
                let response = runner.controller().handle_request_frame(&frame);
                if reply.send(response).is_err() {
                    debug!(operator = operator_id, "Requester went away");
                }
            }
        }
    }
}

async fn fire_timeouts(operator_id: OperatorId, controller: Controller, mut timeouts: mpsc::UnboundedReceiver<RoundTimeout>) {
    while let Some(expiry) = timeouts.recv().await {
        let (height, round) = (expiry.height, expiry.round);
        if let Err(e) = controller.on_timeout(expiry).await {
            warn!(operator = operator_id, height, round, error = %e, "Round timeout not applied");
        }
    }
}
