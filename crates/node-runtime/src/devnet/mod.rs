//! # Local Devnet
//!
//! A whole operator committee inside one process: keys from a trusted
//! dealer, a [`LoopbackHub`] for transport and one [`OperatorNode`] per
//! operator. [`Devnet::run_duty`] starts the same duty everywhere and waits
//! for each live operator to submit the reconstructed signature.
//!
//! ```text
//!              ┌──────────── LoopbackHub ────────────┐
//!              │                                     │
//!   op 1 ── runner ── controller      op 2 ── runner ── controller   ...
//!              │                                     │
//!        ChannelSubmitter                      ChannelSubmitter
//!              └──────────────→ submissions ←────────┘
//! ```

pub mod committee;
pub mod node;

use std::collections::BTreeMap;
use std::sync::Arc;

use qv_03_controller::{InMemoryKvStore, KvQbftStore, QbftStore};
use qv_04_duty_runner::{ChannelSubmitter, Duty, SignedDuty, Slot};
use shared_crypto::signing_root;
use shared_types::{DomainType, OperatorId, POST_CONSENSUS_SIG_TYPE};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::NodeConfig;
use crate::error::{NodeError, NodeResult};
use crate::network::LoopbackHub;

pub use committee::DealtCommittee;
pub use node::OperatorNode;

/// Outcome of one duty across the committee.
#[derive(Debug, Clone)]
pub struct DutyReport {
    pub slot: Slot,
    /// Submissions in operator order
    pub submissions: BTreeMap<OperatorId, SignedDuty>,
}

pub struct Devnet {
    config: NodeConfig,
    committee: DealtCommittee,
    hub: Arc<LoopbackHub>,
    nodes: BTreeMap<OperatorId, OperatorNode>,
    submissions: mpsc::UnboundedReceiver<(OperatorId, SignedDuty)>,
}

impl Devnet {
    /// Deal keys and start every operator.
    pub fn launch(config: NodeConfig) -> NodeResult<Self> {
        let committee = DealtCommittee::deal(config.committee_size, DomainType::primus_testnet())?;
        let hub = LoopbackHub::new();
        let (submitted_tx, submissions) = mpsc::unbounded_channel();

        let mut nodes = BTreeMap::new();
        for operator_id in committee.operator_ids() {
            let (submitter, mut duties) = ChannelSubmitter::new();
            let forward = submitted_tx.clone();
            tokio::spawn(async move {
                while let Some(duty) = duties.recv().await {
                    if forward.send((operator_id, duty)).is_err() {
                        break;
                    }
                }
            });

            let store = open_store(&config, operator_id)?;
            let node = OperatorNode::spawn(operator_id, &committee, &config, &hub, store, Arc::new(submitter))?;
            nodes.insert(operator_id, node);
        }
        info!(operators = nodes.len(), "Devnet launched");

        Ok(Self {
            config,
            committee,
            hub,
            nodes,
            submissions,
        })
    }

    pub fn committee(&self) -> &DealtCommittee {
        &self.committee
    }

    pub fn hub(&self) -> &Arc<LoopbackHub> {
        &self.hub
    }

    pub fn node(&self, operator_id: OperatorId) -> Option<&OperatorNode> {
        self.nodes.get(&operator_id)
    }

    pub fn live_operators(&self) -> Vec<OperatorId> {
        self.nodes.keys().copied().collect()
    }

    /// Take an operator offline for good.
    pub fn crash(&mut self, operator_id: OperatorId) -> NodeResult<()> {
        let mut node = self
            .nodes
            .remove(&operator_id)
            .ok_or(NodeError::UnknownOperator(operator_id))?;
        node.shutdown();
        warn!(operator = operator_id, "Operator crashed");
        Ok(())
    }

    /// Start `duty` on every live operator and wait until each of them
    /// submitted a signature that verifies against the validator key.
    pub async fn run_duty(&mut self, duty: Duty, data: Vec<u8>) -> NodeResult<DutyReport> {
        let slot = duty.slot;
        self.start_duty(duty, data).await?;
        self.collect_submissions(slot).await
    }

    /// Hand `duty` to every live operator's runner.
    pub async fn start_duty(&self, duty: Duty, data: Vec<u8>) -> NodeResult<()> {
        for (operator_id, node) in &self.nodes {
            node.runner()
                .start_duty(duty.clone(), data.clone())
                .await
                .map_err(|source| NodeError::DutyStart {
                    operator: *operator_id,
                    source,
                })?;
        }
        Ok(())
    }

    /// Wait for every live operator's submission for `slot`, up to the
    /// configured duty timeout.
    pub async fn collect_submissions(&mut self, slot: Slot) -> NodeResult<DutyReport> {
        let mut submissions = BTreeMap::new();
        let deadline = tokio::time::Instant::now() + self.config.duty_timeout;
        while submissions.len() < self.nodes.len() {
            let received = tokio::time::timeout_at(deadline, self.submissions.recv()).await;
            let Ok(Some((operator, signed))) = received else {
                return Err(NodeError::DutyTimeout {
                    slot,
                    submitted: submissions.into_keys().collect(),
                });
            };
            if signed.duty.slot != slot {
                continue;
            }
            self.check_submission(operator, &signed)?;
            submissions.insert(operator, signed);
        }

        info!(slot, operators = ?submissions.keys().collect::<Vec<_>>(), "Duty completed");
        Ok(DutyReport { slot, submissions })
    }

    /// Submissions that arrived since the last collection.
    pub fn drain_submissions(&mut self) -> Vec<(OperatorId, SignedDuty)> {
        let mut out = Vec::new();
        while let Ok(item) = self.submissions.try_recv() {
            out.push(item);
        }
        out
    }

    fn check_submission(&self, operator: OperatorId, signed: &SignedDuty) -> NodeResult<()> {
        let message = signing_root(&signed.signing_root, self.committee.domain(), POST_CONSENSUS_SIG_TYPE);
        shared_crypto::verify(self.committee.validator_public_key(), &message, &signed.signature).map_err(|_| {
            NodeError::BadSubmission {
                slot: signed.duty.slot,
                operator,
            }
        })
    }

    pub fn shutdown(&mut self) {
        for node in self.nodes.values_mut() {
            node.shutdown();
        }
        self.nodes.clear();
        info!("Devnet stopped");
    }
}

#[cfg(feature = "rocksdb")]
fn open_store(config: &NodeConfig, operator_id: OperatorId) -> NodeResult<Arc<dyn QbftStore>> {
    use crate::adapters::storage::{RocksDbConfig, RocksDbStore};

    match &config.data_dir {
        Some(dir) => {
            let path = dir.join(format!("operator-{operator_id}"));
            info!(operator = operator_id, path = %path.display(), "Opening RocksDB");
            let kv = RocksDbStore::open(RocksDbConfig::new(path))?;
            Ok(Arc::new(KvQbftStore::new(kv)))
        }
        None => Ok(Arc::new(KvQbftStore::new(InMemoryKvStore::new()))),
    }
}

#[cfg(not(feature = "rocksdb"))]
fn open_store(config: &NodeConfig, operator_id: OperatorId) -> NodeResult<Arc<dyn QbftStore>> {
    if config.data_dir.is_some() {
        warn!(operator = operator_id, "Data dir ignored without the rocksdb feature");
    }
    Ok(Arc::new(KvQbftStore::new(InMemoryKvStore::new())))
}
