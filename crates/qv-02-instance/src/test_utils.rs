//! In-memory committee of instances for protocol tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use qv_01_messages::SignedMessage;
use shared_crypto::test_utils::TestCommittee;
use shared_types::{Height, OperatorId, Round};

use crate::domain::InstanceOutput;
use crate::error::InstanceError;
use crate::ports::AcceptAll;
use crate::service::Instance;

/// Instance for `operator_id` backed by the committee's share keys.
pub fn instance_for(committee: &TestCommittee, operator_id: OperatorId) -> Instance {
    Instance::new(
        committee.share_for(operator_id),
        qv_01_messages::test_utils::identifier(committee),
        committee.key_manager_for(operator_id),
        Arc::new(AcceptAll),
    )
}

/// Every broadcast is delivered synchronously to all other online members.
pub struct LocalCluster {
    pub committee: TestCommittee,
    pub instances: BTreeMap<OperatorId, Instance>,
    pub offline: BTreeSet<OperatorId>,
    pub rejections: Vec<(OperatorId, InstanceError)>,
    pub delivered: usize,
}

impl LocalCluster {
    pub fn new(n: u64) -> Self {
        let committee = TestCommittee::new(n);
        let instances = (1..=n)
            .map(|id| (id, instance_for(&committee, id)))
            .collect();
        Self {
            committee,
            instances,
            offline: BTreeSet::new(),
            rejections: Vec::new(),
            delivered: 0,
        }
    }

    pub fn set_offline(&mut self, id: OperatorId) {
        self.offline.insert(id);
    }

    /// Start every online member, then deliver the resulting broadcasts.
    pub fn start_all(&mut self, value: &[u8], height: Height) {
        let mut started = Vec::new();
        for id in self.online() {
            if let Some(instance) = self.instances.get_mut(&id) {
                started.push((id, instance.start(value.to_vec(), height).expect("start")));
            }
        }
        for (id, outputs) in started {
            self.route(id, outputs);
        }
    }

    pub fn timeout_all(&mut self, round: Round) {
        for id in self.online() {
            let outputs = self
                .instances
                .get_mut(&id)
                .map(|i| i.on_round_timeout(round))
                .transpose()
                .expect("timeout")
                .unwrap_or_default();
            self.route(id, outputs);
        }
    }

    /// Deliver `from`'s broadcasts, and everything they trigger, until quiet.
    pub fn route(&mut self, from: OperatorId, outputs: Vec<InstanceOutput>) {
        let mut queue: VecDeque<(OperatorId, SignedMessage)> = broadcasts(from, outputs).collect();
        while let Some((sender, msg)) = queue.pop_front() {
            for id in self.online() {
                if id == sender {
                    continue;
                }
                let Some(instance) = self.instances.get_mut(&id) else {
                    continue;
                };
                self.delivered += 1;
                match instance.process_msg(&msg) {
                    Ok(outputs) => queue.extend(broadcasts(id, outputs)),
                    Err(e) => self.rejections.push((id, e)),
                }
            }
        }
    }

    pub fn instance(&self, id: OperatorId) -> &Instance {
        &self.instances[&id]
    }

    pub fn decided_values(&self) -> BTreeMap<OperatorId, Option<Vec<u8>>> {
        self.instances
            .iter()
            .filter(|(id, _)| !self.offline.contains(id))
            .map(|(id, i)| (*id, i.is_decided().1))
            .collect()
    }

    fn online(&self) -> Vec<OperatorId> {
        self.instances
            .keys()
            .copied()
            .filter(|id| !self.offline.contains(id))
            .collect()
    }
}

fn broadcasts(
    from: OperatorId,
    outputs: Vec<InstanceOutput>,
) -> impl Iterator<Item = (OperatorId, SignedMessage)> {
    outputs.into_iter().filter_map(move |out| match out {
        InstanceOutput::Broadcast(msg) => Some((from, msg)),
        _ => None,
    })
}
