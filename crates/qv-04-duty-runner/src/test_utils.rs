//! Runner test doubles.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use qv_01_messages::{SignedPostConsensusMessage, SignedPreConsensusMessage};
use qv_03_controller::test_utils::{RecordingNetwork, TestNode};
use qv_03_controller::{Controller, ControllerConfig};
use shared_crypto::test_utils::TestCommittee;
use shared_crypto::{CryptoError, CryptoResult, KeyManager};
use shared_types::{
    BlsPublicKey, DomainType, Height, OperatorId, RoleType, Root, Signature, SignatureType,
};

use crate::adapters::ConsensusDataCheck;
use crate::domain::{ConsensusData, Duty, RunnerConfig, SignedDuty, Slot};
use crate::error::RunnerResult;
use crate::ports::{BlockProducer, DutySubmitter};
use crate::service::DutyRunner;

#[derive(Default)]
pub struct RecordingSubmitter {
    submitted: Mutex<Vec<SignedDuty>>,
}

impl RecordingSubmitter {
    pub fn submitted(&self) -> Vec<SignedDuty> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl DutySubmitter for RecordingSubmitter {
    async fn submit(&self, duty: SignedDuty) -> RunnerResult<()> {
        self.submitted.lock().push(duty);
        Ok(())
    }
}

/// Builds `graffiti ++ reveal` as the block and records each call.
#[derive(Default)]
pub struct RecordingBlockProducer {
    calls: Mutex<Vec<(Slot, Signature)>>,
}

impl RecordingBlockProducer {
    /// Slot and reveal of every block requested.
    pub fn calls(&self) -> Vec<(Slot, Signature)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl BlockProducer for RecordingBlockProducer {
    async fn produce_block(&self, duty: &Duty, randao_reveal: &Signature, graffiti: &[u8]) -> RunnerResult<Vec<u8>> {
        self.calls.lock().push((duty.slot, *randao_reveal));
        let mut block = graffiti.to_vec();
        block.extend_from_slice(randao_reveal.as_bytes());
        Ok(block)
    }
}

/// Key manager whose next `failures` reconstructions fail.
pub struct FlakyReconstruct {
    inner: Arc<dyn KeyManager>,
    failures: AtomicU32,
}

impl FlakyReconstruct {
    pub fn new(inner: Arc<dyn KeyManager>, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
        }
    }
}

impl KeyManager for FlakyReconstruct {
    fn sign_root(
        &self,
        root: &Root,
        sig_type: SignatureType,
        domain: &DomainType,
        public_key: &BlsPublicKey,
    ) -> CryptoResult<Signature> {
        self.inner.sign_root(root, sig_type, domain, public_key)
    }

    fn reconstruct(&self, partials: &BTreeMap<OperatorId, Signature>) -> CryptoResult<Signature> {
        let fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(CryptoError::AggregationFailed);
        }
        self.inner.reconstruct(partials)
    }

    fn verify(
        &self,
        root: &Root,
        sig_type: SignatureType,
        domain: &DomainType,
        signature: &Signature,
        public_key: &BlsPublicKey,
    ) -> CryptoResult<()> {
        self.inner.verify(root, sig_type, domain, signature, public_key)
    }
}

/// An attester or proposer runner over a controller test node.
pub struct RunnerNode {
    pub runner: DutyRunner,
    pub node: TestNode,
    pub submitter: Arc<RecordingSubmitter>,
    pub producer: Arc<RecordingBlockProducer>,
}

impl RunnerNode {
    pub fn new(committee: &TestCommittee, operator_id: OperatorId, config: RunnerConfig) -> Self {
        Self::with_signer(committee, operator_id, config, committee.key_manager_for(operator_id))
    }

    pub fn with_signer(
        committee: &TestCommittee,
        operator_id: OperatorId,
        config: RunnerConfig,
        signer: Arc<dyn KeyManager>,
    ) -> Self {
        let node = TestNode::new(committee, operator_id, ControllerConfig::default());
        let submitter = Arc::new(RecordingSubmitter::default());
        let runner = DutyRunner::new(
            RoleType::Attester,
            config,
            node.controller.clone(),
            signer,
            Arc::new(ConsensusDataCheck {
                role: RoleType::Attester,
            }),
            submitter.clone(),
        );
        Self {
            runner,
            node,
            submitter,
            producer: Arc::new(RecordingBlockProducer::default()),
        }
    }

    /// A proposer runner building blocks with a [`RecordingBlockProducer`].
    pub fn proposer(committee: &TestCommittee, operator_id: OperatorId, config: RunnerConfig) -> Self {
        let node = TestNode::new(committee, operator_id, ControllerConfig::default());
        let submitter = Arc::new(RecordingSubmitter::default());
        let producer = Arc::new(RecordingBlockProducer::default());
        let runner = DutyRunner::proposer(
            config,
            node.controller.clone(),
            committee.key_manager_for(operator_id),
            Arc::new(ConsensusDataCheck {
                role: RoleType::Proposer,
            }),
            submitter.clone(),
            producer.clone(),
        );
        Self {
            runner,
            node,
            submitter,
            producer,
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.node.controller
    }

    pub fn network(&self) -> &Arc<RecordingNetwork> {
        &self.node.network
    }
}

pub fn attester_duty(slot: Slot) -> Duty {
    Duty {
        role: RoleType::Attester,
        slot,
        validator_index: 7,
        committee_index: 1,
    }
}

pub fn proposer_duty(slot: Slot) -> Duty {
    Duty {
        role: RoleType::Proposer,
        ..attester_duty(slot)
    }
}

pub fn consensus_data(slot: Slot, data: &[u8]) -> ConsensusData {
    ConsensusData {
        duty: attester_duty(slot),
        data: data.to_vec(),
    }
}

/// `signer`'s post-consensus partial over `root` at `height`.
pub fn partial(committee: &TestCommittee, signer: OperatorId, height: Height, root: Root) -> SignedPostConsensusMessage {
    SignedPostConsensusMessage::sign(
        height,
        root,
        signer,
        committee.key_manager_for(signer).as_ref(),
        &committee.domain,
        &committee.share_pair(signer).public_key(),
    )
    .expect("share registered")
}

/// `signer`'s RANDAO partial for the proposer duty at `slot`.
pub fn randao_partial(committee: &TestCommittee, signer: OperatorId, slot: Slot) -> SignedPreConsensusMessage {
    SignedPreConsensusMessage::sign(
        slot,
        proposer_duty(slot).randao_root(),
        signer,
        committee.key_manager_for(signer).as_ref(),
        &committee.domain,
        &committee.share_pair(signer).public_key(),
    )
    .expect("share registered")
}
