//! Scenario builders shared by the integration tests.

use std::sync::Arc;
use std::time::Duration;

use node_runtime::{Devnet, Inbound, LoopbackNetwork, NodeConfig, NodeResult};
use qv_01_messages::{Message, SignedMessage, SignedPostConsensusMessage, SsvMessage};
use qv_03_controller::{Network, WireCodec};
use qv_04_duty_runner::{ConsensusData, Duty, Slot};
use shared_crypto::SsvKeyManager;
use shared_types::{Height, Identifier, OperatorId, RoleType, Root, Share};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Transport ids of impersonators start here so they never collide with
/// committee members in the hub.
const IMPERSONATOR_TRANSPORT_BASE: OperatorId = 1000;

/// Log to the test writer when `RUST_LOG` is set.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn attester_duty(slot: Slot) -> Duty {
    Duty {
        role: RoleType::Attester,
        slot,
        validator_index: 11,
        committee_index: 2,
    }
}

pub fn attestation_data(slot: Slot) -> Vec<u8> {
    format!("attestation data for slot {slot}").into_bytes()
}

/// Encoded consensus input the runners start with for `slot`.
pub fn consensus_input(slot: Slot) -> Vec<u8> {
    ConsensusData {
        duty: attester_duty(slot),
        data: attestation_data(slot),
    }
    .encode()
    .expect("encodable")
}

pub fn devnet() -> Devnet {
    devnet_with(NodeConfig::default())
}

pub fn devnet_with(config: NodeConfig) -> Devnet {
    init_logging();
    Devnet::launch(config).expect("devnet launches")
}

/// Let inbox and timer tasks drain under paused time.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Speaks with an operator's key through its own hub connection.
pub struct Impersonator {
    pub operator_id: OperatorId,
    network: LoopbackNetwork,
    _inbox: mpsc::UnboundedReceiver<Inbound>,
    signer: Arc<SsvKeyManager>,
    share: Share,
    identifier: Identifier,
    codec: WireCodec,
}

impl Impersonator {
    pub fn new(devnet: &Devnet, operator_id: OperatorId) -> NodeResult<Self> {
        let committee = devnet.committee();
        let (network, inbox) = devnet.hub().join(IMPERSONATOR_TRANSPORT_BASE + operator_id);
        let config = NodeConfig::default();
        Ok(Self {
            operator_id,
            network,
            _inbox: inbox,
            signer: committee.key_manager_for(operator_id)?,
            share: committee.share_for(operator_id)?,
            identifier: Identifier::new(committee.validator_public_key(), RoleType::Attester),
            codec: WireCodec::new(config.controller.fork_schedule().version_at(0)),
        })
    }

    pub fn identifier(&self) -> Identifier {
        self.identifier.clone()
    }

    pub fn sign(&self, message: Message) -> SignedMessage {
        let own_key = self.share.operator(self.operator_id).expect("member").public_key;
        SignedMessage::sign(message, self.operator_id, self.signer.as_ref(), &self.share.domain, &own_key)
            .expect("share registered")
    }

    pub fn partial(&self, height: Height, root: Root) -> SignedPostConsensusMessage {
        let own_key = self.share.operator(self.operator_id).expect("member").public_key;
        SignedPostConsensusMessage::sign(height, root, self.operator_id, self.signer.as_ref(), &self.share.domain, &own_key)
            .expect("share registered")
    }

    pub async fn broadcast(&self, msg: &SsvMessage) {
        let frame = self.codec.encode(msg).expect("encodable");
        self.network.broadcast(frame).await.expect("hub accepts frames");
    }

    pub async fn broadcast_consensus(&self, message: Message) {
        let envelope = SsvMessage::consensus(&self.sign(message)).expect("encodable");
        self.broadcast(&envelope).await;
    }

    pub async fn broadcast_partial(&self, height: Height, root: Root) {
        let envelope = SsvMessage::post_consensus(self.identifier(), &self.partial(height, root)).expect("encodable");
        self.broadcast(&envelope).await;
    }
}
