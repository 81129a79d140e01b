//! # Loopback Network
//!
//! In-process transport for a committee running inside one process. Each
//! operator registers an inbox with the [`LoopbackHub`]; its
//! [`LoopbackNetwork`] pushes frames into the other inboxes.
//!
//! ```text
//! op 1 ──broadcast──→ hub ──→ inbox 2, inbox 3, inbox 4
//! op 1 ──request───→ hub ──→ inbox k (random peer) ──reply──→ op 1
//! ```
//!
//! The sender never receives its own broadcast; controllers process their
//! own messages locally.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use qv_03_controller::{ControllerError, ControllerResult, Network};
use rand::seq::SliceRandom;
use shared_types::OperatorId;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// What an operator's inbox carries.
#[derive(Debug)]
pub enum Inbound {
    Frame(Vec<u8>),
    Request {
        frame: Vec<u8>,
        reply: oneshot::Sender<ControllerResult<Vec<u8>>>,
    },
}

/// Routing table shared by every operator in the process.
#[derive(Default)]
pub struct LoopbackHub {
    inboxes: RwLock<BTreeMap<OperatorId, mpsc::UnboundedSender<Inbound>>>,
}

impl LoopbackHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `operator_id` and return its network handle and inbox.
    pub fn join(
        self: &Arc<Self>,
        operator_id: OperatorId,
    ) -> (LoopbackNetwork, mpsc::UnboundedReceiver<Inbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.write().insert(operator_id, tx);
        let network = LoopbackNetwork {
            operator_id,
            hub: Arc::clone(self),
        };
        (network, rx)
    }

    /// Drop `operator_id` from the routing table; frames to it are lost.
    pub fn leave(&self, operator_id: OperatorId) {
        self.inboxes.write().remove(&operator_id);
    }

    pub fn members(&self) -> Vec<OperatorId> {
        self.inboxes.read().keys().copied().collect()
    }

    fn peers_of(&self, operator_id: OperatorId) -> Vec<(OperatorId, mpsc::UnboundedSender<Inbound>)> {
        self.inboxes
            .read()
            .iter()
            .filter(|(id, _)| **id != operator_id)
            .map(|(id, tx)| (*id, tx.clone()))
            .collect()
    }
}

/// One operator's view of the hub.
#[derive(Clone)]
pub struct LoopbackNetwork {
    operator_id: OperatorId,
    hub: Arc<LoopbackHub>,
}

impl LoopbackNetwork {
    pub fn operator_id(&self) -> OperatorId {
        self.operator_id
    }
}

#[async_trait]
impl Network for LoopbackNetwork {
    async fn broadcast(&self, frame: Vec<u8>) -> ControllerResult<()> {
        for (peer, inbox) in self.hub.peers_of(self.operator_id) {
            if inbox.send(Inbound::Frame(frame.clone())).is_err() {
                debug!(from = self.operator_id, to = peer, "Peer inbox closed");
            }
        }
        Ok(())
    }

    async fn request(&self, frame: Vec<u8>) -> ControllerResult<Vec<u8>> {
        let peers = self.hub.peers_of(self.operator_id);
        let (peer, inbox) = peers
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| ControllerError::Network("no peers".into()))?;

        let (reply, response) = oneshot::channel();
        inbox
            .send(Inbound::Request { frame, reply })
            .map_err(|_| ControllerError::Network(format!("peer {peer} unreachable")))?;
        response
            .await
            .map_err(|_| ControllerError::Network(format!("peer {peer} dropped the request")))?
    }
}
