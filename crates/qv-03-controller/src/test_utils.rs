//! Controller test doubles.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use qv_01_messages::test_utils::{identifier, multi_signed};
use qv_01_messages::{Message, SignedMessage, SsvMessage, SyncPayload, SyncRequest};
use qv_02_instance::{AcceptAll, RoundTimeout};
use shared_crypto::test_utils::TestCommittee;
use shared_types::{Height, OperatorId, FIRST_ROUND};
use tokio::sync::mpsc;

use crate::adapters::{InMemoryKvStore, KvQbftStore};
use crate::domain::{ControllerConfig, WireCodec};
use crate::error::{ControllerResult, KvStoreError};
use crate::ports::{BatchOperation, KeyValueStore, Network, QbftStore};
use crate::service::Controller;

/// Records broadcast frames and requests. Requests go to the responder
/// controller, or hang until dropped when none is set.
#[derive(Default)]
pub struct RecordingNetwork {
    sent: Mutex<Vec<Vec<u8>>>,
    requested: Mutex<Vec<Vec<u8>>>,
    responder: Mutex<Option<Controller>>,
    requests: AtomicUsize,
    hanging: Arc<AtomicUsize>,
}

/// Counts a hanging request until its future is dropped.
struct HangingGuard(Arc<AtomicUsize>);

impl HangingGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for HangingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RecordingNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_responder(&self, peer: Controller) {
        *self.responder.lock() = Some(peer);
    }

    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Decoded envelopes of everything broadcast so far.
    pub fn sent_messages(&self) -> Vec<SsvMessage> {
        self.sent
            .lock()
            .iter()
            .map(|frame| WireCodec::decode(frame).expect("own frame decodes").1)
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Requests still waiting on a peer that never answers.
    pub fn hanging_requests(&self) -> usize {
        self.hanging.load(Ordering::SeqCst)
    }

    /// Every sync request sent, in order.
    pub fn sync_requests(&self) -> Vec<SyncRequest> {
        self.requested
            .lock()
            .iter()
            .filter_map(|frame| {
                let (_, msg) = WireCodec::decode(frame).expect("own frame decodes");
                match msg.sync_payload().expect("sync envelope") {
                    SyncPayload::Request(request) => Some(request),
                    SyncPayload::Response(_) => None,
                }
            })
            .collect()
    }
}

#[async_trait]
impl Network for RecordingNetwork {
    async fn broadcast(&self, frame: Vec<u8>) -> ControllerResult<()> {
        self.sent.lock().push(frame);
        Ok(())
    }

    async fn request(&self, frame: Vec<u8>) -> ControllerResult<Vec<u8>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().push(frame.clone());
        let peer = self.responder.lock().clone();
        match peer {
            Some(peer) => peer.handle_request_frame(&frame),
            None => {
                let _guard = HangingGuard::new(&self.hanging);
                std::future::pending().await
            }
        }
    }
}

/// In-memory store whose next `failures` batch writes fail.
#[derive(Default)]
pub struct FlakyKvStore {
    inner: InMemoryKvStore,
    failures: AtomicU32,
}

impl FlakyKvStore {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: InMemoryKvStore::new(),
            failures: AtomicU32::new(failures),
        }
    }
}

impl KeyValueStore for FlakyKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvStoreError> {
        self.inner.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvStoreError> {
        self.inner.put(key, value)
    }

    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), KvStoreError> {
        let fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(KvStoreError::IoError {
                message: "disk unavailable".into(),
            });
        }
        self.inner.atomic_batch_write(operations)
    }
}

/// A controller wired to a recording network and an in-memory store.
pub struct TestNode {
    pub controller: Controller,
    pub network: Arc<RecordingNetwork>,
    pub store: Arc<dyn QbftStore>,
    pub timeouts: mpsc::UnboundedReceiver<RoundTimeout>,
}

impl TestNode {
    pub fn new(committee: &TestCommittee, operator_id: OperatorId, config: ControllerConfig) -> Self {
        let store = Arc::new(KvQbftStore::new(InMemoryKvStore::new()));
        Self::with_store(committee, operator_id, config, store)
    }

    pub fn with_store(
        committee: &TestCommittee,
        operator_id: OperatorId,
        config: ControllerConfig,
        store: Arc<dyn QbftStore>,
    ) -> Self {
        let network = RecordingNetwork::new();
        let (controller, timeouts) = Controller::new(
            identifier(committee),
            committee.share_for(operator_id),
            config,
            committee.key_manager_for(operator_id),
            Arc::new(AcceptAll),
            network.clone(),
            store.clone(),
        )
        .expect("controller");
        Self {
            controller,
            network,
            store,
            timeouts,
        }
    }
}

/// Round-1 commit for `value` at `height`, aggregated over `signers`.
pub fn decided(committee: &TestCommittee, height: Height, value: &[u8], signers: &[OperatorId]) -> SignedMessage {
    let msg = Message::commit(height, FIRST_ROUND, identifier(committee), value).expect("commit");
    multi_signed(committee, signers, msg)
}
