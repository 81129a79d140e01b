//! Controller Service
//!
//! Owns the sequence of instances for one identifier (one role of one
//! validator). All instance mutations go through one async mutex; side
//! effects are split in two phases:
//!
//! 1. Under the lock: instance transition, timer (re)arm, decided
//!    persistence, frame encoding
//! 2. After the lock: network broadcasts and decided events
//!
//! so a slow network never blocks message processing, and nothing is
//! broadcast or announced before the state it reports is stored.
//!
//! Peers may run a height ahead: a verified consensus message for the next
//! height is held (up to `max_pending_messages`) and replayed into that
//! instance when it starts. Anything further ahead is rejected.

mod sync;

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use qv_01_messages::{MessageType, SignedMessage, SsvMessage, SsvMsgType};
use qv_02_instance::domain::justification::{check_signed, valid_round_change};
use qv_02_instance::domain::Scope;
use qv_02_instance::{Instance, InstanceOutput, RoundTimeout, RoundTimer, Stage, ValueCheck};
use shared_crypto::KeyManager;
use shared_types::rate_limiter::presets;
use shared_types::{Height, Identifier, RateLimiter, Share, FIRST_HEIGHT};
use tokio::sync::{broadcast, mpsc, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::domain::{ControllerConfig, DecidedEvent, ForkVersion, WireCodec};
use crate::error::{ControllerError, ControllerResult};
use crate::metrics;
use crate::ports::{Network, QbftStore};

use sync::SyncTask;

/// Per-identifier QBFT controller. Cheap to clone.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

struct Inner {
    identifier: Identifier,
    share: Share,
    config: ControllerConfig,
    signer: Arc<dyn KeyManager>,
    value_check: Arc<dyn ValueCheck>,
    network: Arc<dyn Network>,
    store: Arc<dyn QbftStore>,
    state: tokio::sync::Mutex<ControllerState>,
    codec: RwLock<WireCodec>,
    timer: RoundTimer,
    decided_tx: broadcast::Sender<DecidedEvent>,
    sync_limiter: RateLimiter,
    responder_limiter: RateLimiter,
    sync: Mutex<Option<SyncTask>>,
    /// Serializes the read-compare-write of the last change round
    change_round: Mutex<()>,
}

struct ControllerState {
    instance: Option<Instance>,
    highest_decided: Option<Height>,
    /// Verified messages for `next_height()`, replayed on start
    pending: Vec<SignedMessage>,
}

impl ControllerState {
    fn next_height(&self) -> Height {
        let instance = self.instance.as_ref().map(Instance::height);
        instance
            .into_iter()
            .chain(self.highest_decided)
            .max()
            .map_or(FIRST_HEIGHT, |h| h.saturating_add(1))
    }

    fn known_height(&self) -> Option<Height> {
        let instance = self.instance.as_ref().map(Instance::height);
        instance.into_iter().chain(self.highest_decided).max()
    }

    fn note_decided(&mut self, height: Height) {
        if self.highest_decided.map_or(true, |h| height > h) {
            self.highest_decided = Some(height);
            metrics::set_highest_decided(height);
        }
    }
}

/// Work collected under the state lock.
#[derive(Default)]
struct Effects {
    frames: Vec<Vec<u8>>,
    events: Vec<DecidedEvent>,
}

impl Controller {
    /// Build a controller and the channel its round timer fires into. The
    /// owner feeds expiries back through [`Controller::on_timeout`].
    pub fn new(
        identifier: Identifier,
        share: Share,
        config: ControllerConfig,
        signer: Arc<dyn KeyManager>,
        value_check: Arc<dyn ValueCheck>,
        network: Arc<dyn Network>,
        store: Arc<dyn QbftStore>,
    ) -> ControllerResult<(Self, mpsc::UnboundedReceiver<RoundTimeout>)> {
        let highest_decided = store
            .get_last_decided(&identifier)?
            .map(|msg| msg.message.height);
        let next = highest_decided.map_or(FIRST_HEIGHT, |h| h.saturating_add(1));
        let codec = WireCodec::new(config.fork_schedule().version_at(next));

        let (timeout_tx, timeout_rx) = mpsc::unbounded_channel();
        let timer = RoundTimer::new(
            config.instance.timeout_policy(),
            identifier.clone(),
            timeout_tx,
        );
        let (decided_tx, _) = broadcast::channel(config.decided_channel_capacity.max(1));
        let sync_limiter = RateLimiter::new(config.sync_rate_capacity, config.sync_rate_refill_per_sec);

        info!(
            identifier = %identifier,
            operator = share.operator_id,
            highest_decided = ?highest_decided,
            fork = codec.version().as_str(),
            "Controller created"
        );

        let inner = Inner {
            identifier,
            share,
            config,
            signer,
            value_check,
            network,
            store,
            state: tokio::sync::Mutex::new(ControllerState {
                instance: None,
                highest_decided,
                pending: Vec::new(),
            }),
            codec: RwLock::new(codec),
            timer,
            decided_tx,
            sync_limiter,
            responder_limiter: presets::sync_responder(),
            sync: Mutex::new(None),
            change_round: Mutex::new(()),
        };
        Ok((
            Self {
                inner: Arc::new(inner),
            },
            timeout_rx,
        ))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn identifier(&self) -> &Identifier {
        &self.inner.identifier
    }

    pub fn share(&self) -> &Share {
        &self.inner.share
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn fork_version(&self) -> ForkVersion {
        self.inner.codec.read().version()
    }

    pub fn subscribe_decided(&self) -> broadcast::Receiver<DecidedEvent> {
        self.inner.decided_tx.subscribe()
    }

    pub async fn highest_decided(&self) -> Option<Height> {
        self.inner.state.lock().await.highest_decided
    }

    /// Height and stage of the current instance, if any.
    pub async fn instance_status(&self) -> Option<(Height, Stage)> {
        let state = self.inner.state.lock().await;
        state.instance.as_ref().map(|i| (i.height(), i.stage()))
    }

    pub fn get_decided(&self, height: Height) -> ControllerResult<Option<SignedMessage>> {
        Ok(self
            .inner
            .store
            .get_decided(&self.inner.identifier, height, height)?
            .into_iter()
            .next())
    }

    // =========================================================================
    // Instances
    // =========================================================================

    /// Start an instance for the next height. Fails while the current one
    /// is undecided.
    pub async fn start_new_instance(&self, value: Vec<u8>) -> ControllerResult<Height> {
        let mut state = self.inner.state.lock().await;
        if let Some(current) = &state.instance {
            if !current.is_decided().0 && current.stage() != Stage::Stopped {
                return Err(ControllerError::InstanceRunning {
                    height: current.height(),
                });
            }
        }
        let height = state.next_height();
        self.activate_fork(height);

        let mut instance = Instance::new(
            self.inner.share.clone(),
            self.inner.identifier.clone(),
            self.inner.signer.clone(),
            self.inner.value_check.clone(),
        );
        let mut outputs = instance.start(value, height)?;
        for msg in std::mem::take(&mut state.pending) {
            if msg.message.height != height {
                continue;
            }
            match instance.process_msg(&msg) {
                Ok(more) => outputs.extend(more),
                Err(e) => debug!(height, error = %e, "Dropped pending message"),
            }
        }
        state.instance = Some(instance);
        self.finish(state, outputs).await?;
        Ok(height)
    }

    /// Switch the wire codec when `height` crosses a fork. Only called
    /// between instances, so no running instance sees both encodings.
    fn activate_fork(&self, height: Height) {
        let version = self.inner.config.fork_schedule().version_at(height);
        let mut codec = self.inner.codec.write();
        if codec.version() != version {
            info!(
                height,
                from = codec.version().as_str(),
                to = version.as_str(),
                "Fork activated"
            );
            *codec = WireCodec::new(version);
        }
    }

    /// Round timer expiry for this controller's instance.
    pub async fn on_timeout(&self, expiry: RoundTimeout) -> ControllerResult<()> {
        if expiry.identifier != self.inner.identifier {
            return Err(ControllerError::WrongIdentifier);
        }
        let mut state = self.inner.state.lock().await;
        let outputs = match state.instance.as_mut() {
            Some(instance) if instance.height() == expiry.height => instance.on_round_timeout(expiry.round)?,
            _ => {
                debug!(height = expiry.height, round = expiry.round, "Timeout for retired instance");
                return Ok(());
            }
        };
        self.finish(state, outputs).await
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Decode a frame of any known fork version addressed to this
    /// identifier.
    pub fn decode_frame(&self, frame: &[u8]) -> ControllerResult<SsvMessage> {
        let (version, msg) = WireCodec::decode(frame)?;
        if msg.id != self.inner.identifier {
            return Err(ControllerError::WrongIdentifier);
        }
        debug!(version = version.as_str(), msg_type = ?msg.msg_type, "Decoded frame");
        Ok(msg)
    }

    /// Encode with the codec of the active fork.
    pub fn encode_frame(&self, msg: &SsvMessage) -> ControllerResult<Vec<u8>> {
        let codec = *self.inner.codec.read();
        codec.encode(msg)
    }

    /// Encode and broadcast an envelope produced outside the controller,
    /// such as a post-consensus partial signature.
    pub async fn broadcast_message(&self, msg: &SsvMessage) -> ControllerResult<()> {
        let frame = self.encode_frame(msg)?;
        self.inner.network.broadcast(frame).await
    }

    pub async fn process_frame(&self, frame: &[u8]) -> ControllerResult<()> {
        let msg = self.decode_frame(frame)?;
        self.process_message(msg).await
    }

    /// Route a consensus or decided envelope.
    pub async fn process_message(&self, msg: SsvMessage) -> ControllerResult<()> {
        if msg.id != self.inner.identifier {
            return Err(ControllerError::WrongIdentifier);
        }
        let result = match msg.msg_type {
            SsvMsgType::Consensus => self.process_consensus(msg.signed_message()?).await,
            SsvMsgType::Decided => self.process_decided(msg.signed_message()?).await,
            other => Err(ControllerError::UnexpectedMessage(format!("{other:?}"))),
        };
        if let Err(e) = &result {
            warn!(error = %e, kind = e.kind().as_str(), "Dropped message");
        }
        result
    }

    async fn process_consensus(&self, msg: SignedMessage) -> ControllerResult<()> {
        let height = msg.message.height;
        let msg_type = msg.message.msg_type;
        let mut state = self.inner.state.lock().await;
        let routed = state.instance.as_ref().map_or(false, |i| i.height() == height);
        if routed {
            let outputs = match state.instance.as_mut() {
                Some(instance) => instance.process_msg(&msg)?,
                None => return Err(ControllerError::NoInstance { height }),
            };
            if msg_type == MessageType::RoundChange {
                // validated by the instance
                self.record_change_round(&msg);
            }
            return self.finish(state, outputs).await;
        }

        if msg_type == MessageType::Commit && self.inner.share.has_quorum(msg.signers.len()) {
            drop(state);
            return self.process_decided(msg).await;
        }
        if msg_type == MessageType::RoundChange {
            self.process_change_round(&msg)?;
        }
        if height == state.next_height() {
            return self.hold_pending(&mut state, msg);
        }
        if msg_type == MessageType::RoundChange {
            return Ok(());
        }
        Err(ControllerError::NoInstance { height })
    }

    /// Keep a message for the instance about to start at its height.
    fn hold_pending(&self, state: &mut ControllerState, msg: SignedMessage) -> ControllerResult<()> {
        let height = msg.message.height;
        msg.validate()?;
        let scope = Scope {
            share: &self.inner.share,
            identifier: &self.inner.identifier,
            height,
        };
        check_signed(scope, &msg, msg.message.msg_type, None)?;
        if state.pending.len() >= self.inner.config.max_pending_messages {
            return Err(ControllerError::PendingFull { height });
        }
        debug!(height, msg_type = ?msg.message.msg_type, "Holding message for next instance");
        state.pending.push(msg);
        Ok(())
    }

    /// Handle an aggregated commit learned from the network.
    pub async fn process_decided(&self, msg: SignedMessage) -> ControllerResult<()> {
        self.validate_decided(&msg)?;
        let height = msg.message.height;
        let value = msg.message.commit_data()?.data;

        if let Some(stored) = self.get_decided(height)? {
            return self.upgrade_decided(stored, msg, value).await;
        }

        let mut state = self.inner.state.lock().await;
        let running_here = state
            .instance
            .as_ref()
            .map_or(false, |i| i.height() == height && i.stage() != Stage::Stopped);
        if running_here {
            let outputs = match state.instance.as_mut() {
                Some(instance) => instance.force_decide(&msg)?,
                None => Vec::new(),
            };
            return self.finish(state, outputs).await;
        }

        let behind = state.known_height().map_or(true, |known| height > known);
        let gap_from = state.highest_decided.map_or(FIRST_HEIGHT, |h| h.saturating_add(1));
        if behind {
            if let Some(instance) = state.instance.as_mut() {
                if !instance.is_decided().0 {
                    instance.stop();
                    self.inner.timer.cancel();
                    info!(
                        running = instance.height(),
                        decided = height,
                        "Network decided a higher height, stopping instance"
                    );
                }
            }
        }
        self.persist_decided(&msg)?;
        metrics::record_decided_persisted("network");
        state.note_decided(height);
        drop(state);

        self.emit(DecidedEvent {
            identifier: self.inner.identifier.clone(),
            height,
            value,
            aggregated_commit: msg,
        });
        if behind && gap_from < height {
            self.trigger_sync(gap_from, height - 1);
        }
        Ok(())
    }

    /// Replace a stored decided message by one with the same value and a
    /// strict superset of signers.
    async fn upgrade_decided(&self, stored: SignedMessage, msg: SignedMessage, value: Vec<u8>) -> ControllerResult<()> {
        let height = msg.message.height;
        if stored.message.commit_data()?.data != value {
            error!(height, "Conflicting decided value from network");
            return Err(ControllerError::ConflictingDecided { height });
        }
        let superset = msg.signers.len() > stored.signers.len()
            && stored.signers.iter().all(|s| msg.has_signer(*s));
        if !superset {
            return Ok(());
        }
        self.persist_decided(&msg)?;
        info!(height, signers = ?msg.signers, "Upgraded decided proof");

        let mut state = self.inner.state.lock().await;
        if let Some(instance) = state.instance.as_mut() {
            if instance.height() == height && instance.is_decided().0 {
                // keeps the in-memory proof in step with storage
                if let Err(e) = instance.force_decide(&msg) {
                    warn!(height, error = %e, "Stored proof upgraded but instance kept its own");
                }
            }
        }
        Ok(())
    }

    fn validate_decided(&self, msg: &SignedMessage) -> ControllerResult<()> {
        msg.validate()?;
        let scope = Scope {
            share: &self.inner.share,
            identifier: &self.inner.identifier,
            height: msg.message.height,
        };
        check_signed(scope, msg, MessageType::Commit, None)?;
        if !self.inner.share.has_quorum(msg.signers.len()) {
            return Err(ControllerError::InvalidDecided(format!(
                "{} signers, need {}",
                msg.signers.len(),
                self.inner.share.quorum()
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write a decided message, retrying per `storage_retries`. The
    /// decision is not announced unless this succeeds.
    fn persist_decided(&self, msg: &SignedMessage) -> ControllerResult<()> {
        let mut attempt = 0;
        loop {
            match self.inner.store.save_decided(msg) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.inner.config.storage_retries => {
                    attempt += 1;
                    warn!(height = msg.message.height, attempt, error = %e, "Decided write failed, retrying");
                }
                Err(e) => {
                    error!(height = msg.message.height, error = %e, "Failed to persist decided");
                    metrics::record_storage_failure();
                    return Err(e);
                }
            }
        }
    }

    /// Validate a peer's round change and remember it if it is the highest
    /// (height, round) seen for this identifier.
    pub fn process_change_round(&self, msg: &SignedMessage) -> ControllerResult<()> {
        if msg.message.identifier != self.inner.identifier {
            return Err(ControllerError::WrongIdentifier);
        }
        let scope = Scope {
            share: &self.inner.share,
            identifier: &self.inner.identifier,
            height: msg.message.height,
        };
        valid_round_change(scope, msg)?;
        self.store_change_round(msg)
    }

    /// Monotonic write of an already validated round change.
    fn store_change_round(&self, msg: &SignedMessage) -> ControllerResult<()> {
        let store = &self.inner.store;
        let _guard = self.inner.change_round.lock();
        let newer = match store.get_last_change_round(&self.inner.identifier)? {
            Some(last) => {
                (msg.message.height, msg.message.round) > (last.message.height, last.message.round)
            }
            None => true,
        };
        if newer {
            store.save_last_change_round(msg)?;
        }
        Ok(())
    }

    fn record_change_round(&self, msg: &SignedMessage) {
        if let Err(e) = self.store_change_round(msg) {
            error!(error = %e, "Failed to persist change round");
        }
    }

    // =========================================================================
    // Effects
    // =========================================================================

    /// Apply `outputs` under the lock, then release it and publish.
    async fn finish(
        &self,
        mut state: MutexGuard<'_, ControllerState>,
        outputs: Vec<InstanceOutput>,
    ) -> ControllerResult<()> {
        let mut effects = Effects::default();
        let result = self.apply_outputs(&mut state, outputs, &mut effects);
        drop(state);
        self.publish(effects).await;
        result
    }

    fn apply_outputs(
        &self,
        state: &mut ControllerState,
        outputs: Vec<InstanceOutput>,
        effects: &mut Effects,
    ) -> ControllerResult<()> {
        let codec = *self.inner.codec.read();
        for output in outputs {
            match output {
                InstanceOutput::Broadcast(msg) => {
                    if msg.message.msg_type == MessageType::RoundChange {
                        self.record_change_round(&msg);
                    }
                    effects.frames.push(codec.encode(&SsvMessage::consensus(&msg)?)?);
                }
                InstanceOutput::ScheduleTimeout { height, round } => {
                    self.inner.timer.schedule(height, round);
                }
                InstanceOutput::Decided {
                    value,
                    aggregated_commit,
                } => {
                    self.inner.timer.cancel();
                    self.persist_decided(&aggregated_commit)?;
                    metrics::record_decided_persisted("local");
                    let height = aggregated_commit.message.height;
                    state.note_decided(height);
                    if !self.inner.config.read_mode {
                        effects
                            .frames
                            .push(codec.encode(&SsvMessage::decided(&aggregated_commit)?)?);
                    }
                    effects.events.push(DecidedEvent {
                        identifier: self.inner.identifier.clone(),
                        height,
                        value,
                        aggregated_commit,
                    });
                }
                InstanceOutput::DecidedProofGrown(msg) => {
                    self.persist_decided(&msg)?;
                }
            }
        }
        Ok(())
    }

    async fn publish(&self, effects: Effects) {
        for frame in effects.frames {
            if let Err(e) = self.inner.network.broadcast(frame).await {
                warn!(error = %e, "Broadcast failed");
            }
        }
        for event in effects.events {
            self.emit(event);
        }
    }

    fn emit(&self, event: DecidedEvent) {
        // no subscribers is fine
        let _ = self.inner.decided_tx.send(event);
    }
}
