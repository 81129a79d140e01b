//! Duty Runner Service
//!
//! Executes one duty at a time for one role of one validator:
//!
//! 0. Proposers only: `start_duty` signs the epoch's RANDAO root with this
//!    operator's share and `process_pre_consensus` collects peers' partials
//!    until a quorum reconstructs the reveal. The block built with it is
//!    the consensus payload.
//! 1. `start_duty`: the encoded [`ConsensusData`] goes to the controller as
//!    the next instance's input
//! 2. `on_decided`: the decided payload's root is signed with this
//!    operator's share and broadcast as a post-consensus partial
//! 3. `process_post_consensus`: verified partials are collected until a
//!    quorum reconstructs the validator signature, which is submitted
//!
//! The runner state sits behind an async mutex. Broadcasts and submissions
//! happen after it is released.

use std::collections::BTreeMap;
use std::sync::Arc;

use qv_01_messages::{
    MessageError, SignedPostConsensusMessage, SignedPreConsensusMessage, SsvMessage, SsvMsgType,
};
use qv_02_instance::ValueCheck;
use qv_03_controller::{Controller, ControllerError, DecidedEvent};
use shared_crypto::{CryptoResult, KeyManager};
use shared_types::{
    BlsPublicKey, Height, OperatorId, RoleType, Root, Share, Signature, SignatureType, POST_CONSENSUS_SIG_TYPE,
    PRE_CONSENSUS_SIG_TYPE,
};
use tokio::sync::{broadcast, MutexGuard};
use tracing::{debug, info, warn};

use crate::domain::duty::needs_pre_consensus;
use crate::domain::{
    ConsensusData, Duty, DutyExecutionState, DutyStart, PreConsensusState, RunnerConfig, RunnerPhase, SignedDuty,
    Slot,
};
use crate::error::{RunnerError, RunnerResult};
use crate::metrics;
use crate::ports::{BlockProducer, DutySubmitter};

/// Runs duties of one role through consensus and post-consensus. Cheap to
/// clone.
#[derive(Clone)]
pub struct DutyRunner {
    inner: Arc<Inner>,
}

struct Inner {
    role: RoleType,
    share: Share,
    config: RunnerConfig,
    controller: Controller,
    signer: Arc<dyn KeyManager>,
    value_check: Arc<dyn ValueCheck>,
    submitter: Arc<dyn DutySubmitter>,
    block_producer: Option<Arc<dyn BlockProducer>>,
    state: tokio::sync::Mutex<RunnerState>,
}

#[derive(Default)]
struct RunnerState {
    /// RANDAO collection of the current proposer duty
    pre_consensus: Option<PreConsensusState>,
    /// RANDAO partials for a slot not started yet
    early_pre_consensus: Vec<SignedPreConsensusMessage>,
    execution: Option<DutyExecutionState>,
}

impl DutyRunner {
    pub fn new(
        role: RoleType,
        config: RunnerConfig,
        controller: Controller,
        signer: Arc<dyn KeyManager>,
        value_check: Arc<dyn ValueCheck>,
        submitter: Arc<dyn DutySubmitter>,
    ) -> Self {
        Self::build(role, config, controller, signer, value_check, submitter, None)
    }

    /// A proposer runner: blocks come from `producer` once the RANDAO
    /// reveal is reconstructed.
    pub fn proposer(
        config: RunnerConfig,
        controller: Controller,
        signer: Arc<dyn KeyManager>,
        value_check: Arc<dyn ValueCheck>,
        submitter: Arc<dyn DutySubmitter>,
        producer: Arc<dyn BlockProducer>,
    ) -> Self {
        Self::build(
            RoleType::Proposer,
            config,
            controller,
            signer,
            value_check,
            submitter,
            Some(producer),
        )
    }

    fn build(
        role: RoleType,
        config: RunnerConfig,
        controller: Controller,
        signer: Arc<dyn KeyManager>,
        value_check: Arc<dyn ValueCheck>,
        submitter: Arc<dyn DutySubmitter>,
        block_producer: Option<Arc<dyn BlockProducer>>,
    ) -> Self {
        let share = controller.share().clone();
        Self {
            inner: Arc::new(Inner {
                role,
                share,
                config,
                controller,
                signer,
                value_check,
                submitter,
                block_producer,
                state: tokio::sync::Mutex::new(RunnerState::default()),
            }),
        }
    }

    pub fn role(&self) -> RoleType {
        self.inner.role
    }

    pub fn controller(&self) -> &Controller {
        &self.inner.controller
    }

    /// Height and phase of the current consensus execution, if any.
    pub async fn status(&self) -> Option<(Height, RunnerPhase)> {
        let state = self.inner.state.lock().await;
        state.execution.as_ref().map(|s| (s.height, s.phase()))
    }

    /// Operators whose partial signatures have been collected.
    pub async fn collected_signers(&self) -> Vec<OperatorId> {
        let state = self.inner.state.lock().await;
        state
            .execution
            .as_ref()
            .map(DutyExecutionState::signers)
            .unwrap_or_default()
    }

    /// Operators whose RANDAO partials have been collected.
    pub async fn pre_consensus_signers(&self) -> Vec<OperatorId> {
        let state = self.inner.state.lock().await;
        state
            .pre_consensus
            .as_ref()
            .map(PreConsensusState::signers)
            .unwrap_or_default()
    }

    /// Reconstructed RANDAO reveal of the current proposer duty.
    pub async fn randao_reveal(&self) -> Option<Signature> {
        let state = self.inner.state.lock().await;
        state.pre_consensus.as_ref().and_then(|p| p.reveal().cloned())
    }

    fn own_public_key(&self) -> RunnerResult<BlsPublicKey> {
        let share = &self.inner.share;
        let operator = share
            .operator(share.operator_id)
            .ok_or(MessageError::UnknownSigner(share.operator_id))?;
        Ok(operator.public_key)
    }

    // =========================================================================
    // Starting duties
    // =========================================================================

    /// Whether `duty` may replace the current execution.
    pub async fn can_start_new_duty(&self, duty: &Duty) -> RunnerResult<()> {
        let state = self.inner.state.lock().await;
        self.check_can_start(&state, duty)
    }

    fn check_can_start(&self, state: &RunnerState, duty: &Duty) -> RunnerResult<()> {
        let timeout = self.inner.config.duty_execution_slot_timeout;
        if let Some(pre) = state.pre_consensus.as_ref().filter(|p| !p.is_finished()) {
            if pre.duty.slot.saturating_add(timeout) >= duty.slot {
                return Err(RunnerError::PreConsensusRunning { slot: pre.duty.slot });
            }
            info!(slot = pre.duty.slot, signers = ?pre.signers(), "Abandoning RANDAO collection");
            return Ok(());
        }

        let Some(state) = state.execution.as_ref() else {
            return Ok(());
        };
        if state.is_finished() {
            return Ok(());
        }
        let Some(decided) = state.decided() else {
            return Err(RunnerError::ConsensusRunning {
                height: state.height,
            });
        };
        let deadline: Slot = decided.duty.slot.saturating_add(timeout);
        if !state.has_quorum() && deadline >= duty.slot {
            return Err(RunnerError::PostConsensusRunning {
                slot: decided.duty.slot,
            });
        }
        info!(
            height = state.height,
            slot = decided.duty.slot,
            signers = ?state.signers(),
            "Abandoning post-consensus collection"
        );
        Ok(())
    }

    /// Start `duty`, replacing the previous execution. Proposer duties begin
    /// with RANDAO collection and treat `data` as graffiti for the block;
    /// every other role starts consensus on `data` right away.
    pub async fn start_duty(&self, duty: Duty, data: Vec<u8>) -> RunnerResult<DutyStart> {
        if duty.role != self.inner.role {
            return Err(RunnerError::WrongRole {
                expected: self.inner.role,
                actual: duty.role,
            });
        }
        let mut state = self.inner.state.lock().await;
        self.check_can_start(&state, &duty)?;
        if duty.needs_pre_consensus() {
            return self.start_pre_consensus(state, duty, data).await;
        }
        let height = self
            .start_new_consensus_instance(&mut state.execution, ConsensusData { duty, data })
            .await?;
        Ok(DutyStart::Consensus { height })
    }

    /// Hand `input` to the controller and record the new execution.
    async fn start_new_consensus_instance(
        &self,
        state: &mut Option<DutyExecutionState>,
        input: ConsensusData,
    ) -> RunnerResult<Height> {
        let value = input.encode()?;
        self.inner
            .value_check
            .check(&value)
            .map_err(RunnerError::InvalidInput)?;
        let height = self.inner.controller.start_new_instance(value).await?;

        info!(
            role = %self.inner.role,
            slot = input.duty.slot,
            height,
            "Duty consensus started"
        );
        metrics::record_duty_started(&self.inner.role.to_string());
        *state = Some(DutyExecutionState::new(
            input.duty,
            height,
            self.inner.share.quorum(),
        ));
        Ok(height)
    }

    // =========================================================================
    // Pre-consensus
    // =========================================================================

    async fn start_pre_consensus(
        &self,
        mut guard: MutexGuard<'_, RunnerState>,
        duty: Duty,
        graffiti: Vec<u8>,
    ) -> RunnerResult<DutyStart> {
        if self.inner.block_producer.is_none() {
            return Err(RunnerError::NoBlockProducer);
        }
        let share = &self.inner.share;
        let slot = duty.slot;
        let own = SignedPreConsensusMessage::sign(
            slot,
            duty.randao_root(),
            share.operator_id,
            self.inner.signer.as_ref(),
            &share.domain,
            &self.own_public_key()?,
        )?;
        let mut pre = PreConsensusState::new(duty, graffiti, share.quorum());
        pre.add_partial(share.operator_id, own.message.partial_signature);
        info!(role = %self.inner.role, slot, "Duty RANDAO collection started");

        let state = &mut *guard;
        state.execution = None;
        let (early, later): (Vec<_>, Vec<_>) = std::mem::take(&mut state.early_pre_consensus)
            .into_iter()
            .filter(|m| m.message.slot >= slot)
            .partition(|m| m.message.slot == slot);
        state.early_pre_consensus = later;
        for msg in &early {
            if let Err(e) = self.accept_pre_partial(&mut pre, msg) {
                warn!(signer = msg.signer(), error = %e, "Dropped buffered RANDAO partial");
            }
        }
        state.pre_consensus = Some(pre);
        let completed = self.complete_pre_consensus(state).await;
        drop(guard);

        let envelope = SsvMessage::pre_consensus(self.inner.controller.identifier().clone(), &own)?;
        if let Err(e) = self.inner.controller.broadcast_message(&envelope).await {
            warn!(error = %e, "RANDAO partial broadcast failed");
        }
        completed?;
        Ok(DutyStart::PreConsensus { slot })
    }

    /// Collect a RANDAO partial. A quorum reconstructs the reveal and
    /// starts consensus on the block produced with it.
    pub async fn process_pre_consensus(&self, msg: SignedPreConsensusMessage) -> RunnerResult<()> {
        let result = self.collect_pre_consensus(msg).await;
        if let Err(e) = &result {
            if !matches!(e, RunnerError::Reconstruction(_)) {
                metrics::record_pre_consensus("rejected");
            }
            warn!(error = %e, kind = e.kind().as_str(), "Pre-consensus message not applied");
        }
        result
    }

    async fn collect_pre_consensus(&self, msg: SignedPreConsensusMessage) -> RunnerResult<()> {
        if !needs_pre_consensus(self.inner.role) {
            return Err(RunnerError::UnexpectedMessage(format!(
                "pre-consensus message for a {} runner",
                self.inner.role
            )));
        }
        let share = &self.inner.share;
        msg.verify(&share.domain, &share.committee)?;

        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let slot = msg.message.slot;
        let current = state.pre_consensus.as_ref().map(|p| p.duty.slot);
        match current {
            Some(expected) if expected > slot => {
                return Err(RunnerError::WrongSlot { expected, actual: slot });
            }
            Some(expected) if expected == slot => {}
            _ => return self.buffer_early_pre_consensus(state, msg),
        }
        let Some(pre) = state.pre_consensus.as_mut() else {
            return Ok(());
        };
        if pre.is_finished() {
            debug!(signer = msg.signer(), "Late RANDAO partial ignored");
            metrics::record_pre_consensus("late");
            return Ok(());
        }
        self.accept_pre_partial(pre, &msg)?;
        self.complete_pre_consensus(state).await
    }

    /// Keep a partial for a proposer duty this runner has not started yet.
    /// A signer's later copies for the same slot are dropped.
    fn buffer_early_pre_consensus(&self, state: &mut RunnerState, msg: SignedPreConsensusMessage) -> RunnerResult<()> {
        let (signer, slot) = (msg.signer(), msg.message.slot);
        let early = &mut state.early_pre_consensus;
        if early.iter().any(|m| m.signer() == signer && m.message.slot == slot) {
            return Ok(());
        }
        if early.len() >= self.inner.config.max_early_partials {
            return Err(RunnerError::EarlyBufferFull);
        }
        early.push(msg);
        debug!(signer, slot, buffered = early.len(), "RANDAO partial before duty start");
        metrics::record_pre_consensus("early");
        Ok(())
    }

    fn accept_pre_partial(&self, pre: &mut PreConsensusState, msg: &SignedPreConsensusMessage) -> RunnerResult<bool> {
        let signer = msg.signer();
        if msg.message.signing_root != pre.signing_root() {
            return Err(RunnerError::RootMismatch { signer });
        }
        if pre.has_partial(signer) {
            debug!(signer, "Duplicate RANDAO partial ignored");
            metrics::record_pre_consensus("duplicate");
            return Ok(false);
        }
        self.verify_partial(
            signer,
            &pre.signing_root(),
            PRE_CONSENSUS_SIG_TYPE,
            &msg.message.partial_signature,
        )?;
        pre.add_partial(signer, msg.message.partial_signature);
        metrics::record_pre_consensus("accepted");
        debug!(signer, collected = pre.partials().len(), "RANDAO partial added");
        Ok(true)
    }

    /// With a quorum in: reconstruct the reveal, have the block built and
    /// start consensus on it. A failed reconstruction keeps collecting.
    async fn complete_pre_consensus(&self, state: &mut RunnerState) -> RunnerResult<()> {
        let Some(pre) = state.pre_consensus.as_mut() else {
            return Ok(());
        };
        if pre.is_finished() || !pre.has_quorum() {
            return Ok(());
        }
        let reveal = match self.reconstruct_verified(pre.partials(), &pre.signing_root(), PRE_CONSENSUS_SIG_TYPE) {
            Ok(reveal) => reveal,
            Err(e) => {
                metrics::record_reconstruction("failed");
                warn!(slot = pre.duty.slot, signers = ?pre.signers(), error = %e, "RANDAO reconstruction failed");
                return Err(RunnerError::Reconstruction(e.to_string()));
            }
        };
        metrics::record_reconstruction("ok");
        info!(slot = pre.duty.slot, signers = ?pre.signers(), "RANDAO reveal reconstructed");
        pre.finish(reveal);

        let producer = self
            .inner
            .block_producer
            .as_ref()
            .ok_or(RunnerError::NoBlockProducer)?;
        let block = producer.produce_block(&pre.duty, &reveal, &pre.graffiti).await?;
        let input = ConsensusData {
            duty: pre.duty.clone(),
            data: block,
        };
        self.start_new_consensus_instance(&mut state.execution, input)
            .await
            .map(|_| ())
    }

    // =========================================================================
    // Decision
    // =========================================================================

    /// Sign the decided payload and broadcast the partial signature.
    /// Events for other heights are ignored.
    pub async fn on_decided(&self, event: &DecidedEvent) -> RunnerResult<()> {
        if event.identifier != *self.inner.controller.identifier() {
            return Ok(());
        }
        let mut guard = self.inner.state.lock().await;
        let Some(state) = guard.execution.as_mut() else {
            debug!(height = event.height, "Decided without a running duty");
            return Ok(());
        };
        if state.height != event.height || state.decided().is_some() {
            return Ok(());
        }

        let value = ConsensusData::decode(&event.value)?;
        let share = &self.inner.share;
        let own = SignedPostConsensusMessage::sign(
            state.height,
            value.signing_root(),
            share.operator_id,
            self.inner.signer.as_ref(),
            &share.domain,
            &self.own_public_key()?,
        )?;
        info!(height = state.height, slot = value.duty.slot, "Duty decided, signing");
        state.set_decided(value);
        state.add_partial(share.operator_id, own.message.duty_signature);

        for early in state.take_early() {
            let signer = early.signer();
            if let Err(e) = self.accept_partial(state, &early) {
                warn!(signer, error = %e, "Dropped buffered partial signature");
            }
        }
        let reconstructed = self.try_reconstruct(state);
        drop(guard);

        let envelope = SsvMessage::post_consensus(self.inner.controller.identifier().clone(), &own)?;
        if let Err(e) = self.inner.controller.broadcast_message(&envelope).await {
            warn!(error = %e, "Partial signature broadcast failed");
        }
        match reconstructed? {
            Some(duty) => self.submit(duty).await,
            None => Ok(()),
        }
    }

    /// Feed the controller's decided events into [`Self::on_decided`]
    /// until the channel closes.
    pub async fn listen_decided(self, mut events: broadcast::Receiver<DecidedEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = self.on_decided(&event).await {
                        warn!(height = event.height, error = %e, "Failed to act on decision");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Decided events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    // =========================================================================
    // Post-consensus
    // =========================================================================

    /// Route an envelope: partial signatures here, consensus and decided
    /// messages to the controller.
    pub async fn process_message(&self, msg: SsvMessage) -> RunnerResult<()> {
        match msg.msg_type {
            SsvMsgType::PostConsensus => {
                if msg.id != *self.inner.controller.identifier() {
                    return Err(ControllerError::WrongIdentifier.into());
                }
                self.process_post_consensus(msg.post_consensus_message()?).await
            }
            SsvMsgType::PreConsensus => {
                if msg.id != *self.inner.controller.identifier() {
                    return Err(ControllerError::WrongIdentifier.into());
                }
                self.process_pre_consensus(msg.pre_consensus_message()?).await
            }
            SsvMsgType::Consensus | SsvMsgType::Decided => {
                Ok(self.inner.controller.process_message(msg).await?)
            }
            other => Err(RunnerError::UnexpectedMessage(format!("{other:?}"))),
        }
    }

    pub async fn process_frame(&self, frame: &[u8]) -> RunnerResult<()> {
        let msg = self.inner.controller.decode_frame(frame)?;
        self.process_message(msg).await
    }

    /// Collect a partial signature, reconstructing once a quorum is in.
    pub async fn process_post_consensus(&self, msg: SignedPostConsensusMessage) -> RunnerResult<()> {
        let result = self.collect(msg).await;
        if let Err(e) = &result {
            if !matches!(e, RunnerError::Reconstruction(_)) {
                metrics::record_post_consensus("rejected");
            }
            warn!(error = %e, kind = e.kind().as_str(), "Post-consensus message not applied");
        }
        match result? {
            Some(duty) => self.submit(duty).await,
            None => Ok(()),
        }
    }

    async fn collect(&self, msg: SignedPostConsensusMessage) -> RunnerResult<Option<SignedDuty>> {
        let share = &self.inner.share;
        msg.verify(&share.domain, &share.committee)?;

        let mut guard = self.inner.state.lock().await;
        let state = guard.execution.as_mut().ok_or(RunnerError::NoRunningDuty)?;
        if msg.message.height != state.height {
            return Err(RunnerError::WrongHeight {
                expected: state.height,
                actual: msg.message.height,
            });
        }
        if state.is_finished() {
            debug!(signer = msg.signer(), "Late partial signature ignored");
            metrics::record_post_consensus("late");
            return Ok(None);
        }
        if state.decided().is_none() {
            let signer = msg.signer();
            if !state.buffer_early(msg, self.inner.config.max_early_partials) {
                return Err(RunnerError::EarlyBufferFull);
            }
            debug!(signer, buffered = state.early_len(), "Partial signature before decision");
            metrics::record_post_consensus("early");
            return Ok(None);
        }

        self.accept_partial(state, &msg)?;
        self.try_reconstruct(state)
    }

    /// Verify `msg` against the decided root and store it. Returns whether
    /// it was new.
    fn accept_partial(&self, state: &mut DutyExecutionState, msg: &SignedPostConsensusMessage) -> RunnerResult<bool> {
        let Some(root) = state.signing_root() else {
            return Ok(false);
        };
        let signer = msg.signer();
        if msg.message.duty_signing_root != root {
            return Err(RunnerError::RootMismatch { signer });
        }
        if state.has_partial(signer) {
            debug!(signer, "Duplicate partial signature ignored");
            metrics::record_post_consensus("duplicate");
            return Ok(false);
        }
        self.verify_partial(signer, &root, POST_CONSENSUS_SIG_TYPE, &msg.message.duty_signature)?;
        state.add_partial(signer, msg.message.duty_signature);
        metrics::record_post_consensus("accepted");
        debug!(signer, collected = state.partials().len(), "Partial signature added");
        Ok(true)
    }

    /// Reconstruct and verify the validator signature once a quorum of
    /// partials is in. A failure leaves the execution collecting.
    fn try_reconstruct(&self, state: &mut DutyExecutionState) -> RunnerResult<Option<SignedDuty>> {
        if state.is_finished() || !state.has_quorum() {
            return Ok(None);
        }
        let (Some(decided), Some(root)) = (state.decided().cloned(), state.signing_root()) else {
            return Ok(None);
        };
        match self.reconstruct_verified(state.partials(), &root, POST_CONSENSUS_SIG_TYPE) {
            Ok(signature) => {
                state.finish(signature);
                metrics::record_reconstruction("ok");
                info!(
                    height = state.height,
                    slot = decided.duty.slot,
                    signers = ?state.signers(),
                    "Validator signature reconstructed"
                );
                Ok(Some(SignedDuty {
                    duty: decided.duty,
                    data: decided.data,
                    signing_root: root,
                    signature,
                }))
            }
            Err(e) => {
                metrics::record_reconstruction("failed");
                warn!(height = state.height, signers = ?state.signers(), error = %e, "Reconstruction failed");
                Err(RunnerError::Reconstruction(e.to_string()))
            }
        }
    }

    /// Check one operator's partial over `root` against its share key.
    fn verify_partial(
        &self,
        signer: OperatorId,
        root: &Root,
        sig_type: SignatureType,
        partial: &Signature,
    ) -> RunnerResult<()> {
        let share = &self.inner.share;
        let operator = share
            .operator(signer)
            .ok_or(MessageError::UnknownSigner(signer))?;
        self.inner
            .signer
            .verify(root, sig_type, &share.domain, partial, &operator.public_key)
            .map_err(|e| RunnerError::InvalidPartial {
                signer,
                reason: e.to_string(),
            })
    }

    /// Combine `partials` and check the result against the validator key.
    fn reconstruct_verified(
        &self,
        partials: &BTreeMap<OperatorId, Signature>,
        root: &Root,
        sig_type: SignatureType,
    ) -> CryptoResult<Signature> {
        let signer = &self.inner.signer;
        let share = &self.inner.share;
        let signature = signer.reconstruct(partials)?;
        signer.verify(root, sig_type, &share.domain, &signature, &share.validator_public_key)?;
        Ok(signature)
    }

    async fn submit(&self, duty: SignedDuty) -> RunnerResult<()> {
        let slot = duty.duty.slot;
        self.inner.submitter.submit(duty).await.map_err(|e| {
            warn!(slot, error = %e, "Duty submission failed");
            e
        })
    }
}

#[cfg(test)]
mod tests;
