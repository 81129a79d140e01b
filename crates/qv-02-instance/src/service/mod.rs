//! QBFT Instance - core state machine
//!
//! One instance decides one height. It is a synchronous, single-writer state
//! machine: every call takes `&mut self`, applies the full state transition,
//! and returns the side effects ([`InstanceOutput`]) for the owner to
//! perform afterwards. Broadcasts therefore always happen after the state
//! they report is committed, and exactly once.
//!
//! Messages this node creates are fed back into the instance immediately,
//! so the network only needs to deliver to the other committee members.
//! Redelivery of an own message is harmless: containers deduplicate by
//! (round, signer).

use std::sync::Arc;

use qv_01_messages::{
    Message, MessageType, ProposalData, RoundChangeData, SignedMessage,
};
use shared_crypto::{CryptoError, KeyManager};
use shared_types::{BlsPublicKey, Height, Identifier, Round, Share, FIRST_HEIGHT, FIRST_ROUND};
use tracing::{debug, error, info, warn};

use crate::domain::justification::{
    check_signed, justify_round_change, valid_proposal_justification, valid_round_change,
};
use crate::domain::{
    distinct_signers, DecidedHandle, InstanceOutput, MsgContainer, Scope, Stage, State,
};
use crate::error::{InstanceError, InstanceResult};
use crate::metrics;
use crate::ports::ValueCheck;

/// A single QBFT instance.
pub struct Instance {
    state: State,
    signer: Arc<dyn KeyManager>,
    value_check: Arc<dyn ValueCheck>,
    proposals: MsgContainer,
    prepares: MsgContainer,
    commits: MsgContainer,
    round_changes: MsgContainer,
    decided: DecidedHandle,
}

fn scope(state: &State) -> Scope<'_> {
    Scope {
        share: &state.share,
        identifier: &state.identifier,
        height: state.height,
    }
}

/// Fold messages with equal roots and disjoint signers into one.
pub fn aggregate_all(msgs: &[SignedMessage]) -> InstanceResult<Option<SignedMessage>> {
    let mut iter = msgs.iter();
    let Some(first) = iter.next() else {
        return Ok(None);
    };
    let mut aggregated = first.clone();
    for msg in iter {
        aggregated.aggregate(msg)?;
    }
    Ok(Some(aggregated))
}

impl Instance {
    pub fn new(
        share: Share,
        identifier: Identifier,
        signer: Arc<dyn KeyManager>,
        value_check: Arc<dyn ValueCheck>,
    ) -> Self {
        Self {
            state: State::new(share, identifier, FIRST_HEIGHT),
            signer,
            value_check,
            proposals: MsgContainer::new(),
            prepares: MsgContainer::new(),
            commits: MsgContainer::new(),
            round_changes: MsgContainer::new(),
            decided: DecidedHandle::default(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn height(&self) -> Height {
        self.state.height
    }

    pub fn round(&self) -> Round {
        self.state.round
    }

    pub fn stage(&self) -> Stage {
        self.state.stage
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// `(decided, value)` without touching the state machine.
    pub fn is_decided(&self) -> (bool, Option<Vec<u8>>) {
        (self.decided.is_decided(), self.decided.value())
    }

    /// Handle for lock-free decision reads from other tasks.
    pub fn decided_handle(&self) -> DecidedHandle {
        self.decided.clone()
    }

    pub fn decided_message(&self) -> Option<&SignedMessage> {
        self.state.decided_message.as_ref()
    }

    // =========================================================================
    // Start / stop
    // =========================================================================

    /// Start agreeing on `value` at `height`. Only the first call has any
    /// effect.
    pub fn start(&mut self, value: Vec<u8>, height: Height) -> InstanceResult<Vec<InstanceOutput>> {
        if self.state.stage != Stage::NotStarted {
            debug!(height, "Instance already started");
            return Ok(Vec::new());
        }
        self.state.height = height;
        self.state.round = FIRST_ROUND;
        self.state.input_value = Some(value.clone());
        self.state.transition(Stage::Propose)?;

        let mut out = vec![InstanceOutput::ScheduleTimeout {
            height,
            round: FIRST_ROUND,
        }];
        let leader = self.state.share.leader(height, FIRST_ROUND);
        info!(
            height,
            leader,
            identifier = %self.state.identifier,
            "Instance started"
        );

        if self.state.is_leader(FIRST_ROUND) {
            let payload = ProposalData {
                data: value,
                round_change_justification: Vec::new(),
                prepare_justification: Vec::new(),
            };
            let proposal = self.sign(Message::proposal(
                height,
                FIRST_ROUND,
                self.state.identifier.clone(),
                &payload,
            )?)?;
            self.broadcast(proposal, &mut out)?;
        }
        Ok(out)
    }

    /// Stop processing; the instance rejects further input. A decision
    /// already reached stays readable.
    pub fn stop(&mut self) {
        if self.state.stage != Stage::Stopped {
            self.state.stage = Stage::Stopped;
            debug!(height = self.state.height, "Instance stopped");
        }
    }

    // =========================================================================
    // Message processing
    // =========================================================================

    /// Validate and apply one single-signer consensus message.
    pub fn process_msg(&mut self, msg: &SignedMessage) -> InstanceResult<Vec<InstanceOutput>> {
        let result = self.process(msg.clone());
        if let Err(e) = &result {
            metrics::record_message_rejected(msg.message.msg_type.as_str(), e.reason());
        }
        result
    }

    fn process(&mut self, msg: SignedMessage) -> InstanceResult<Vec<InstanceOutput>> {
        match self.state.stage {
            Stage::NotStarted => return Err(InstanceError::NotStarted),
            Stage::Stopped => return Err(InstanceError::Stopped),
            _ => {}
        }
        msg.validate_single_signer()?;
        debug!(
            msg_type = msg.message.msg_type.as_str(),
            height = msg.message.height,
            round = msg.message.round,
            signers = ?msg.signers,
            "Processing message"
        );

        let mut out = Vec::new();
        match msg.message.msg_type {
            MessageType::Proposal => self.upon_proposal(msg, &mut out)?,
            MessageType::Prepare => self.upon_prepare(msg, &mut out)?,
            MessageType::Commit => self.upon_commit(msg, &mut out)?,
            MessageType::RoundChange => self.upon_round_change(msg, &mut out)?,
        }
        Ok(out)
    }

    fn upon_proposal(&mut self, msg: SignedMessage, out: &mut Vec<InstanceOutput>) -> InstanceResult<()> {
        if self.state.stage == Stage::Decided {
            return Ok(());
        }
        let round = msg.message.round;
        if round < self.state.round {
            return Err(InstanceError::StaleRound {
                current: self.state.round,
                actual: round,
            });
        }
        let expected = self.state.share.leader(self.state.height, round);
        if msg.signers[0] != expected {
            return Err(InstanceError::WrongProposer {
                round,
                expected,
                actual: msg.signers[0],
            });
        }
        check_signed(scope(&self.state), &msg, MessageType::Proposal, None)?;
        let payload = msg.message.proposal_data()?;
        self.value_check
            .check(&payload.data)
            .map_err(InstanceError::InvalidValue)?;
        valid_proposal_justification(scope(&self.state), &payload, round)?;

        if round == self.state.round {
            if let Some(accepted) = &self.state.proposal_accepted_for_current_round {
                if accepted.root()? == msg.root()? {
                    return Ok(());
                }
                warn!(round, proposer = expected, "Conflicting proposal");
                return Err(InstanceError::ConflictingProposal { round });
            }
        }
        if !self.proposals.add_if_not_exists(msg.clone()) {
            return Ok(());
        }

        let height = self.state.height;
        if round > self.state.round {
            self.state.advance_round(round, Stage::Prepare)?;
            out.push(InstanceOutput::ScheduleTimeout { height, round });
        } else {
            self.state.transition(Stage::Prepare)?;
        }
        self.state.proposal_accepted_for_current_round = Some(msg);
        info!(height, round, proposer = expected, "Proposal accepted");

        let prepare = self.sign(Message::prepare(
            height,
            round,
            self.state.identifier.clone(),
            &payload.data,
        )?)?;
        self.broadcast(prepare, out)?;
        // prepares may have arrived before the proposal
        self.try_prepare_quorum(out)
    }

    fn upon_prepare(&mut self, msg: SignedMessage, out: &mut Vec<InstanceOutput>) -> InstanceResult<()> {
        if self.state.stage == Stage::Decided {
            return Ok(());
        }
        check_signed(scope(&self.state), &msg, MessageType::Prepare, None)?;
        let round = msg.message.round;
        if round < self.state.round {
            return Err(InstanceError::StaleRound {
                current: self.state.round,
                actual: round,
            });
        }
        if round > self.state.round {
            // kept until this node reaches the round
            self.prepares.add_if_not_exists(msg);
            return Ok(());
        }
        let value = msg.message.prepare_data()?.data;
        if let Some(accepted) = self.accepted_value()? {
            if accepted != value {
                return Err(InstanceError::PrepareValueMismatch);
            }
        }
        if !self.prepares.add_if_not_exists(msg) {
            return Ok(());
        }
        self.try_prepare_quorum(out)
    }

    /// Broadcast this round's commit once a prepare quorum for the accepted
    /// value exists. At most one commit per round.
    fn try_prepare_quorum(&mut self, out: &mut Vec<InstanceOutput>) -> InstanceResult<()> {
        let Some(value) = self.accepted_value()? else {
            return Ok(());
        };
        let round = self.state.round;
        if self.state.commit_sent_round == Some(round) {
            return Ok(());
        }
        let quorum = self.state.share.quorum();
        let (achieved, _) = self.prepares.quorum_achieved(round, &value, quorum)?;
        if !achieved {
            return Ok(());
        }

        self.state.set_prepared(round, value.clone());
        self.state.commit_sent_round = Some(round);
        self.state.transition(Stage::Commit)?;
        info!(height = self.state.height, round, "Prepared");

        let commit = self.sign(Message::commit(
            self.state.height,
            round,
            self.state.identifier.clone(),
            &value,
        )?)?;
        self.broadcast(commit, out)
    }

    fn upon_commit(&mut self, msg: SignedMessage, out: &mut Vec<InstanceOutput>) -> InstanceResult<()> {
        check_signed(scope(&self.state), &msg, MessageType::Commit, None)?;
        if self.state.stage == Stage::Decided {
            return self.grow_decided_proof(msg, out);
        }
        let round = msg.message.round;
        let value = msg.message.commit_data()?.data;
        if !self.commits.add_if_not_exists(msg) {
            return Ok(());
        }

        let quorum = self.state.share.quorum();
        let (achieved, msgs) = self.commits.quorum_achieved(round, &value, quorum)?;
        if !achieved {
            return Ok(());
        }
        let aggregated = aggregate_all(&msgs)?.ok_or(InstanceError::NoQuorum {
            have: 0,
            need: quorum,
        })?;
        self.decide(value, aggregated, out)
    }

    /// Add a late commit's signer to the decided proof. Never re-announces
    /// the decision itself.
    fn grow_decided_proof(&mut self, msg: SignedMessage, out: &mut Vec<InstanceOutput>) -> InstanceResult<()> {
        let Some(decided) = self.state.decided_message.as_mut() else {
            return Ok(());
        };
        if decided.root()? != msg.root()? || decided.has_signer(msg.signers[0]) {
            return Ok(());
        }
        decided.aggregate(&msg)?;
        debug!(signers = ?decided.signers, "Decided proof extended");
        out.push(InstanceOutput::DecidedProofGrown(decided.clone()));
        self.commits.add_if_not_exists(msg);
        Ok(())
    }

    fn decide(
        &mut self,
        value: Vec<u8>,
        aggregated_commit: SignedMessage,
        out: &mut Vec<InstanceOutput>,
    ) -> InstanceResult<()> {
        self.state.transition(Stage::Decided)?;
        self.state.decided_value = Some(value.clone());
        self.state.decided_message = Some(aggregated_commit.clone());
        self.decided.set(value.clone());
        metrics::record_decided();
        info!(
            height = self.state.height,
            round = aggregated_commit.message.round,
            signers = ?aggregated_commit.signers,
            "Decided"
        );
        out.push(InstanceOutput::Decided {
            value,
            aggregated_commit,
        });
        Ok(())
    }

    fn upon_round_change(&mut self, msg: SignedMessage, out: &mut Vec<InstanceOutput>) -> InstanceResult<()> {
        if self.state.stage == Stage::Decided {
            return Ok(());
        }
        let round = msg.message.round;
        if round < self.state.round {
            return Err(InstanceError::StaleRound {
                current: self.state.round,
                actual: round,
            });
        }
        valid_round_change(scope(&self.state), &msg)?;
        if !self.round_changes.add_if_not_exists(msg) {
            return Ok(());
        }
        if round > self.state.round {
            self.try_partial_quorum_jump(out)?;
        }
        self.try_propose_after_round_change(out)
    }

    /// A partial quorum of operators asking for higher rounds means at least
    /// one correct operator timed out: follow to the smallest such round.
    fn try_partial_quorum_jump(&mut self, out: &mut Vec<InstanceOutput>) -> InstanceResult<()> {
        let current = self.state.round;
        let target = {
            let higher: Vec<&SignedMessage> = self.round_changes.messages_above_round(current).collect();
            let signers = distinct_signers(higher.iter().copied()).len();
            if !self.state.share.has_partial_quorum(signers) {
                return Ok(());
            }
            match higher.iter().map(|m| m.message.round).min() {
                Some(round) => round,
                None => return Ok(()),
            }
        };

        self.state.advance_round(target, Stage::RoundChange)?;
        metrics::record_round_change("partial_quorum");
        info!(
            height = self.state.height,
            from = current,
            round = target,
            "Partial round change quorum, following"
        );
        out.push(InstanceOutput::ScheduleTimeout {
            height: self.state.height,
            round: target,
        });
        let round_change = self.create_round_change(target)?;
        self.broadcast(round_change, out)
    }

    /// The round leader proposes once the round change is justified: the
    /// highest prepared value if any, its own input value otherwise.
    fn try_propose_after_round_change(&mut self, out: &mut Vec<InstanceOutput>) -> InstanceResult<()> {
        let round = self.state.round;
        if round == FIRST_ROUND
            || !self.state.is_leader(round)
            || self.state.proposal_accepted_for_current_round.is_some()
        {
            return Ok(());
        }
        let round_changes = self.round_changes.messages_for_round(round).to_vec();
        if !self
            .state
            .share
            .has_quorum(distinct_signers(&round_changes).len())
        {
            return Ok(());
        }
        let justification = match justify_round_change(scope(&self.state), &round_changes, round) {
            Ok(j) => j,
            Err(e) => {
                warn!(round, error = %e, "Round change quorum not justified");
                return Ok(());
            }
        };

        let value = match justification.highest_prepared {
            Some((_, value)) => value,
            None => match &self.state.input_value {
                Some(value) => value.clone(),
                None => return Ok(()),
            },
        };
        let payload = ProposalData {
            data: value,
            round_change_justification: justification.round_changes,
            prepare_justification: justification.prepare_justification,
        };
        info!(height = self.state.height, round, "Proposing after round change");
        let proposal = self.sign(Message::proposal(
            self.state.height,
            round,
            self.state.identifier.clone(),
            &payload,
        )?)?;
        self.broadcast(proposal, out)
    }

    // =========================================================================
    // Timer
    // =========================================================================

    /// Round timer expiry. Expiries for any round but the current one are
    /// stale and ignored.
    pub fn on_round_timeout(&mut self, round: Round) -> InstanceResult<Vec<InstanceOutput>> {
        let mut out = Vec::new();
        if self.state.stage.is_terminal() || self.state.stage == Stage::NotStarted {
            return Ok(out);
        }
        if round != self.state.round {
            debug!(round, current = self.state.round, "Stale round timeout");
            return Ok(out);
        }

        let next = round.saturating_add(1);
        self.state.advance_round(next, Stage::RoundChange)?;
        metrics::record_round_change("timeout");
        info!(height = self.state.height, round = next, "Round timeout, changing round");

        out.push(InstanceOutput::ScheduleTimeout {
            height: self.state.height,
            round: next,
        });
        let round_change = self.create_round_change(next)?;
        self.broadcast(round_change, &mut out)?;
        Ok(out)
    }

    // =========================================================================
    // Controller entry points
    // =========================================================================

    /// Decide from a network-provided aggregated commit instead of
    /// re-deriving the decision locally.
    pub fn force_decide(&mut self, aggregated_commit: &SignedMessage) -> InstanceResult<Vec<InstanceOutput>> {
        if self.state.stage == Stage::Stopped {
            return Err(InstanceError::Stopped);
        }
        check_signed(scope(&self.state), aggregated_commit, MessageType::Commit, None)?;
        let quorum = self.state.share.quorum();
        if aggregated_commit.signers.len() < quorum {
            return Err(InstanceError::NoQuorum {
                have: aggregated_commit.signers.len(),
                need: quorum,
            });
        }
        let value = aggregated_commit.message.commit_data()?.data;

        let mut out = Vec::new();
        if self.state.stage == Stage::Decided {
            if self.state.decided_value.as_ref() != Some(&value) {
                error!(height = self.state.height, "Conflicting decided value");
                return Err(InstanceError::ConflictingDecision {
                    height: self.state.height,
                });
            }
            if let Some(decided) = self.state.decided_message.as_mut() {
                let superset = aggregated_commit.signers.len() > decided.signers.len()
                    && decided
                        .signers
                        .iter()
                        .all(|s| aggregated_commit.has_signer(*s));
                if superset {
                    *decided = aggregated_commit.clone();
                    out.push(InstanceOutput::DecidedProofGrown(aggregated_commit.clone()));
                }
            }
            return Ok(out);
        }

        info!(height = self.state.height, "Force deciding from network proof");
        self.decide(value, aggregated_commit.clone(), &mut out)?;
        Ok(out)
    }

    /// Aggregated prepare quorum for the last prepared round, used as
    /// round-change justification.
    pub fn prepared_aggregated_msg(&self) -> InstanceResult<Option<SignedMessage>> {
        let Some(value) = &self.state.last_prepared_value else {
            return Ok(None);
        };
        let quorum = self.state.share.quorum();
        let (achieved, msgs) = self
            .prepares
            .quorum_achieved(self.state.last_prepared_round, value, quorum)?;
        if !achieved {
            return Ok(None);
        }
        aggregate_all(&msgs)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn accepted_value(&self) -> InstanceResult<Option<Vec<u8>>> {
        match &self.state.proposal_accepted_for_current_round {
            Some(proposal) => Ok(Some(proposal.message.proposal_data()?.data)),
            None => Ok(None),
        }
    }

    fn create_round_change(&self, round: Round) -> InstanceResult<SignedMessage> {
        let next_proposal_data = if self.state.is_leader(round) {
            self.state.input_value.clone()
        } else {
            None
        };
        let payload = match &self.state.last_prepared_value {
            Some(value) => {
                let justification = self
                    .prepared_aggregated_msg()?
                    .ok_or(InstanceError::InvalidTransition {
                        from: self.state.stage,
                        to: Stage::RoundChange,
                    })?;
                RoundChangeData {
                    prepared_value: Some(value.clone()),
                    prepared_round: self.state.last_prepared_round,
                    next_proposal_data,
                    round_change_justification: vec![justification],
                }
            }
            None => RoundChangeData::unprepared(next_proposal_data),
        };
        self.sign(Message::round_change(
            self.state.height,
            round,
            self.state.identifier.clone(),
            &payload,
        )?)
    }

    fn own_public_key(&self) -> InstanceResult<BlsPublicKey> {
        let share = &self.state.share;
        share
            .operator(share.operator_id)
            .map(|op| op.public_key)
            .ok_or_else(|| {
                InstanceError::Signer(CryptoError::UnknownShare(format!(
                    "operator {}",
                    share.operator_id
                )))
            })
    }

    fn sign(&self, message: Message) -> InstanceResult<SignedMessage> {
        let public_key = self.own_public_key()?;
        Ok(SignedMessage::sign(
            message,
            self.state.share.operator_id,
            self.signer.as_ref(),
            &self.state.share.domain,
            &public_key,
        )?)
    }

    /// Queue `msg` for the network, then apply it locally.
    fn broadcast(&mut self, msg: SignedMessage, out: &mut Vec<InstanceOutput>) -> InstanceResult<()> {
        out.push(InstanceOutput::Broadcast(msg.clone()));
        let own = self.process(msg)?;
        out.extend(own);
        Ok(())
    }
}
