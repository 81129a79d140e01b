//! Message validity and round-change justification
//!
//! A round change is *justified* for round `r` when a strong quorum of
//! round-change messages for `r` exists and either none of them claims a
//! prepared value, or the highest claimed `(prepared_round, value)` is backed
//! by a strong quorum of prepares. A proposal for `r > 1` must carry that
//! evidence and propose the highest prepared value when one exists.

use qv_01_messages::{MessageError, MessageType, ProposalData, RoundChangeData, SignedMessage};
use shared_types::{Height, Identifier, Round, Share};

use super::container::distinct_signers;
use crate::error::{InstanceError, InstanceResult};

/// What a justified round-change quorum tells the next proposer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundChangeJustification {
    /// Highest prepared `(round, value)` claimed in the quorum, if any
    pub highest_prepared: Option<(Round, Vec<u8>)>,
    /// Prepare quorum backing `highest_prepared`
    pub prepare_justification: Vec<SignedMessage>,
    /// Round-change quorum that was evaluated
    pub round_changes: Vec<SignedMessage>,
}

/// Context every message is checked against.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub share: &'a Share,
    pub identifier: &'a Identifier,
    pub height: Height,
}

fn unjustified(msg_type: MessageType, reason: impl Into<String>) -> InstanceError {
    InstanceError::Unjustified {
        msg_type,
        reason: reason.into(),
    }
}

/// Type, identifier, height, optional round, and signature.
pub fn check_signed(
    scope: Scope<'_>,
    msg: &SignedMessage,
    msg_type: MessageType,
    round: Option<Round>,
) -> InstanceResult<()> {
    if msg.message.msg_type != msg_type {
        return Err(MessageError::WrongMessageType {
            expected: msg_type,
            actual: msg.message.msg_type,
        }
        .into());
    }
    if &msg.message.identifier != scope.identifier {
        return Err(InstanceError::WrongIdentifier);
    }
    if msg.message.height != scope.height {
        return Err(InstanceError::WrongHeight {
            expected: scope.height,
            actual: msg.message.height,
        });
    }
    if let Some(round) = round {
        if msg.message.round < round {
            return Err(InstanceError::StaleRound {
                current: round,
                actual: msg.message.round,
            });
        }
        if msg.message.round > round {
            return Err(InstanceError::FutureRound {
                current: round,
                actual: msg.message.round,
            });
        }
    }
    msg.verify(&scope.share.domain, &scope.share.committee)?;
    Ok(())
}

/// `prepares` prove a strong quorum prepared `value` in `round`.
pub fn valid_prepare_quorum(
    scope: Scope<'_>,
    prepares: &[SignedMessage],
    round: Round,
    value: &[u8],
) -> InstanceResult<()> {
    for prepare in prepares {
        check_signed(scope, prepare, MessageType::Prepare, Some(round))?;
        if prepare.message.prepare_data()?.data != value {
            return Err(unjustified(MessageType::Prepare, "justification value mismatch"));
        }
    }
    let signers = distinct_signers(prepares).len();
    if !scope.share.has_quorum(signers) {
        return Err(unjustified(
            MessageType::Prepare,
            format!("{} prepare signers, need {}", signers, scope.share.quorum()),
        ));
    }
    Ok(())
}

/// Full validation of a single round-change message, returning its payload.
pub fn valid_round_change(scope: Scope<'_>, msg: &SignedMessage) -> InstanceResult<RoundChangeData> {
    check_signed(scope, msg, MessageType::RoundChange, None)?;
    msg.validate_single_signer()?;
    let data = msg.message.round_change_data()?;
    data.validate()?;
    if let Some(value) = &data.prepared_value {
        if data.prepared_round >= msg.message.round {
            return Err(unjustified(
                MessageType::RoundChange,
                "prepared round not below round change round",
            ));
        }
        valid_prepare_quorum(scope, &data.round_change_justification, data.prepared_round, value)?;
    }
    Ok(data)
}

/// Round-change payload with the greatest prepared round, if any claims one.
pub fn highest_prepared(
    round_changes: &[SignedMessage],
) -> InstanceResult<Option<RoundChangeData>> {
    let mut highest: Option<RoundChangeData> = None;
    for msg in round_changes {
        let data = msg.message.round_change_data()?;
        if !data.is_prepared() {
            continue;
        }
        let better = highest
            .as_ref()
            .map_or(true, |h| data.prepared_round > h.prepared_round);
        if better {
            highest = Some(data);
        }
    }
    Ok(highest)
}

/// Evaluate `round_changes` as a justification for `round`.
pub fn justify_round_change(
    scope: Scope<'_>,
    round_changes: &[SignedMessage],
    round: Round,
) -> InstanceResult<RoundChangeJustification> {
    for msg in round_changes {
        if msg.message.round != round {
            return Err(unjustified(
                MessageType::RoundChange,
                format!("round change for round {} in round {} quorum", msg.message.round, round),
            ));
        }
        valid_round_change(scope, msg)?;
    }
    let signers = distinct_signers(round_changes).len();
    if !scope.share.has_quorum(signers) {
        return Err(unjustified(
            MessageType::RoundChange,
            format!("{} round change signers, need {}", signers, scope.share.quorum()),
        ));
    }

    let (highest_prepared, prepare_justification) = match highest_prepared(round_changes)? {
        Some(data) => match data.prepared_value {
            Some(value) => (
                Some((data.prepared_round, value)),
                data.round_change_justification,
            ),
            None => (None, Vec::new()),
        },
        None => (None, Vec::new()),
    };
    Ok(RoundChangeJustification {
        highest_prepared,
        prepare_justification,
        round_changes: round_changes.to_vec(),
    })
}

/// Proposals after the first round must be justified by a round-change
/// quorum and, if anything was prepared, propose the highest prepared value.
pub fn valid_proposal_justification(
    scope: Scope<'_>,
    proposal: &ProposalData,
    round: Round,
) -> InstanceResult<()> {
    if round <= shared_types::FIRST_ROUND {
        return Ok(());
    }
    let justification = justify_round_change(scope, &proposal.round_change_justification, round)?;
    if let Some((prepared_round, value)) = justification.highest_prepared {
        if proposal.data != value {
            return Err(unjustified(
                MessageType::Proposal,
                "proposed value differs from highest prepared value",
            ));
        }
        valid_prepare_quorum(scope, &proposal.prepare_justification, prepared_round, &value)?;
    }
    Ok(())
}
