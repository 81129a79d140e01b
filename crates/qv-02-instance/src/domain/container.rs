//! # Message Container
//!
//! Per-round message store for one message type.
//!
//! ## Invariant
//!
//! At most one stored message per (round, signer). Insertion is the single
//! gate against a byzantine signer being counted twice or voting for two
//! values in one round: `add_if_not_exists == false` means "already handled,
//! skip side effects".

use std::collections::{BTreeMap, BTreeSet};

use qv_01_messages::{MessageResult, SignedMessage};
use shared_types::{OperatorId, Round};

#[derive(Debug, Default, Clone)]
pub struct MsgContainer {
    messages: BTreeMap<Round, Vec<SignedMessage>>,
}

impl MsgContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `msg` unless one of its signers already has a message in the
    /// same round.
    pub fn add_if_not_exists(&mut self, msg: SignedMessage) -> bool {
        let stored = self.messages.entry(msg.message.round).or_default();
        let taken = stored
            .iter()
            .any(|existing| msg.signers.iter().any(|s| existing.has_signer(*s)));
        if taken {
            return false;
        }
        stored.push(msg);
        true
    }

    pub fn messages_for_round(&self, round: Round) -> &[SignedMessage] {
        self.messages.get(&round).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Messages stored for rounds strictly greater than `round`.
    pub fn messages_above_round(&self, round: Round) -> impl Iterator<Item = &SignedMessage> {
        self.messages
            .range(round.saturating_add(1)..)
            .flat_map(|(_, msgs)| msgs.iter())
    }

    /// Distinct signers across `round`.
    pub fn signers_for_round(&self, round: Round) -> BTreeSet<OperatorId> {
        distinct_signers(self.messages_for_round(round))
    }

    /// Messages in `round` whose value equals `value`, and whether their
    /// distinct signers reach `quorum`.
    pub fn quorum_achieved(
        &self,
        round: Round,
        value: &[u8],
        quorum: usize,
    ) -> MessageResult<(bool, Vec<SignedMessage>)> {
        let mut matching = Vec::new();
        for msg in self.messages_for_round(round) {
            if msg.message.value()?.as_deref() == Some(value) {
                matching.push(msg.clone());
            }
        }
        let achieved = distinct_signers(&matching).len() >= quorum;
        Ok((achieved, matching))
    }

    pub fn len(&self) -> usize {
        self.messages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Set of signer ids across `msgs`.
pub fn distinct_signers<'a, I>(msgs: I) -> BTreeSet<OperatorId>
where
    I: IntoIterator<Item = &'a SignedMessage>,
{
    msgs.into_iter()
        .flat_map(|m| m.signers.iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use qv_01_messages::test_utils::{identifier, multi_signed, signed};
    use qv_01_messages::Message;
    use shared_crypto::test_utils::TestCommittee;

    fn commit(committee: &TestCommittee, signer: OperatorId, round: Round, value: &[u8]) -> SignedMessage {
        signed(
            committee,
            signer,
            Message::commit(1, round, identifier(committee), value).unwrap(),
        )
    }

    #[test]
    fn test_add_if_not_exists_dedups_by_round_and_signer() {
        let committee = TestCommittee::new(4);
        let mut container = MsgContainer::new();

        assert!(container.add_if_not_exists(commit(&committee, 1, 1, b"value")));
        assert!(!container.add_if_not_exists(commit(&committee, 1, 1, b"value")));
        // same signer, conflicting value, same round
        assert!(!container.add_if_not_exists(commit(&committee, 1, 1, b"other")));
        // same signer, next round
        assert!(container.add_if_not_exists(commit(&committee, 1, 2, b"value")));
        assert_eq!(container.len(), 2);
    }

    #[test]
    fn test_aggregate_overlapping_stored_signer_rejected() {
        let committee = TestCommittee::new(4);
        let mut container = MsgContainer::new();
        assert!(container.add_if_not_exists(commit(&committee, 2, 1, b"value")));

        let agg = multi_signed(
            &committee,
            &[1, 2],
            Message::commit(1, 1, identifier(&committee), b"value").unwrap(),
        );
        assert!(!container.add_if_not_exists(agg));
    }

    #[test]
    fn test_quorum_achieved_with_three_of_four() {
        let committee = TestCommittee::new(4);
        let mut container = MsgContainer::new();
        for signer in [1, 2, 3] {
            container.add_if_not_exists(commit(&committee, signer, 1, b"value"));
        }

        let (achieved, msgs) = container.quorum_achieved(1, b"value", 3).unwrap();
        assert!(achieved);
        assert_eq!(msgs.len(), 3);
    }

    #[test]
    fn test_quorum_not_achieved_with_two_of_four() {
        let committee = TestCommittee::new(4);
        let mut container = MsgContainer::new();
        for signer in [1, 2] {
            container.add_if_not_exists(commit(&committee, signer, 1, b"value"));
        }
        let (achieved, _) = container.quorum_achieved(1, b"value", 3).unwrap();
        assert!(!achieved);
    }

    #[test]
    fn test_quorum_counts_only_matching_value() {
        let committee = TestCommittee::new(4);
        let mut container = MsgContainer::new();
        container.add_if_not_exists(commit(&committee, 1, 1, b"value"));
        container.add_if_not_exists(commit(&committee, 2, 1, b"value"));
        container.add_if_not_exists(commit(&committee, 3, 1, b"other"));

        let (achieved, msgs) = container.quorum_achieved(1, b"value", 3).unwrap();
        assert!(!achieved);
        assert_eq!(msgs.len(), 2);
    }

    #[test]
    fn test_messages_above_round() {
        let committee = TestCommittee::new(4);
        let mut container = MsgContainer::new();
        container.add_if_not_exists(commit(&committee, 1, 1, b"v"));
        container.add_if_not_exists(commit(&committee, 2, 2, b"v"));
        container.add_if_not_exists(commit(&committee, 3, 5, b"v"));

        let rounds: Vec<Round> = container
            .messages_above_round(1)
            .map(|m| m.message.round)
            .collect();
        assert_eq!(rounds, vec![2, 5]);
        assert_eq!(container.signers_for_round(5).len(), 1);
    }
}
