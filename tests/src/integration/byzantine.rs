//! # Byzantine Operators
//!
//! One operator of four is taken offline and its key is used by an
//! [`Impersonator`](crate::harness::Impersonator) to inject messages the
//! honest node would never send. The three honest operators still form a
//! quorum and must decide a valid value.

#[cfg(test)]
mod tests {
    use qv_01_messages::{Message, ProposalData};
    use qv_04_duty_runner::{ConsensusData, Duty};
    use shared_types::{RoleType, FIRST_ROUND};

    use crate::harness::{attestation_data, attester_duty, consensus_input, devnet, settle, Impersonator};

    fn proposal(identifier: shared_types::Identifier, value: Vec<u8>) -> Message {
        let payload = ProposalData {
            data: value,
            round_change_justification: Vec::new(),
            prepare_justification: Vec::new(),
        };
        Message::proposal(0, FIRST_ROUND, identifier, &payload).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_proposal_from_leader_forces_round_change() {
        let mut devnet = devnet();
        // leader of height 0, round 1
        devnet.crash(2).unwrap();
        let byzantine = Impersonator::new(&devnet, 2).unwrap();

        devnet.start_duty(attester_duty(1), attestation_data(1)).await.unwrap();
        let wrong_role = ConsensusData {
            duty: Duty {
                role: RoleType::Proposer,
                ..attester_duty(1)
            },
            data: b"block".to_vec(),
        };
        byzantine
            .broadcast_consensus(proposal(byzantine.identifier(), wrong_role.encode().unwrap()))
            .await;
        let report = devnet.collect_submissions(1).await.unwrap();

        assert_eq!(report.submissions.len(), 3);
        for op in devnet.live_operators() {
            let decided = devnet.node(op).unwrap().controller().get_decided(0).unwrap().unwrap();
            assert_eq!(decided.message.round, 2);
            assert_eq!(decided.message.commit_data().unwrap().data, consensus_input(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_valid_leader_value_is_decided_and_signed() {
        let mut devnet = devnet();
        devnet.crash(2).unwrap();
        let leader = Impersonator::new(&devnet, 2).unwrap();

        devnet.start_duty(attester_duty(1), attestation_data(1)).await.unwrap();
        let chosen = ConsensusData {
            duty: attester_duty(1),
            data: b"leader's attestation".to_vec(),
        };
        leader
            .broadcast_consensus(proposal(leader.identifier(), chosen.encode().unwrap()))
            .await;
        let report = devnet.collect_submissions(1).await.unwrap();

        for signed in report.submissions.values() {
            assert_eq!(signed.data, chosen.data);
            assert_eq!(signed.signing_root, chosen.signing_root());
        }
        let decided = devnet.node(1).unwrap().controller().get_decided(0).unwrap().unwrap();
        assert_eq!(decided.message.round, FIRST_ROUND);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflicting_votes_from_faulty_member_ignored() {
        let mut devnet = devnet();
        devnet.crash(4).unwrap();
        let faulty = Impersonator::new(&devnet, 4).unwrap();

        devnet.start_duty(attester_duty(1), attestation_data(1)).await.unwrap();
        let other = ConsensusData {
            duty: attester_duty(1),
            data: b"conflicting".to_vec(),
        }
        .encode()
        .unwrap();
        let id = faulty.identifier();
        faulty
            .broadcast_consensus(Message::prepare(0, FIRST_ROUND, id.clone(), &other).unwrap())
            .await;
        faulty
            .broadcast_consensus(Message::commit(0, FIRST_ROUND, id, &other).unwrap())
            .await;
        let report = devnet.collect_submissions(1).await.unwrap();

        assert_eq!(report.submissions.len(), 3);
        for signed in report.submissions.values() {
            assert_eq!(signed.data, attestation_data(1));
        }
        settle().await;
        let decided = devnet.node(1).unwrap().controller().get_decided(0).unwrap().unwrap();
        assert!(!decided.signers.contains(&4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_decided_from_single_signer_rejected() {
        let mut devnet = devnet();
        devnet.crash(4).unwrap();
        let faulty = Impersonator::new(&devnet, 4).unwrap();
        devnet.run_duty(attester_duty(1), attestation_data(1)).await.unwrap();

        // a "decided" for the next height carried by one signature only
        let bogus = faulty.sign(Message::commit(1, FIRST_ROUND, faulty.identifier(), &consensus_input(2)).unwrap());
        faulty
            .broadcast(&qv_01_messages::SsvMessage::decided(&bogus).unwrap())
            .await;
        settle().await;

        for op in devnet.live_operators() {
            assert_eq!(devnet.node(op).unwrap().controller().highest_decided().await, Some(0));
        }
    }
}
