//! # Consensus Flows
//!
//! A 4-operator committee (f = 1, quorum 3) deciding duties end to end:
//! start → proposal → prepare → commit → decided → post-consensus →
//! reconstructed validator signature.

#[cfg(test)]
mod tests {
    use qv_02_instance::Stage;
    use qv_03_controller::ForkVersion;
    use qv_04_duty_runner::{ConsensusData, RunnerPhase};
    use shared_types::{OperatorId, FIRST_ROUND};

    use crate::harness::{attestation_data, attester_duty, consensus_input, devnet, devnet_with};
    use node_runtime::NodeConfig;

    #[tokio::test(start_paused = true)]
    async fn test_happy_flow_decides_in_first_round() {
        let mut devnet = devnet();

        let report = devnet.run_duty(attester_duty(1), attestation_data(1)).await.unwrap();

        let operators: Vec<OperatorId> = report.submissions.keys().copied().collect();
        assert_eq!(operators, vec![1, 2, 3, 4]);
        for op in operators {
            let controller = devnet.node(op).unwrap().controller();
            let decided = controller.get_decided(0).unwrap().expect("decided stored");
            assert_eq!(decided.message.round, FIRST_ROUND);
            assert!(decided.signers.len() >= 3);
            assert_eq!(decided.message.commit_data().unwrap().data, consensus_input(1));
            assert_eq!(controller.instance_status().await, Some((0, Stage::Decided)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_operator_submits_the_same_signature() {
        let mut devnet = devnet();

        let report = devnet.run_duty(attester_duty(1), attestation_data(1)).await.unwrap();

        let first = report.submissions.values().next().unwrap();
        assert_eq!(first.duty, attester_duty(1));
        assert_eq!(first.data, attestation_data(1));
        assert_eq!(
            first.signing_root,
            ConsensusData {
                duty: attester_duty(1),
                data: attestation_data(1)
            }
            .signing_root()
        );
        assert!(report.submissions.values().all(|s| s.signature == first.signature));
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_duties_advance_height() {
        let mut devnet = devnet();

        for slot in 1..=3 {
            devnet.run_duty(attester_duty(slot), attestation_data(slot)).await.unwrap();
        }

        for op in devnet.live_operators() {
            let node = devnet.node(op).unwrap();
            assert_eq!(node.controller().highest_decided().await, Some(2));
            assert_eq!(node.runner().status().await, Some((2, RunnerPhase::Finished)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_seven_operators_tolerate_two_crashes() {
        let mut devnet = devnet_with(NodeConfig {
            committee_size: 7,
            ..NodeConfig::default()
        });
        // round-1 leader at height 0 and one more
        devnet.crash(2).unwrap();
        devnet.crash(5).unwrap();

        let report = devnet.run_duty(attester_duty(1), attestation_data(1)).await.unwrap();

        assert_eq!(report.submissions.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crashed_leader_replaced_after_round_timeout() {
        let mut devnet = devnet();
        devnet.crash(2).unwrap();

        devnet.run_duty(attester_duty(1), attestation_data(1)).await.unwrap();

        let decided = devnet.node(1).unwrap().controller().get_decided(0).unwrap().unwrap();
        assert_eq!(decided.message.round, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fork_switches_codec_between_heights() {
        let mut config = NodeConfig::default();
        config.controller.fork_v1_activation_height = 1;
        let mut devnet = devnet_with(config);

        let controller = devnet.node(1).unwrap().controller().clone();
        assert_eq!(controller.fork_version(), ForkVersion::V0);
        devnet.run_duty(attester_duty(1), attestation_data(1)).await.unwrap();

        devnet.run_duty(attester_duty(2), attestation_data(2)).await.unwrap();
        assert_eq!(controller.fork_version(), ForkVersion::V1);
        assert_eq!(controller.highest_decided().await, Some(1));
    }
}
