//! # Post-Consensus Aggregation
//!
//! After a decision every operator signs the duty root with its share and
//! broadcasts the partial. Any quorum (3 of 4) reconstructs the validator
//! signature; extra, late or bogus partials must not change the outcome.

#[cfg(test)]
mod tests {
    use qv_04_duty_runner::RunnerPhase;

    use crate::harness::{attestation_data, attester_duty, devnet, settle, Impersonator};

    #[tokio::test(start_paused = true)]
    async fn test_three_of_four_reconstruct_and_late_duplicate_ignored() {
        let mut devnet = devnet();
        let report = devnet.run_duty(attester_duty(1), attestation_data(1)).await.unwrap();
        let root = report.submissions[&1].signing_root;

        let mut collected = Vec::new();
        for op in devnet.live_operators() {
            let runner = devnet.node(op).unwrap().runner();
            assert_eq!(runner.status().await, Some((0, RunnerPhase::Finished)));
            let signers = runner.collected_signers().await;
            assert!(signers.len() >= 3, "operator {op} reconstructed from {signers:?}");
            collected.push(signers);
        }

        // operator 4 re-sends its partial over its own hub connection
        let replay = Impersonator::new(&devnet, 4).unwrap();
        replay.broadcast_partial(0, root).await;
        replay.broadcast_partial(0, root).await;
        settle().await;

        assert!(devnet.drain_submissions().is_empty());
        for (op, before) in devnet.live_operators().into_iter().zip(collected) {
            let runner = devnet.node(op).unwrap().runner();
            assert_eq!(runner.collected_signers().await, before);
            assert_eq!(runner.status().await, Some((0, RunnerPhase::Finished)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bogus_partial_does_not_block_reconstruction() {
        let mut devnet = devnet();
        devnet.crash(4).unwrap();
        let faulty = Impersonator::new(&devnet, 4).unwrap();

        devnet.start_duty(attester_duty(1), attestation_data(1)).await.unwrap();
        // arrives before the decision and names another root
        faulty.broadcast_partial(0, [0xAB; 32]).await;
        let report = devnet.collect_submissions(1).await.unwrap();

        assert_eq!(report.submissions.len(), 3);
        for op in devnet.live_operators() {
            let signers = devnet.node(op).unwrap().runner().collected_signers().await;
            assert_eq!(signers, vec![1, 2, 3]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_for_other_height_ignored() {
        let mut devnet = devnet();
        let report = devnet.run_duty(attester_duty(1), attestation_data(1)).await.unwrap();
        let root = report.submissions[&1].signing_root;

        let stray = Impersonator::new(&devnet, 3).unwrap();
        stray.broadcast_partial(7, root).await;
        settle().await;

        assert!(devnet.drain_submissions().is_empty());
        let next = devnet.run_duty(attester_duty(2), attestation_data(2)).await.unwrap();
        assert_eq!(next.submissions.len(), 4);
    }
}
