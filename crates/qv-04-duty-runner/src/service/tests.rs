use super::*;
use crate::adapters::ConsensusDataCheck;
use crate::test_utils::{
    attester_duty, consensus_data, partial, proposer_duty, randao_partial, FlakyReconstruct, RecordingSubmitter,
    RunnerNode,
};
use qv_01_messages::PostConsensusMessage;
use qv_03_controller::test_utils::{decided, TestNode};
use qv_03_controller::ControllerConfig;
use shared_crypto::signing_root;
use shared_crypto::test_utils::TestCommittee;
use shared_types::{ErrorKind, Root};

const SLOT: Slot = 100;
const DATA: &[u8] = b"attestation data";

fn committee() -> TestCommittee {
    TestCommittee::new(4)
}

/// Operator 1 with a started duty at height 0.
async fn started(committee: &TestCommittee, config: RunnerConfig) -> RunnerNode {
    let node = RunnerNode::new(committee, 1, config);
    node.runner.start_duty(attester_duty(SLOT), DATA.to_vec()).await.unwrap();
    node
}

/// Decide `height` from the network and deliver the event to the runner.
async fn decide(node: &RunnerNode, committee: &TestCommittee, height: Height, slot: Slot) {
    let mut events = node.controller().subscribe_decided();
    let value = consensus_data(slot, DATA).encode().unwrap();
    node.controller()
        .process_decided(decided(committee, height, &value, &[2, 3, 4]))
        .await
        .unwrap();
    let event = events.try_recv().unwrap();
    node.runner.on_decided(&event).await.unwrap();
}

fn root() -> Root {
    consensus_data(SLOT, DATA).signing_root()
}

// =============================================================================
// Starting duties
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_start_duty_runs_consensus_on_encoded_input() {
    let committee = committee();
    let node = started(&committee, RunnerConfig::default()).await;

    assert_eq!(node.runner.status().await, Some((0, RunnerPhase::AwaitingConsensus)));
    assert!(node.controller().instance_status().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_second_duty_refused_while_consensus_runs() {
    let committee = committee();
    let node = started(&committee, RunnerConfig::default()).await;

    let err = node
        .runner
        .start_duty(attester_duty(SLOT + 50), DATA.to_vec())
        .await
        .unwrap_err();

    assert_eq!(err, RunnerError::ConsensusRunning { height: 0 });
}

#[tokio::test(start_paused = true)]
async fn test_duty_of_other_role_refused() {
    let committee = committee();
    let node = RunnerNode::new(&committee, 1, RunnerConfig::default());
    let mut duty = attester_duty(SLOT);
    duty.role = RoleType::Proposer;

    let err = node.runner.start_duty(duty, DATA.to_vec()).await.unwrap_err();

    assert!(matches!(err, RunnerError::WrongRole { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_input_never_reaches_consensus() {
    let committee = committee();
    let node = RunnerNode::new(&committee, 1, RunnerConfig::default());

    let err = node.runner.start_duty(attester_duty(SLOT), Vec::new()).await.unwrap_err();

    assert!(matches!(err, RunnerError::InvalidInput(_)));
    assert_eq!(node.controller().instance_status().await, None);
    assert_eq!(node.runner.status().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_collection_window_blocks_next_duty_until_timeout() {
    let committee = committee();
    let node = started(&committee, RunnerConfig::default()).await;
    decide(&node, &committee, 0, SLOT).await;

    let err = node.runner.can_start_new_duty(&attester_duty(SLOT + 32)).await.unwrap_err();
    assert_eq!(err, RunnerError::PostConsensusRunning { slot: SLOT });

    node.runner.can_start_new_duty(&attester_duty(SLOT + 33)).await.unwrap();
    let started = node
        .runner
        .start_duty(attester_duty(SLOT + 33), DATA.to_vec())
        .await
        .unwrap();
    assert_eq!(started, DutyStart::Consensus { height: 1 });
}

#[tokio::test(start_paused = true)]
async fn test_finished_duty_allows_next() {
    let committee = committee();
    let node = started(&committee, RunnerConfig::default()).await;
    decide(&node, &committee, 0, SLOT).await;
    for signer in [2, 3] {
        node.runner.process_post_consensus(partial(&committee, signer, 0, root())).await.unwrap();
    }

    node.runner.can_start_new_duty(&attester_duty(SLOT + 1)).await.unwrap();
}

// =============================================================================
// RANDAO pre-consensus
// =============================================================================

/// Operator 1 as proposer with RANDAO collection started at `SLOT`.
async fn proposing(committee: &TestCommittee) -> RunnerNode {
    let node = RunnerNode::proposer(committee, 1, RunnerConfig::default());
    let started = node.runner.start_duty(proposer_duty(SLOT), DATA.to_vec()).await.unwrap();
    assert_eq!(started, DutyStart::PreConsensus { slot: SLOT });
    node
}

#[tokio::test(start_paused = true)]
async fn test_proposer_duty_broadcasts_randao_partial_before_consensus() {
    let committee = committee();
    let node = proposing(&committee).await;

    let sent = node.network().sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].msg_type, SsvMsgType::PreConsensus);
    let msg = sent[0].pre_consensus_message().unwrap();
    assert_eq!(msg.signers, vec![1]);
    assert_eq!(msg.message.slot, SLOT);
    assert_eq!(msg.message.signing_root, proposer_duty(SLOT).randao_root());

    assert_eq!(node.runner.pre_consensus_signers().await, vec![1]);
    assert_eq!(node.runner.status().await, None);
    assert_eq!(node.controller().instance_status().await, None);
    assert!(node.producer.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_randao_quorum_builds_block_and_starts_consensus() {
    let committee = committee();
    let node = proposing(&committee).await;

    node.runner.process_pre_consensus(randao_partial(&committee, 2, SLOT)).await.unwrap();
    assert_eq!(node.runner.randao_reveal().await, None);
    node.runner.process_pre_consensus(randao_partial(&committee, 3, SLOT)).await.unwrap();

    let reveal = node.runner.randao_reveal().await.expect("reveal reconstructed");
    let message = signing_root(&proposer_duty(SLOT).randao_root(), &committee.domain, PRE_CONSENSUS_SIG_TYPE);
    shared_crypto::verify(&committee.validator_pk(), &message, &reveal).unwrap();
    assert_eq!(node.producer.calls(), vec![(SLOT, reveal)]);
    assert_eq!(node.runner.status().await, Some((0, RunnerPhase::AwaitingConsensus)));
    assert!(node.controller().instance_status().await.is_some());

    node.runner.process_pre_consensus(randao_partial(&committee, 4, SLOT)).await.unwrap();
    assert_eq!(node.producer.calls().len(), 1);
    assert_eq!(node.runner.pre_consensus_signers().await, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_decided_block_carries_reveal() {
    let committee = committee();
    let node = proposing(&committee).await;
    for signer in [2, 3] {
        node.runner.process_pre_consensus(randao_partial(&committee, signer, SLOT)).await.unwrap();
    }
    let reveal = node.runner.randao_reveal().await.unwrap();
    let mut block = DATA.to_vec();
    block.extend_from_slice(reveal.as_bytes());
    let value = ConsensusData {
        duty: proposer_duty(SLOT),
        data: block,
    };

    let mut events = node.controller().subscribe_decided();
    node.controller()
        .process_decided(decided(&committee, 0, &value.encode().unwrap(), &[2, 3, 4]))
        .await
        .unwrap();
    node.runner.on_decided(&events.try_recv().unwrap()).await.unwrap();

    assert_eq!(node.runner.status().await, Some((0, RunnerPhase::AwaitingPostConsensus)));
    assert_eq!(node.runner.collected_signers().await, vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_randao_partial_counted_once() {
    let committee = committee();
    let node = proposing(&committee).await;

    node.runner.process_pre_consensus(randao_partial(&committee, 2, SLOT)).await.unwrap();
    node.runner.process_pre_consensus(randao_partial(&committee, 2, SLOT)).await.unwrap();

    assert_eq!(node.runner.pre_consensus_signers().await, vec![1, 2]);
    assert_eq!(node.runner.randao_reveal().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_randao_collection_blocks_next_duty_until_timeout() {
    let committee = committee();
    let node = proposing(&committee).await;

    let err = node.runner.can_start_new_duty(&proposer_duty(SLOT + 32)).await.unwrap_err();
    assert_eq!(err, RunnerError::PreConsensusRunning { slot: SLOT });

    let started = node
        .runner
        .start_duty(proposer_duty(SLOT + 33), DATA.to_vec())
        .await
        .unwrap();
    assert_eq!(started, DutyStart::PreConsensus { slot: SLOT + 33 });
    assert_eq!(node.runner.pre_consensus_signers().await, vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_early_randao_partials_applied_at_start() {
    let committee = committee();
    let node = RunnerNode::proposer(&committee, 1, RunnerConfig::default());
    for signer in [2, 3] {
        node.runner.process_pre_consensus(randao_partial(&committee, signer, SLOT)).await.unwrap();
    }
    node.runner.process_pre_consensus(randao_partial(&committee, 4, SLOT + 1)).await.unwrap();

    node.runner.start_duty(proposer_duty(SLOT), DATA.to_vec()).await.unwrap();

    assert_eq!(node.runner.pre_consensus_signers().await, vec![1, 2, 3]);
    assert!(node.runner.randao_reveal().await.is_some());
    assert_eq!(node.runner.status().await, Some((0, RunnerPhase::AwaitingConsensus)));
}

#[tokio::test(start_paused = true)]
async fn test_randao_partial_for_past_slot_rejected() {
    let committee = committee();
    let node = proposing(&committee).await;

    let err = node
        .runner
        .process_pre_consensus(randao_partial(&committee, 2, SLOT - 1))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RunnerError::WrongSlot {
            expected: SLOT,
            actual: SLOT - 1
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_randao_partial_over_other_root_rejected() {
    let committee = committee();
    let node = proposing(&committee).await;
    let msg = SignedPreConsensusMessage::sign(
        SLOT,
        [9u8; 32],
        2,
        committee.key_manager_for(2).as_ref(),
        &committee.domain,
        &committee.share_pair(2).public_key(),
    )
    .unwrap();

    let err = node.runner.process_pre_consensus(msg).await.unwrap_err();

    assert_eq!(err, RunnerError::RootMismatch { signer: 2 });
    assert_eq!(node.runner.pre_consensus_signers().await, vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_proposer_without_block_producer_refused() {
    let committee = committee();
    let node = TestNode::new(&committee, 1, ControllerConfig::default());
    let runner = DutyRunner::new(
        RoleType::Proposer,
        RunnerConfig::default(),
        node.controller.clone(),
        committee.key_manager_for(1),
        Arc::new(ConsensusDataCheck {
            role: RoleType::Proposer,
        }),
        Arc::new(RecordingSubmitter::default()),
    );

    let err = runner.start_duty(proposer_duty(SLOT), DATA.to_vec()).await.unwrap_err();

    assert_eq!(err, RunnerError::NoBlockProducer);
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(node.network.sent_messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_attester_rejects_randao_partial() {
    let committee = committee();
    let node = started(&committee, RunnerConfig::default()).await;

    let err = node
        .runner
        .process_pre_consensus(randao_partial(&committee, 2, SLOT))
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::UnexpectedMessage(_)));
}

// =============================================================================
// Decision
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_decision_signs_and_broadcasts_partial() {
    let committee = committee();
    let node = started(&committee, RunnerConfig::default()).await;

    decide(&node, &committee, 0, SLOT).await;

    assert_eq!(node.runner.status().await, Some((0, RunnerPhase::AwaitingPostConsensus)));
    assert_eq!(node.runner.collected_signers().await, vec![1]);
    let sent = node.network().sent_messages();
    let post = sent
        .iter()
        .find(|m| m.msg_type == SsvMsgType::PostConsensus)
        .expect("partial broadcast");
    let msg = post.post_consensus_message().unwrap();
    assert_eq!(msg.signers, vec![1]);
    assert_eq!(msg.message.duty_signing_root, shared_crypto::sha256(DATA));
    msg.verify(&committee.domain, &committee.operators()).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_decision_for_other_height_ignored() {
    let committee = committee();
    let node = started(&committee, RunnerConfig::default()).await;

    let value = consensus_data(SLOT, DATA).encode().unwrap();
    let event = DecidedEvent {
        identifier: node.controller().identifier().clone(),
        height: 5,
        value: value.clone(),
        aggregated_commit: decided(&committee, 5, &value, &[2, 3, 4]),
    };
    node.runner.on_decided(&event).await.unwrap();

    assert_eq!(node.runner.status().await, Some((0, RunnerPhase::AwaitingConsensus)));
}

// =============================================================================
// Post-consensus
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_quorum_of_partials_reconstructs_and_late_duplicate_ignored() {
    let committee = committee();
    let node = started(&committee, RunnerConfig::default()).await;
    decide(&node, &committee, 0, SLOT).await;

    node.runner.process_post_consensus(partial(&committee, 2, 0, root())).await.unwrap();
    assert_eq!(node.runner.status().await, Some((0, RunnerPhase::AwaitingPostConsensus)));
    node.runner.process_post_consensus(partial(&committee, 3, 0, root())).await.unwrap();

    assert_eq!(node.runner.status().await, Some((0, RunnerPhase::Finished)));
    let submitted = node.submitter.submitted();
    assert_eq!(submitted.len(), 1);
    let signed = &submitted[0];
    assert_eq!(signed.duty, attester_duty(SLOT));
    let message = signing_root(&root(), &committee.domain, POST_CONSENSUS_SIG_TYPE);
    shared_crypto::verify(&committee.validator_pk(), &message, &signed.signature).unwrap();

    node.runner.process_post_consensus(partial(&committee, 4, 0, root())).await.unwrap();
    node.runner.process_post_consensus(partial(&committee, 2, 0, root())).await.unwrap();
    assert_eq!(node.submitter.submitted().len(), 1);
    assert_eq!(node.runner.collected_signers().await, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_signer_counted_once() {
    let committee = committee();
    let node = started(&committee, RunnerConfig::default()).await;
    decide(&node, &committee, 0, SLOT).await;

    node.runner.process_post_consensus(partial(&committee, 2, 0, root())).await.unwrap();
    node.runner.process_post_consensus(partial(&committee, 2, 0, root())).await.unwrap();

    assert_eq!(node.runner.collected_signers().await, vec![1, 2]);
    assert_eq!(node.runner.status().await, Some((0, RunnerPhase::AwaitingPostConsensus)));
}

#[tokio::test(start_paused = true)]
async fn test_partial_over_other_root_rejected() {
    let committee = committee();
    let node = started(&committee, RunnerConfig::default()).await;
    decide(&node, &committee, 0, SLOT).await;

    let err = node
        .runner
        .process_post_consensus(partial(&committee, 2, 0, [9u8; 32]))
        .await
        .unwrap_err();

    assert_eq!(err, RunnerError::RootMismatch { signer: 2 });
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
}

#[tokio::test(start_paused = true)]
async fn test_partial_signed_with_wrong_share_rejected() {
    let committee = committee();
    let node = started(&committee, RunnerConfig::default()).await;
    decide(&node, &committee, 0, SLOT).await;

    // operator 2 forwards a partial made with operator 3's share
    let forged = signing_root(&root(), &committee.domain, POST_CONSENSUS_SIG_TYPE);
    let message = PostConsensusMessage {
        height: 0,
        duty_signature: committee.share_pair(3).sign(&forged),
        duty_signing_root: root(),
        signers: vec![2],
    };
    let envelope_root = signing_root(&message.root().unwrap(), &committee.domain, POST_CONSENSUS_SIG_TYPE);
    let msg = SignedPostConsensusMessage {
        signature: committee.share_pair(2).sign(&envelope_root),
        message,
        signers: vec![2],
    };

    let err = node.runner.process_post_consensus(msg).await.unwrap_err();

    assert!(matches!(err, RunnerError::InvalidPartial { signer: 2, .. }));
    assert_eq!(node.runner.collected_signers().await, vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_envelope_signed_by_other_operator_rejected() {
    let committee = committee();
    let node = started(&committee, RunnerConfig::default()).await;
    decide(&node, &committee, 0, SLOT).await;
    let mut msg = partial(&committee, 2, 0, root());
    msg.signers = vec![3];
    msg.message.signers = vec![3];

    let err = node.runner.process_post_consensus(msg).await.unwrap_err();

    assert!(matches!(err, RunnerError::Message(_)));
}

#[tokio::test(start_paused = true)]
async fn test_partial_for_other_height_rejected() {
    let committee = committee();
    let node = started(&committee, RunnerConfig::default()).await;

    let err = node
        .runner
        .process_post_consensus(partial(&committee, 2, 3, root()))
        .await
        .unwrap_err();

    assert_eq!(err, RunnerError::WrongHeight { expected: 0, actual: 3 });
}

#[tokio::test(start_paused = true)]
async fn test_partial_without_duty_rejected() {
    let committee = committee();
    let node = RunnerNode::new(&committee, 1, RunnerConfig::default());

    let err = node
        .runner
        .process_post_consensus(partial(&committee, 2, 0, root()))
        .await
        .unwrap_err();

    assert_eq!(err, RunnerError::NoRunningDuty);
}

#[tokio::test(start_paused = true)]
async fn test_early_partials_applied_on_decision() {
    let committee = committee();
    let node = started(&committee, RunnerConfig::default()).await;

    for signer in [2, 3] {
        node.runner.process_post_consensus(partial(&committee, signer, 0, root())).await.unwrap();
    }
    assert_eq!(node.runner.status().await, Some((0, RunnerPhase::AwaitingConsensus)));
    assert!(node.submitter.submitted().is_empty());

    decide(&node, &committee, 0, SLOT).await;

    assert_eq!(node.runner.status().await, Some((0, RunnerPhase::Finished)));
    assert_eq!(node.submitter.submitted().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_early_buffer_bounded() {
    let committee = committee();
    let config = RunnerConfig {
        max_early_partials: 1,
        ..Default::default()
    };
    let node = started(&committee, config).await;

    node.runner.process_post_consensus(partial(&committee, 2, 0, root())).await.unwrap();
    let err = node
        .runner
        .process_post_consensus(partial(&committee, 3, 0, root()))
        .await
        .unwrap_err();

    assert_eq!(err, RunnerError::EarlyBufferFull);
}

#[tokio::test(start_paused = true)]
async fn test_reconstruction_failure_keeps_collecting() {
    let committee = committee();
    let signer = Arc::new(FlakyReconstruct::new(committee.key_manager_for(1), 1));
    let node = RunnerNode::with_signer(&committee, 1, RunnerConfig::default(), signer);
    node.runner.start_duty(attester_duty(SLOT), DATA.to_vec()).await.unwrap();
    decide(&node, &committee, 0, SLOT).await;

    node.runner.process_post_consensus(partial(&committee, 2, 0, root())).await.unwrap();
    let err = node
        .runner
        .process_post_consensus(partial(&committee, 3, 0, root()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Reconstruction);
    assert_eq!(node.runner.status().await, Some((0, RunnerPhase::AwaitingPostConsensus)));

    node.runner.process_post_consensus(partial(&committee, 4, 0, root())).await.unwrap();
    assert_eq!(node.runner.status().await, Some((0, RunnerPhase::Finished)));
    assert_eq!(node.submitter.submitted().len(), 1);
}

// =============================================================================
// Routing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_post_consensus_frame_routed() {
    let committee = committee();
    let node = started(&committee, RunnerConfig::default()).await;
    decide(&node, &committee, 0, SLOT).await;

    let envelope = SsvMessage::post_consensus(
        node.controller().identifier().clone(),
        &partial(&committee, 2, 0, root()),
    )
    .unwrap();
    let frame = node.controller().encode_frame(&envelope).unwrap();
    node.runner.process_frame(&frame).await.unwrap();

    assert_eq!(node.runner.collected_signers().await, vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_listener_delivers_decisions() {
    let committee = committee();
    let node = started(&committee, RunnerConfig::default()).await;
    let listener = tokio::spawn(node.runner.clone().listen_decided(node.controller().subscribe_decided()));

    let value = consensus_data(SLOT, DATA).encode().unwrap();
    node.controller()
        .process_decided(decided(&committee, 0, &value, &[2, 3, 4]))
        .await
        .unwrap();
    while node.runner.status().await != Some((0, RunnerPhase::AwaitingPostConsensus)) {
        tokio::task::yield_now().await;
    }

    assert_eq!(node.runner.collected_signers().await, vec![1]);
    listener.abort();
}

#[tokio::test(start_paused = true)]
async fn test_randao_frame_routed() {
    let committee = committee();
    let node = proposing(&committee).await;

    let envelope = SsvMessage::pre_consensus(
        node.controller().identifier().clone(),
        &randao_partial(&committee, 2, SLOT),
    )
    .unwrap();
    let frame = node.controller().encode_frame(&envelope).unwrap();
    node.runner.process_frame(&frame).await.unwrap();

    assert_eq!(node.runner.pre_consensus_signers().await, vec![1, 2]);
}
