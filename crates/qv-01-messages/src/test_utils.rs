//! Message builders signed with real share keys.

use shared_crypto::test_utils::TestCommittee;
use shared_crypto::{aggregate_signatures, signing_root};
use shared_types::{Identifier, OperatorId, RoleType, QBFT_SIG_TYPE};

use crate::domain::{Message, SignedMessage};

/// Attester pipeline identifier of the committee's validator.
pub fn identifier(committee: &TestCommittee) -> Identifier {
    Identifier::new(&committee.validator_pk(), RoleType::Attester)
}

/// `msg` signed by a single operator.
pub fn signed(committee: &TestCommittee, signer: OperatorId, msg: Message) -> SignedMessage {
    let root = signing_root(&msg.root().expect("encodable"), &committee.domain, QBFT_SIG_TYPE);
    let signature = committee.share_pair(signer).sign(&root);
    SignedMessage::new(msg, signature, vec![signer])
}

/// `msg` signed by every operator in `signers`, aggregated.
pub fn multi_signed(committee: &TestCommittee, signers: &[OperatorId], msg: Message) -> SignedMessage {
    let root = signing_root(&msg.root().expect("encodable"), &committee.domain, QBFT_SIG_TYPE);
    let signatures: Vec<_> = signers
        .iter()
        .map(|id| committee.share_pair(*id).sign(&root))
        .collect();
    let signature = aggregate_signatures(&signatures).expect("non-empty");
    SignedMessage::new(msg, signature, signers.to_vec())
}
