//! Deterministic committees for tests.
//!
//! A trusted dealer splits a fixed validator key among operators `1..=n`
//! with the committee's strong quorum as threshold, so reconstructed
//! signatures verify against the validator key exactly as in production.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use shared_types::{BlsPublicKey, DomainType, Operator, OperatorId, Share};

use crate::bls::BlsKeyPair;
use crate::key_manager::SsvKeyManager;
use crate::threshold::split_secret_with_rng;

pub struct TestCommittee {
    pub validator: BlsKeyPair,
    pub shares: BTreeMap<OperatorId, BlsKeyPair>,
    pub domain: DomainType,
}

impl TestCommittee {
    /// Committee of `n` operators with ids `1..=n`.
    pub fn new(n: u64) -> Self {
        Self::with_seed(n, 42)
    }

    pub fn with_seed(n: u64, seed: u8) -> Self {
        let validator = BlsKeyPair::from_ikm(&[seed; 32]).expect("ikm is 32 bytes");
        let ids: Vec<OperatorId> = (1..=n).collect();
        let threshold = (2 * n as usize + 1).div_ceil(3);
        let mut rng = StdRng::seed_from_u64(u64::from(seed));
        let shares = split_secret_with_rng(&mut rng, &validator.secret(), &ids, threshold)
            .expect("valid split")
            .into_iter()
            .map(|(id, sk)| (id, BlsKeyPair::from_secret(&sk).expect("valid share")))
            .collect();
        Self {
            validator,
            shares,
            domain: DomainType::primus_testnet(),
        }
    }

    pub fn validator_pk(&self) -> BlsPublicKey {
        self.validator.public_key()
    }

    pub fn operators(&self) -> Vec<Operator> {
        self.shares
            .iter()
            .map(|(id, pair)| Operator {
                id: *id,
                public_key: pair.public_key(),
            })
            .collect()
    }

    /// Committee descriptor as seen by `operator_id`.
    pub fn share_for(&self, operator_id: OperatorId) -> Share {
        Share::new(
            operator_id,
            self.validator_pk(),
            self.operators(),
            self.domain.clone(),
        )
        .expect("operator is in committee")
    }

    /// Key manager holding only `operator_id`'s share secret.
    pub fn key_manager_for(&self, operator_id: OperatorId) -> Arc<SsvKeyManager> {
        let km = SsvKeyManager::new();
        km.add_share_key(self.shares[&operator_id].secret())
            .expect("valid share");
        Arc::new(km)
    }

    pub fn share_pair(&self, operator_id: OperatorId) -> &BlsKeyPair {
        &self.shares[&operator_id]
    }
}
