//! Trusted-dealer committee generation

use std::collections::BTreeMap;
use std::sync::Arc;

use shared_crypto::{split_secret, BlsKeyPair, BlsSecretKey, SsvKeyManager};
use shared_types::{BlsPublicKey, DomainType, Operator, OperatorId, Share};
use tracing::info;

use crate::error::{NodeError, NodeResult};

/// A fresh validator key split among operators `1..=n`.
pub struct DealtCommittee {
    validator_public_key: BlsPublicKey,
    operators: Vec<Operator>,
    secrets: BTreeMap<OperatorId, BlsSecretKey>,
    domain: DomainType,
}

impl DealtCommittee {
    pub fn deal(size: u64, domain: DomainType) -> NodeResult<Self> {
        let validator = BlsKeyPair::generate()?;
        let ids: Vec<OperatorId> = (1..=size).collect();
        // strong quorum of the committee
        let threshold = (2 * ids.len() + 1).div_ceil(3);
        let secrets = split_secret(&validator.secret(), &ids, threshold)?;

        let mut operators = Vec::with_capacity(secrets.len());
        for (id, secret) in &secrets {
            operators.push(Operator {
                id: *id,
                public_key: BlsKeyPair::from_secret(secret)?.public_key(),
            });
        }
        info!(
            validator = %hex::encode(validator.public_key()),
            operators = size,
            threshold,
            "Dealt validator key"
        );
        Ok(Self {
            validator_public_key: validator.public_key(),
            operators,
            secrets,
            domain,
        })
    }

    pub fn validator_public_key(&self) -> &BlsPublicKey {
        &self.validator_public_key
    }

    pub fn domain(&self) -> &DomainType {
        &self.domain
    }

    pub fn operator_ids(&self) -> Vec<OperatorId> {
        self.operators.iter().map(|op| op.id).collect()
    }

    /// Committee descriptor as seen by `operator_id`.
    pub fn share_for(&self, operator_id: OperatorId) -> NodeResult<Share> {
        Ok(Share::new(
            operator_id,
            self.validator_public_key,
            self.operators.clone(),
            self.domain.clone(),
        )?)
    }

    /// Key manager holding only `operator_id`'s share secret.
    pub fn key_manager_for(&self, operator_id: OperatorId) -> NodeResult<Arc<SsvKeyManager>> {
        let secret = self
            .secrets
            .get(&operator_id)
            .ok_or(NodeError::UnknownOperator(operator_id))?;
        let km = SsvKeyManager::new();
        km.add_share_key(secret.clone())?;
        Ok(Arc::new(km))
    }
}
