//! Node runtime errors

use qv_03_controller::{ControllerError, KvStoreError};
use qv_04_duty_runner::{RunnerError, Slot};
use shared_crypto::CryptoError;
use shared_types::{OperatorId, TypesError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Key dealing failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Invalid committee: {0}")]
    Committee(#[from] TypesError),

    #[error("Storage error: {0}")]
    Storage(#[from] KvStoreError),

    #[error("Controller error: {0}")]
    Controller(#[from] ControllerError),

    #[error("Operator {operator} could not start the duty: {source}")]
    DutyStart {
        operator: OperatorId,
        source: RunnerError,
    },

    #[error("Duty at slot {slot} timed out with submissions from {submitted:?}")]
    DutyTimeout { slot: Slot, submitted: Vec<OperatorId> },

    #[error("Reconstructed signature for slot {slot} from operator {operator} does not verify")]
    BadSubmission { slot: Slot, operator: OperatorId },

    #[error("Unknown operator {0}")]
    UnknownOperator(OperatorId),
}

pub type NodeResult<T> = Result<T, NodeError>;
