//! # Duty Runner Metrics
//!
//! Enable with the `metrics` feature.
//!
//! ## Metrics Exported
//!
//! - `ssv_duties_started_total` - Duties that started consensus, by role
//! - `ssv_post_consensus_messages_total` - Partial signatures, by outcome
//! - `ssv_pre_consensus_messages_total` - RANDAO partial signatures, by outcome
//! - `ssv_reconstructions_total` - Signature reconstructions, by result

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter_vec, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref DUTIES_STARTED: IntCounterVec = register_int_counter_vec!(
        "ssv_duties_started_total",
        "Total number of duties that started consensus",
        &["role"]
    )
    .expect("Failed to create DUTIES_STARTED metric");

    pub static ref POST_CONSENSUS_MESSAGES: IntCounterVec = register_int_counter_vec!(
        "ssv_post_consensus_messages_total",
        "Total number of post-consensus partial signatures",
        &["outcome"]
    )
    .expect("Failed to create POST_CONSENSUS_MESSAGES metric");

    pub static ref PRE_CONSENSUS_MESSAGES: IntCounterVec = register_int_counter_vec!(
        "ssv_pre_consensus_messages_total",
        "Total number of pre-consensus partial signatures",
        &["outcome"]
    )
    .expect("Failed to create PRE_CONSENSUS_MESSAGES metric");

    pub static ref RECONSTRUCTIONS: IntCounterVec = register_int_counter_vec!(
        "ssv_reconstructions_total",
        "Total number of signature reconstructions",
        &["result"]
    )
    .expect("Failed to create RECONSTRUCTIONS metric");
}

#[cfg(feature = "metrics")]
pub fn record_duty_started(role: &str) {
    DUTIES_STARTED.with_label_values(&[role]).inc();
}

/// `outcome` is `accepted`, `duplicate`, `early`, `late` or `rejected`.
#[cfg(feature = "metrics")]
pub fn record_post_consensus(outcome: &str) {
    POST_CONSENSUS_MESSAGES.with_label_values(&[outcome]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_pre_consensus(outcome: &str) {
    PRE_CONSENSUS_MESSAGES.with_label_values(&[outcome]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_reconstruction(result: &str) {
    RECONSTRUCTIONS.with_label_values(&[result]).inc();
}

#[cfg(not(feature = "metrics"))]
pub fn record_duty_started(_role: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_post_consensus(_outcome: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_pre_consensus(_outcome: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_reconstruction(_result: &str) {}
