//! # Instance Metrics
//!
//! Enable with the `metrics` feature:
//! ```toml
//! qv-02-instance = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `qbft_instances_decided_total` - Instances that reached a decision
//! - `qbft_round_changes_total` - Round changes (timeouts and partial-quorum jumps)
//! - `qbft_messages_rejected_total` - Rejected messages, labeled by type and reason

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref INSTANCES_DECIDED: IntCounter = register_int_counter!(
        "qbft_instances_decided_total",
        "Total number of QBFT instances decided"
    )
    .expect("Failed to create INSTANCES_DECIDED metric");

    pub static ref ROUND_CHANGES: IntCounterVec = register_int_counter_vec!(
        "qbft_round_changes_total",
        "Total number of round changes",
        &["trigger"]
    )
    .expect("Failed to create ROUND_CHANGES metric");

    pub static ref MESSAGES_REJECTED: IntCounterVec = register_int_counter_vec!(
        "qbft_messages_rejected_total",
        "Total number of rejected consensus messages",
        &["type", "reason"]
    )
    .expect("Failed to create MESSAGES_REJECTED metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

#[cfg(feature = "metrics")]
pub fn record_decided() {
    INSTANCES_DECIDED.inc();
}

/// `trigger` is `timeout` or `partial_quorum`.
#[cfg(feature = "metrics")]
pub fn record_round_change(trigger: &str) {
    ROUND_CHANGES.with_label_values(&[trigger]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_message_rejected(msg_type: &str, reason: &str) {
    MESSAGES_REJECTED.with_label_values(&[msg_type, reason]).inc();
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_decided() {}

#[cfg(not(feature = "metrics"))]
pub fn record_round_change(_trigger: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_message_rejected(_msg_type: &str, _reason: &str) {}
