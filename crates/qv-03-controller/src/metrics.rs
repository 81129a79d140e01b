//! # Controller Metrics
//!
//! Enable with the `metrics` feature.
//!
//! ## Metrics Exported
//!
//! - `qbft_decided_persisted_total` - Decided messages written, by source
//! - `qbft_sync_requests_total` - Sync requests sent, by result
//! - `qbft_storage_failures_total` - Decided writes that failed after retries
//! - `qbft_highest_decided` - Highest decided height

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter, IntCounterVec,
    IntGauge,
};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref DECIDED_PERSISTED: IntCounterVec = register_int_counter_vec!(
        "qbft_decided_persisted_total",
        "Total number of decided messages persisted",
        &["source"]
    )
    .expect("Failed to create DECIDED_PERSISTED metric");

    pub static ref SYNC_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "qbft_sync_requests_total",
        "Total number of decided sync requests",
        &["result"]
    )
    .expect("Failed to create SYNC_REQUESTS metric");

    pub static ref STORAGE_FAILURES: IntCounter = register_int_counter!(
        "qbft_storage_failures_total",
        "Total number of decided writes failed after retries"
    )
    .expect("Failed to create STORAGE_FAILURES metric");

    pub static ref HIGHEST_DECIDED: IntGauge = register_int_gauge!(
        "qbft_highest_decided",
        "Highest decided height"
    )
    .expect("Failed to create HIGHEST_DECIDED metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

/// `source` is `local`, `network` or `sync`.
#[cfg(feature = "metrics")]
pub fn record_decided_persisted(source: &str) {
    DECIDED_PERSISTED.with_label_values(&[source]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_sync_request(result: &str) {
    SYNC_REQUESTS.with_label_values(&[result]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_storage_failure() {
    STORAGE_FAILURES.inc();
}

#[cfg(feature = "metrics")]
pub fn set_highest_decided(height: u64) {
    HIGHEST_DECIDED.set(height as i64);
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_decided_persisted(_source: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_sync_request(_result: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_storage_failure() {}

#[cfg(not(feature = "metrics"))]
pub fn set_highest_decided(_height: u64) {}
