//! Prometheus metrics for the relayer
//!
//! Exposed on the /metrics endpoint for scraping.

#![allow(dead_code)]

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec,
};

lazy_static! {
    // Block processing metrics
    pub static ref BLOCKS_PROCESSED: CounterVec = register_counter_vec!(
        "relayer_blocks_processed_total",
        "Total number of blocks processed",
        &["chain"]
    ).unwrap();

    pub static ref LATEST_BLOCK: GaugeVec = register_gauge_vec!(
        "relayer_latest_block",
        "Latest block number processed",
        &["chain"]
    ).unwrap();

    // Relay pipeline metrics
    pub static ref EVENTS_OBSERVED: CounterVec = register_counter_vec!(
        "relayer_events_observed_total",
        "Total number of bridge events recorded",
        &["chain", "kind"]
    ).unwrap();

    pub static ref ACTIONS_CLAIMED: CounterVec = register_counter_vec!(
        "relayer_actions_claimed_total",
        "Total number of counter-chain actions claimed",
        &["kind"]
    ).unwrap();

    pub static ref SUBMISSIONS: CounterVec = register_counter_vec!(
        "relayer_submissions_total",
        "Total number of transaction submissions",
        &["chain", "status"]
    ).unwrap();

    pub static ref CONFIRMATIONS: CounterVec = register_counter_vec!(
        "relayer_confirmations_total",
        "Total number of actions reaching confirmed state",
        &["chain"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS: CounterVec = register_counter_vec!(
        "relayer_errors_total",
        "Total number of errors",
        &["chain", "type"]
    ).unwrap();

    pub static ref CONSECUTIVE_FAILURES: GaugeVec = register_gauge_vec!(
        "relayer_consecutive_failures",
        "Number of consecutive failures (circuit breaker)",
        &["chain"]
    ).unwrap();

    // Health metrics
    pub static ref UP: Gauge = register_gauge!(
        "relayer_up",
        "Whether the relayer is up and running"
    ).unwrap();
}

/// Record a block processed
pub fn record_block_processed(chain: &str, block_number: u64) {
    BLOCKS_PROCESSED.with_label_values(&[chain]).inc();
    LATEST_BLOCK
        .with_label_values(&[chain])
        .set(block_number as f64);
}

/// Record a bridge event recorded in the event log
pub fn record_event_observed(chain: &str, kind: &str) {
    EVENTS_OBSERVED.with_label_values(&[chain, kind]).inc();
}

/// Record a freshly claimed action
pub fn record_action_claimed(kind: &str) {
    ACTIONS_CLAIMED.with_label_values(&[kind]).inc();
}

/// Record a submission attempt
pub fn record_submission(chain: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    SUBMISSIONS.with_label_values(&[chain, status]).inc();
}

/// Record an action reaching Confirmed
pub fn record_confirmation(chain: &str) {
    CONFIRMATIONS.with_label_values(&[chain]).inc();
}

/// Record an error
pub fn record_error(chain: &str, error_type: &str) {
    ERRORS.with_label_values(&[chain, error_type]).inc();
}

/// Update consecutive failures (circuit breaker)
pub fn set_consecutive_failures(chain: &str, count: u32) {
    CONSECUTIVE_FAILURES
        .with_label_values(&[chain])
        .set(count as f64);
}
