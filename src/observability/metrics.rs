//! # Metrics
//!
//! Prometheus metrics for the secret store clients and the lifecycle provider.
//!
//! ## Metrics Exposed
//!
//! - `kvsecret_store_operations_total` - Store calls by operation
//! - `kvsecret_store_operation_errors_total` - Failed store calls by operation
//! - `kvsecret_store_operation_duration_seconds` - Duration of store calls
//! - `kvsecret_provider_operations_total` - Provider contract calls by operation and outcome
//! - `kvsecret_recoveries_total` - Soft-deleted secrets recovered before a write
//! - `kvsecret_best_effort_delete_failures_total` - Swallowed delete failures

use anyhow::Result;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static REGISTER: Once = Once::new();

static STORE_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "kvsecret_store_operations_total",
            "Total number of secret store operations",
        ),
        &["operation"],
    )
    .expect("Failed to create STORE_OPERATIONS_TOTAL metric - this should never happen")
});

static STORE_OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "kvsecret_store_operation_errors_total",
            "Total number of failed secret store operations",
        ),
        &["operation"],
    )
    .expect("Failed to create STORE_OPERATION_ERRORS_TOTAL metric - this should never happen")
});

static STORE_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "kvsecret_store_operation_duration_seconds",
            "Duration of secret store operations in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["operation"],
    )
    .expect("Failed to create STORE_OPERATION_DURATION metric - this should never happen")
});

static PROVIDER_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "kvsecret_provider_operations_total",
            "Total number of provider contract operations",
        ),
        &["operation", "outcome"],
    )
    .expect("Failed to create PROVIDER_OPERATIONS_TOTAL metric - this should never happen")
});

static RECOVERIES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "kvsecret_recoveries_total",
        "Total number of soft-deleted secrets recovered before a write",
    )
    .expect("Failed to create RECOVERIES_TOTAL metric - this should never happen")
});

static BEST_EFFORT_DELETE_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "kvsecret_best_effort_delete_failures_total",
        "Total number of delete failures that were logged and swallowed",
    )
    .expect("Failed to create BEST_EFFORT_DELETE_FAILURES_TOTAL metric - this should never happen")
});

/// Register all metrics with the crate registry
///
/// Safe to call more than once; only the first call registers.
pub fn register_metrics() -> Result<()> {
    let mut result = Ok(());
    REGISTER.call_once(|| {
        result = register_all();
    });
    result
}

fn register_all() -> Result<()> {
    REGISTRY.register(Box::new(STORE_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_OPERATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECOVERIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BEST_EFFORT_DELETE_FAILURES_TOTAL.clone()))?;
    Ok(())
}

/// Record a completed store call
pub fn record_store_operation(operation: &str, duration: f64) {
    STORE_OPERATIONS_TOTAL.with_label_values(&[operation]).inc();
    STORE_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration);
}

pub fn increment_store_operation_errors(operation: &str) {
    STORE_OPERATION_ERRORS_TOTAL
        .with_label_values(&[operation])
        .inc();
}

/// Record a provider contract call (`outcome` is e.g. "ok", "error", "frozen")
pub fn record_provider_operation(operation: &str, outcome: &str) {
    PROVIDER_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

pub fn increment_recoveries() {
    RECOVERIES_TOTAL.inc();
}

pub fn increment_best_effort_delete_failures() {
    BEST_EFFORT_DELETE_FAILURES_TOTAL.inc();
}

/// Render the registry in the Prometheus text exposition format
pub fn gather_text() -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
