// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the kore controllers.
//!
//! Every metric is prefixed `kore_appvia_io_` and lives in [`METRICS_REGISTRY`],
//! which the `/metrics` endpoint encodes.
//!
//! | Metric | Labels |
//! |---|---|
//! | `reconciliations_total` | `resource_type`, `status` |
//! | `reconciliation_duration_seconds` | `resource_type` |
//! | `requeues_total` | `resource_type`, `reason` |
//! | `errors_total` | `resource_type`, `reason` |
//! | `stage_failures_total` | `stage`, `reason` |
//! | `cluster_propagations_total` | `outcome` |
//! | `provider_operations_total` | `service`, `operation`, `outcome` |
//! | `provider_operation_duration_seconds` | `service` |
//!
//! # Example
//!
//! ```rust,no_run
//! use kore::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success("ProjectClaim", std::time::Duration::from_secs(1));
//! ```

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

/// Prometheus-safe form of "kore.appvia.io"
const METRICS_NAMESPACE: &str = "kore_appvia_io";

/// Project claims wait on long-running operations, so passes can take minutes
const RECONCILE_BUCKETS: &[f64] = &[
    0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0,
];

const PROVIDER_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Registry exposed on `/metrics`.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn counter(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let opts = Opts::new(format!("{METRICS_NAMESPACE}_{name}"), help);
    let counter = CounterVec::new(opts, labels).unwrap();
    METRICS_REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
}

fn histogram(name: &str, help: &str, labels: &[&str], buckets: &[f64]) -> HistogramVec {
    let opts = HistogramOpts::new(format!("{METRICS_NAMESPACE}_{name}"), help)
        .buckets(buckets.to_vec());
    let histogram = HistogramVec::new(opts, labels).unwrap();
    METRICS_REGISTRY.register(Box::new(histogram.clone())).unwrap();
    histogram
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Reconcile passes by kind and outcome (`success`, `error`, `requeue`).
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter(
        "reconciliations_total",
        "Total number of reconciliations by resource type and status",
        &["resource_type", "status"],
    )
});

pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    histogram(
        "reconciliation_duration_seconds",
        "Duration of reconciliations in seconds by resource type",
        &["resource_type"],
        RECONCILE_BUCKETS,
    )
});

/// Failed passes requeued by the driver, by error reason.
pub static REQUEUE_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter(
        "requeues_total",
        "Total number of requeue operations by resource type and reason",
        &["resource_type", "reason"],
    )
});

pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter(
        "errors_total",
        "Total number of errors by resource type and reason",
        &["resource_type", "reason"],
    )
});

/// Stages recorded as failed, e.g. `billing` with `ProviderError`.
pub static STAGE_FAILURES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter(
        "stage_failures_total",
        "Total number of failed provisioning stages by stage and reason",
        &["stage", "reason"],
    )
});

/// Per-cluster results of role propagation (`created`, `updated`, `unchanged`, `failed`).
pub static CLUSTER_PROPAGATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter(
        "cluster_propagations_total",
        "Total number of ClusterRole applications to downstream clusters by outcome",
        &["outcome"],
    )
});

// ============================================================================
// Provider
// ============================================================================

pub static PROVIDER_OPERATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter(
        "provider_operations_total",
        "Total number of cloud provider API calls by service, operation and outcome",
        &["service", "operation", "outcome"],
    )
});

pub static PROVIDER_OPERATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    histogram(
        "provider_operation_duration_seconds",
        "Latency of cloud provider API calls in seconds by service",
        &["service"],
        PROVIDER_BUCKETS,
    )
});

// ============================================================================
// Recording Helpers
// ============================================================================

fn record_reconciliation(resource_type: &str, status: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, status])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

pub fn record_reconciliation_success(resource_type: &str, duration: Duration) {
    record_reconciliation(resource_type, "success", duration);
}

/// A pass that returned an error to the controller's error policy.
pub fn record_reconciliation_error(resource_type: &str, duration: Duration) {
    record_reconciliation(resource_type, "error", duration);
}

pub fn record_reconciliation_requeue(resource_type: &str, reason: &str) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "requeue"])
        .inc();
    REQUEUE_TOTAL.with_label_values(&[resource_type, reason]).inc();
}

pub fn record_error(resource_type: &str, reason: &str) {
    ERRORS_TOTAL.with_label_values(&[resource_type, reason]).inc();
}

pub fn record_stage_failure(stage: &str, reason: &str) {
    STAGE_FAILURES_TOTAL.with_label_values(&[stage, reason]).inc();
}

pub fn record_cluster_propagation(outcome: &str) {
    CLUSTER_PROPAGATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_provider_operation(
    service: &str,
    operation: &str,
    success: bool,
    duration: Duration,
) {
    let outcome = if success { "success" } else { "error" };
    PROVIDER_OPERATIONS_TOTAL
        .with_label_values(&[service, operation, outcome])
        .inc();
    PROVIDER_OPERATION_DURATION_SECONDS
        .with_label_values(&[service])
        .observe(duration.as_secs_f64());
}

/// Encode the registry in the Prometheus text format.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&METRICS_REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
