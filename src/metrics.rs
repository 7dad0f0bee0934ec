// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the CloudStack load balancer controller.
//!
//! All metrics carry the namespace prefix `cloudstack_lb_`.
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Ensure/Update/Delete operations and their outcomes
//! - **Cloud API Metrics** - CloudStack API calls by command and outcome
//! - **Remote Resource Metrics** - Load balancer rules, firewall rules and IPs
//!   created, updated and deleted
//! - **Error Metrics** - Failures by error type
//!
//! # Example
//!
//! ```rust,no_run
//! use cloudstack_lb::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success("ensure", std::time::Duration::from_secs(1));
//! ```

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all controller metrics
const METRICS_NAMESPACE: &str = "cloudstack_lb";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliations by operation and status
///
/// Labels:
/// - `operation`: `get`, `ensure`, `update` or `delete`
/// - `status`: `success` or `error`
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of load balancer reconciliations by operation and status",
    );
    let counter = CounterVec::new(opts, &["operation", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliations in seconds
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of load balancer reconciliations in seconds by operation",
    )
    .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 300.0]);
    let histogram = HistogramVec::new(opts, &["operation"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Cloud API Metrics
// ============================================================================

/// Total number of CloudStack API calls by command and outcome
///
/// Retries of one logical call are counted once.
pub static CLOUD_API_CALLS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_cloud_api_calls_total"),
        "Total number of CloudStack API calls by command and outcome",
    );
    let counter = CounterVec::new(opts, &["command", "outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of CloudStack API calls in seconds, including retries
pub static CLOUD_API_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_cloud_api_duration_seconds"),
        "Duration of CloudStack API calls in seconds by command",
    )
    .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]);
    let histogram = HistogramVec::new(opts, &["command"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Remote Resource Metrics
// ============================================================================

/// Total number of remote mutations by resource kind and action
///
/// Labels:
/// - `resource`: `load_balancer_rule`, `firewall_rule`, `public_ip`, `rule_assignment`
/// - `action`: `create`, `update`, `delete`, `assign`, `remove`
pub static REMOTE_MUTATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_remote_mutations_total"),
        "Total number of CloudStack resource mutations by resource and action",
    );
    let counter = CounterVec::new(opts, &["resource", "action"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of errors by operation and error type
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of errors by operation and error type",
    );
    let counter = CounterVec::new(opts, &["operation", "error_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a successful reconciliation
///
/// # Arguments
/// * `operation` - `get`, `ensure`, `update` or `delete`
/// * `duration` - Duration of the reconciliation
pub fn record_reconciliation_success(operation: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[operation, "success"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration.as_secs_f64());
}

/// Record a failed reconciliation
///
/// # Arguments
/// * `operation` - `get`, `ensure`, `update` or `delete`
/// * `duration` - Duration of the reconciliation before failure
/// * `error_type` - Category of error (see `LoadBalancerError::error_type`)
pub fn record_reconciliation_error(operation: &str, duration: Duration, error_type: &str) {
    RECONCILIATION_TOTAL
        .with_label_values(&[operation, "error"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration.as_secs_f64());
    ERRORS_TOTAL
        .with_label_values(&[operation, error_type])
        .inc();
}

/// Record one logical CloudStack API call
pub fn record_cloud_api_call(command: &str, outcome: &str, duration: Duration) {
    CLOUD_API_CALLS_TOTAL
        .with_label_values(&[command, outcome])
        .inc();
    CLOUD_API_DURATION_SECONDS
        .with_label_values(&[command])
        .observe(duration.as_secs_f64());
}

/// Record a mutation of a CloudStack resource
pub fn record_remote_mutation(resource: &str, action: &str) {
    REMOTE_MUTATIONS_TOTAL
        .with_label_values(&[resource, action])
        .inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
