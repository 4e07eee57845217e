//! Prometheus metrics for occupancy-service.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

/// Recorder behind the `metrics` macros used by the HTTP middleware.
static HTTP_METRICS: OnceLock<PrometheusHandle> = OnceLock::new();

/// Occupations booked, by outcome.
pub static OCCUPATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "occupancy_occupations_total",
        "Occupation lifecycle events",
        &["event"] // booked, activated, notice, closed
    )
    .expect("Failed to register occupations_total")
});

/// Invoices posted by type.
pub static INVOICES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "occupancy_invoices_total",
        "Total number of invoices posted",
        &["invoice_type"]
    )
    .expect("Failed to register invoices_total")
});

/// Ledger entries appended by direction.
pub static LEDGER_ENTRIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "occupancy_ledger_entries_total",
        "Total number of ledger entries appended",
        &["type"]
    )
    .expect("Failed to register ledger_entries_total")
});

/// Appends that lost the sequence race and were retried.
pub static LEDGER_APPEND_CONFLICTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "occupancy_ledger_append_conflicts_total",
        "Ledger appends that collided on the occupation sequence",
        &["type"]
    )
    .expect("Failed to register ledger_append_conflicts")
});

/// Receipts and payment claim outcomes.
pub static PAYMENT_CLAIMS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "occupancy_payment_claims_total",
        "Payment claim attempts by outcome",
        &["outcome"] // claimed, already_used, race_lost
    )
    .expect("Failed to register payment_claims_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "occupancy_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "occupancy_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization) and install the HTTP
/// metrics recorder once per process.
pub fn init_metrics() {
    if HTTP_METRICS.get().is_none() {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = HTTP_METRICS.set(handle);
            }
            Err(e) => tracing::warn!(error = %e, "HTTP metrics recorder not installed"),
        }
    }

    Lazy::force(&OCCUPATIONS_TOTAL);
    Lazy::force(&INVOICES_TOTAL);
    Lazy::force(&LEDGER_ENTRIES_TOTAL);
    Lazy::force(&LEDGER_APPEND_CONFLICTS);
    Lazy::force(&PAYMENT_CLAIMS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = HTTP_METRICS
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    output.push_str(&encoder.encode_to_string(&metric_families).unwrap_or_default());
    output
}
