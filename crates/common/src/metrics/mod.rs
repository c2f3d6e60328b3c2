//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with fixed histogram buckets
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all QueryForge metrics
pub const METRICS_PREFIX: &str = "queryforge";

/// Histogram buckets for HTTP and query latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Buckets for model latency (remote generation is slower)
pub const MODEL_BUCKETS: &[f64] = &[
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Query metrics
    describe_counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total natural-language queries by operation and outcome"
    );

    describe_histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end query latency in seconds"
    );

    describe_gauge!(
        format!("{}_query_documents", METRICS_PREFIX),
        Unit::Count,
        "Number of documents returned by the last query"
    );

    // Model metrics
    describe_counter!(
        format!("{}_model_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total language model requests"
    );

    describe_histogram!(
        format!("{}_model_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Language model latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record query metrics
pub fn record_query(duration_secs: f64, operation: &str, outcome: &str, document_count: usize) {
    counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        "operation" => operation.to_string()
    )
    .record(duration_secs);

    gauge!(format!("{}_query_documents", METRICS_PREFIX)).set(document_count as f64);
}

/// Helper to record model metrics
pub fn record_model_request(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_model_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_model_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_sorted(buckets: &[f64]) {
        let mut prev = 0.0;
        for &bucket in buckets {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_buckets_are_sorted() {
        assert_sorted(LATENCY_BUCKETS);
        assert_sorted(MODEL_BUCKETS);

        // Model timeout default (30s) should fall inside the tables
        assert!(LATENCY_BUCKETS.contains(&30.0));
        assert!(MODEL_BUCKETS.contains(&30.0));
    }

    #[test]
    fn test_recorders_run_without_exporter() {
        let metrics = RequestMetrics::start("POST", "/v1/query");
        metrics.finish(200);

        record_query(0.01, "find", "documents", 3);
        record_model_request(0.2, "mock-model", true);
        record_model_request(0.2, "mock-model", false);
    }
}
