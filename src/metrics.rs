//! Prometheus metrics, registered once on the default registry and exposed
//! through [`render`] on the metrics endpoint.

use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Encoder as _, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, TextEncoder,
};
use std::sync::LazyLock;

/// The ingress metrics. We use a lazy lock here to make sure they're globally accessible and
/// initialized only once.
pub(crate) static INGRESS_METRICS: LazyLock<IngressMetrics> = LazyLock::new(IngressMetrics::new);

/// Global forwarder metrics, labeled per relay target.
pub(crate) static FORWARDER_METRICS: LazyLock<ForwarderMetrics> =
    LazyLock::new(ForwarderMetrics::new);

#[derive(Debug)]
pub(crate) struct IngressMetrics {
    /// The total number of bundles received.
    pub bundles_received: IntCounter,
    /// The total number of requests rejected by authentication, per reason.
    pub auth_failures: IntCounterVec,
    /// The total number of requests rate limited, per tier.
    pub requests_rate_limited: IntCounterVec,
    /// The total number of replayed signed requests.
    pub duplicate_requests: IntCounter,
    /// The total number of JSON-RPC parsing errors.
    pub json_rpc_parse_errors: IntCounter,
    /// The total number of JSON-RPC requests for unknown methods.
    pub json_rpc_unknown_method: IntCounterVec,
    /// The total number of bundles failing shape validation or decoding.
    pub validation_errors: IntCounter,
    /// The total number of bundles rejected by policy, per reason.
    pub policy_rejections: IntCounterVec,
    /// The current number of tracked rate-limit entities.
    pub entity_count: IntGauge,
    /// The duration of RPC request handling in seconds.
    pub rpc_request_duration: HistogramVec,
}

impl IngressMetrics {
    fn new() -> Self {
        Self {
            bundles_received: register_int_counter!(
                "bundleproxy_ingress_bundles_received_total",
                "Total number of bundles received"
            )
            .expect("metric registration"),
            auth_failures: register_int_counter_vec!(
                "bundleproxy_ingress_auth_failures_total",
                "Total number of authentication failures",
                &["reason"]
            )
            .expect("metric registration"),
            requests_rate_limited: register_int_counter_vec!(
                "bundleproxy_ingress_requests_rate_limited_total",
                "Total number of rate limited requests",
                &["tier"]
            )
            .expect("metric registration"),
            duplicate_requests: register_int_counter!(
                "bundleproxy_ingress_duplicate_requests_total",
                "Total number of replayed signed requests"
            )
            .expect("metric registration"),
            json_rpc_parse_errors: register_int_counter!(
                "bundleproxy_ingress_json_rpc_parse_errors_total",
                "Total number of JSON-RPC parse errors"
            )
            .expect("metric registration"),
            json_rpc_unknown_method: register_int_counter_vec!(
                "bundleproxy_ingress_json_rpc_unknown_method_total",
                "Total number of JSON-RPC requests for unknown methods",
                &["method"]
            )
            .expect("metric registration"),
            validation_errors: register_int_counter!(
                "bundleproxy_ingress_validation_errors_total",
                "Total number of bundle validation errors"
            )
            .expect("metric registration"),
            policy_rejections: register_int_counter_vec!(
                "bundleproxy_ingress_policy_rejections_total",
                "Total number of bundles rejected by admission policy",
                &["reason"]
            )
            .expect("metric registration"),
            entity_count: register_int_gauge!(
                "bundleproxy_ingress_entity_count",
                "Current number of tracked rate-limit entities"
            )
            .expect("metric registration"),
            rpc_request_duration: register_histogram_vec!(
                "bundleproxy_ingress_rpc_request_duration_seconds",
                "Duration of RPC request handling",
                &["method"]
            )
            .expect("metric registration"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ForwarderMetrics {
    /// The total number of HTTP connection failures, per relay.
    pub http_connect_failures: IntCounterVec,
    /// The total number of HTTP call failures, per relay.
    pub http_call_failures: IntCounterVec,
    /// The total number of JSON-RPC error responses decoded from relays.
    pub rpc_call_failures: IntCounterVec,
    /// The total number of undecodable relay responses.
    pub json_rpc_decoding_failures: IntCounterVec,
    /// The current number of inflight requests, per relay.
    pub inflight_requests: IntGaugeVec,
    /// The duration of successful relay calls in seconds.
    pub rpc_call_duration: HistogramVec,
}

impl ForwarderMetrics {
    fn new() -> Self {
        Self {
            http_connect_failures: register_int_counter_vec!(
                "bundleproxy_forwarder_http_connect_failures_total",
                "Total number of HTTP connection failures",
                &["relay"]
            )
            .expect("metric registration"),
            http_call_failures: register_int_counter_vec!(
                "bundleproxy_forwarder_http_call_failures_total",
                "Total number of HTTP call failures",
                &["relay", "reason"]
            )
            .expect("metric registration"),
            rpc_call_failures: register_int_counter_vec!(
                "bundleproxy_forwarder_rpc_call_failures_total",
                "Total number of JSON-RPC error responses from relays",
                &["relay", "code"]
            )
            .expect("metric registration"),
            json_rpc_decoding_failures: register_int_counter_vec!(
                "bundleproxy_forwarder_json_rpc_decoding_failures_total",
                "Total number of undecodable relay responses",
                &["relay"]
            )
            .expect("metric registration"),
            inflight_requests: register_int_gauge_vec!(
                "bundleproxy_forwarder_inflight_requests",
                "Current number of inflight relay requests",
                &["relay"]
            )
            .expect("metric registration"),
            rpc_call_duration: register_histogram_vec!(
                "bundleproxy_forwarder_rpc_call_duration_seconds",
                "Duration of successful relay calls",
                &["relay"]
            )
            .expect("metric registration"),
        }
    }
}

/// Render all registered metrics in the Prometheus text format.
pub fn render() -> String {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(error) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(target: "metrics", ?error, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
