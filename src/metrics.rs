//! Prometheus counters and histograms for request handling.

use std::time::Instant;

/// Count a handled request by kind ("manifest", "segment") and status.
pub fn record_request(kind: &'static str, status: u16) {
    metrics::counter!(
        "livesim_requests_total",
        "kind" => kind,
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record the handling duration for a request kind.
pub fn record_duration(kind: &'static str, start: Instant) {
    metrics::histogram!("livesim_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

/// Count a segment served via the chunked (degraded-network) path.
pub fn record_chunked_delivery() {
    metrics::counter!("livesim_chunked_deliveries_total").increment(1);
}
