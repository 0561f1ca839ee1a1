//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by pool-set and result
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `pool_objects_created_total` (counter): objects built by factories, by key
//! - `pool_objects_destroyed_total` (counter): objects destroyed, by key
//! - `pool_borrow_failures_total` (counter): failed borrows by reason

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::PoolError;

/// Start the Prometheus scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(pool: &str, result: &str, start: Instant) {
    let result = if result.is_empty() { "success" } else { result };
    metrics::counter!(
        "proxy_requests_total",
        "pool" => pool.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds", "pool" => pool.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_object_created(key: &str) {
    metrics::counter!("pool_objects_created_total", "key" => key.to_string()).increment(1);
}

pub fn record_object_destroyed(key: &str) {
    metrics::counter!("pool_objects_destroyed_total", "key" => key.to_string()).increment(1);
}

pub fn record_borrow_failure(err: &PoolError) {
    let reason = match err {
        PoolError::Canceled => "canceled",
        PoolError::DeadlineExceeded => "deadline_exceeded",
        PoolError::Closed => "closed",
        PoolError::Misuse(_) => "misuse",
        PoolError::UnknownKey(_) => "unknown_key",
        PoolError::Creation(_) => "creation",
    };
    metrics::counter!("pool_borrow_failures_total", "reason" => reason).increment(1);
}
