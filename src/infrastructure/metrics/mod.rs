//! Prometheus Metrics Module
//!
//! Provides application-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - HTTP request counts by method, matched route, and status
//! - HTTP request latency histograms
//! - Live WebSocket sessions
//! - Marketplace events (escrow funding/settlement, order transitions, payouts)
//! - Database connection pool gauges

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

const NAMESPACE: &str = "koihire";

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// HTTP request counter - tracks total requests by method, route, and status code
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests").namespace(NAMESPACE),
        &["method", "path", "status"],
    )
    .expect("valid HTTP_REQUESTS_TOTAL definition")
});

/// HTTP request latency histogram - tracks request duration in seconds
pub static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
    HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request latency in seconds",
        )
        .namespace(NAMESPACE)
        .buckets(buckets),
        &["method", "path"],
    )
    .expect("valid HTTP_REQUEST_DURATION_SECONDS definition")
});

/// Identified realtime sessions on this instance
pub static WEBSOCKET_SESSIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new(
            "websocket_sessions_active",
            "Number of identified WebSocket sessions",
        )
        .namespace(NAMESPACE),
    )
    .expect("valid WEBSOCKET_SESSIONS_ACTIVE definition")
});

/// Business events, labelled by event name (`escrow_funded`, `order_completed`, ...)
pub static MARKETPLACE_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("marketplace_events_total", "Marketplace state changes").namespace(NAMESPACE),
        &["event"],
    )
    .expect("valid MARKETPLACE_EVENTS_TOTAL definition")
});

/// Database connection pool stats
pub static DB_POOL_CONNECTIONS: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(
        Opts::new("db_pool_connections", "Database connection pool statistics")
            .namespace(NAMESPACE),
        &["state"], // "idle", "active", "max"
    )
    .expect("valid DB_POOL_CONNECTIONS definition")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
        Box::new(WEBSOCKET_SESSIONS_ACTIVE.clone()),
        Box::new(MARKETPLACE_EVENTS_TOTAL.clone()),
        Box::new(DB_POOL_CONNECTIONS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            tracing::error!(error = %e, "Failed to register metric");
        }
    }
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Helper to record HTTP request metrics
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration_secs);
}

pub fn record_marketplace_event(event: &str) {
    MARKETPLACE_EVENTS_TOTAL.with_label_values(&[event]).inc();
}

pub fn set_websocket_sessions(count: usize) {
    WEBSOCKET_SESSIONS_ACTIVE.set(count as i64);
}

/// Helper to update database pool stats
pub fn update_db_pool_stats(idle: u32, active: u32, max: u32) {
    DB_POOL_CONNECTIONS.with_label_values(&["idle"]).set(idle as f64);
    DB_POOL_CONNECTIONS.with_label_values(&["active"]).set(active as f64);
    DB_POOL_CONNECTIONS.with_label_values(&["max"]).set(max as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_namespace() {
        record_http_request("GET", "/health", 200, 0.001);
        let metrics = gather_metrics();
        assert!(metrics.contains("koihire_http_requests_total"));
    }

    #[test]
    fn test_record_marketplace_event() {
        record_marketplace_event("escrow_funded");
        record_marketplace_event("escrow_funded");
        let value = MARKETPLACE_EVENTS_TOTAL
            .with_label_values(&["escrow_funded"])
            .get();
        assert!(value >= 2);
        assert!(gather_metrics().contains("koihire_marketplace_events_total"));
    }

    #[test]
    fn test_websocket_gauge() {
        set_websocket_sessions(3);
        assert_eq!(WEBSOCKET_SESSIONS_ACTIVE.get(), 3);
    }
}
