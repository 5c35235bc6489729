//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define health metrics
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `proxy_destination_health` (gauge): 0=unknown, 1=healthy, 2=unhealthy,
//!   by cluster, destination and check
//! - `proxy_available_destinations` (gauge): available destinations by cluster
//! - `proxy_health_probes_total` (counter): probes by cluster and result
//! - `proxy_health_probe_duration_seconds` (histogram): probe latency by cluster
//! - `proxy_destination_reactivations_total` (counter): passive reactivations by cluster
//!
//! # Design Decisions
//! - Without an installed recorder every call is a no-op
//! - Label values are cluster and destination ids, bounded by configuration

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::health::state::DestinationHealth;

/// `check` label of active health.
pub const ACTIVE: &str = "active";

/// `check` label of passive health.
pub const PASSIVE: &str = "passive";

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_destination_health(cluster: &str, destination: &str, check: &'static str, health: DestinationHealth) {
    metrics::gauge!(
        "proxy_destination_health",
        "cluster" => cluster.to_string(),
        "destination" => destination.to_string(),
        "check" => check
    )
    .set(health as u8 as f64);
}

pub fn record_available_destinations(cluster: &str, count: usize) {
    metrics::gauge!("proxy_available_destinations", "cluster" => cluster.to_string()).set(count as f64);
}

pub fn record_probe(cluster: &str, result: &'static str, duration: Duration) {
    metrics::counter!(
        "proxy_health_probes_total",
        "cluster" => cluster.to_string(),
        "result" => result
    )
    .increment(1);
    metrics::histogram!("proxy_health_probe_duration_seconds", "cluster" => cluster.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_reactivation(cluster: &str) {
    metrics::counter!("proxy_destination_reactivations_total", "cluster" => cluster.to_string())
        .increment(1);
}
