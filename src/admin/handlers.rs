use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::health::state::CompositeHealth;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub initial_probe_completed: bool,
    pub clusters: usize,
    pub probed_clusters: usize,
    pub pending_reactivations: usize,
}

#[derive(Serialize)]
pub struct ClusterStatus {
    pub id: String,
    pub load_balancing_policy: String,
    pub available_destinations_policy: String,
    pub active_health_checks: bool,
    pub passive_health_checks: bool,
    pub destinations: usize,
    pub available_destinations: usize,
    pub concurrent_requests: usize,
}

#[derive(Serialize)]
pub struct DestinationStatus {
    pub id: String,
    pub address: String,
    pub health: CompositeHealth,
    pub available: bool,
    pub concurrent_requests: usize,
    pub reactivation_pending: bool,
}

#[derive(Serialize)]
pub struct ProbeSummary {
    pub clusters: usize,
    pub probed_clusters: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let services = &state.services;
    let warmed_up = services.monitor.initial_probe_completed();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if warmed_up { "operational" } else { "warming_up" },
        initial_probe_completed: warmed_up,
        clusters: services.registry.len(),
        probed_clusters: services.monitor.probed_clusters(),
        pending_reactivations: services.reactivation.pending_count(),
    })
}

pub async fn get_clusters(State(state): State<AdminState>) -> Json<Vec<ClusterStatus>> {
    let services = &state.services;
    let statuses = services
        .registry
        .clusters()
        .into_iter()
        .map(|cluster| {
            let model = cluster.model();
            let snapshot = cluster.destinations();
            ClusterStatus {
                id: cluster.cluster_id().to_string(),
                load_balancing_policy: model.config.load_balancing_policy.clone(),
                available_destinations_policy: model.config.available_destinations_policy.clone(),
                active_health_checks: services.monitor.is_probing(cluster.cluster_id()),
                passive_health_checks: model.config.health_check.passive.enabled,
                destinations: snapshot.all.len(),
                available_destinations: snapshot.available.len(),
                concurrent_requests: cluster.concurrent_requests(),
            }
        })
        .collect();
    Json(statuses)
}

pub async fn get_destinations(
    State(state): State<AdminState>,
    Path(cluster_id): Path<String>,
) -> Result<Json<Vec<DestinationStatus>>, StatusCode> {
    let services = &state.services;
    let cluster = services
        .registry
        .get(&cluster_id)
        .ok_or(StatusCode::NOT_FOUND)?;
    let snapshot = cluster.destinations();

    let statuses = snapshot
        .all
        .iter()
        .map(|d| DestinationStatus {
            id: d.destination_id().to_string(),
            address: d.model().address.to_string(),
            health: d.health(),
            available: snapshot.available.iter().any(|a| std::sync::Arc::ptr_eq(a, d)),
            concurrent_requests: d.concurrent_requests(),
            reactivation_pending: services
                .reactivation
                .is_pending(&cluster_id, d.destination_id()),
        })
        .collect();
    Ok(Json(statuses))
}

/// Probe every cluster now. Responds after the pass has finished.
pub async fn post_probe(State(state): State<AdminState>) -> Json<ProbeSummary> {
    let services = &state.services;
    tracing::info!("Forced active health check requested");
    services.monitor.force_check_all().await;
    Json(ProbeSummary {
        clusters: services.registry.len(),
        probed_clusters: services.monitor.probed_clusters(),
    })
}
