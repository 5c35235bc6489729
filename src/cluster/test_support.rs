//! Shared fixtures for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{HeaderMap, Request, Response, StatusCode};
use futures_util::future::BoxFuture;

use crate::cluster::{ClusterDestinationsState, ClusterModel, ClusterState, DestinationState};
use crate::config::ClusterConfig;
use crate::health::active::probe::HealthProbeTransport;
use crate::health::availability::ClusterDestinationsUpdater;
use crate::health::reactivation::ReactivationScheduler;
use crate::health::updater::DestinationHealthUpdater;
use crate::health::error::ProbeError;
use crate::health::state::{CompositeHealth, DestinationHealth};

/// Transport that answers from a script keyed by request URI prefix.
#[derive(Default)]
pub struct StaticTransport {
    routes: Mutex<Vec<(String, VecDeque<Result<StatusCode, ProbeError>>)>>,
    requests: Mutex<Vec<(String, HeaderMap)>>,
}

impl StaticTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue responses for URIs starting with `prefix`. The last entry repeats.
    pub fn respond(&self, prefix: &str, results: Vec<Result<StatusCode, ProbeError>>) {
        self.routes
            .lock()
            .unwrap()
            .push((prefix.to_string(), results.into_iter().collect()));
    }

    pub fn requests(&self) -> Vec<(String, HeaderMap)> {
        self.requests.lock().unwrap().clone()
    }

    fn next_result(&self, uri: &str) -> Result<StatusCode, ProbeError> {
        let mut routes = self.routes.lock().unwrap();
        for (prefix, results) in routes.iter_mut() {
            if uri.starts_with(prefix.as_str()) {
                if results.len() > 1 {
                    return results.pop_front().unwrap();
                }
                if let Some(last) = results.front() {
                    return last.clone();
                }
            }
        }
        Ok(StatusCode::OK)
    }
}

impl HealthProbeTransport for StaticTransport {
    fn send(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, ProbeError>> {
        let uri = request.uri().to_string();
        let result = self.next_result(&uri);
        self.requests
            .lock()
            .unwrap()
            .push((uri, request.headers().clone()));
        Box::pin(async move {
            let status = result?;
            let mut response = Response::new(Body::empty());
            *response.status_mut() = status;
            Ok(response)
        })
    }
}

/// Build a cluster whose destinations are all available.
pub fn cluster_with(config: ClusterConfig) -> Arc<ClusterState> {
    cluster_with_transport(config, StaticTransport::new())
}

pub fn cluster_with_transport(
    config: ClusterConfig,
    transport: Arc<dyn HealthProbeTransport>,
) -> Arc<ClusterState> {
    let destinations: Vec<Arc<DestinationState>> = config
        .destinations
        .iter()
        .map(|d| Arc::new(DestinationState::from_config(d.clone()).unwrap()))
        .collect();
    let cluster = Arc::new(ClusterState::new(ClusterModel::new(config, transport)));
    cluster.publish_destinations(ClusterDestinationsState {
        all: destinations.clone(),
        available: destinations,
    });
    cluster
}

/// Cluster with `n` destinations `d1..dn` on distinct local ports.
pub fn cluster_of(n: usize) -> Arc<ClusterState> {
    let mut config = ClusterConfig::new("web");
    for i in 1..=n {
        config.destinations.push(crate::config::DestinationConfig::new(
            format!("d{i}"),
            format!("http://127.0.0.1:{}", 9000 + i),
        ));
    }
    cluster_with(config)
}

pub fn set_health(destination: &DestinationState, active: DestinationHealth, passive: DestinationHealth) {
    destination
        .health_cell()
        .store(CompositeHealth::new(active, passive));
}

pub fn destination_ids(destinations: &[Arc<DestinationState>]) -> Vec<String> {
    destinations
        .iter()
        .map(|d| d.destination_id().to_string())
        .collect()
}

/// Health updater wired to a default availability updater and a real-time
/// reactivation scheduler.
pub fn health_updater() -> Arc<DestinationHealthUpdater> {
    let destinations = Arc::new(ClusterDestinationsUpdater::default());
    let reactivation = ReactivationScheduler::new(destinations.clone());
    Arc::new(DestinationHealthUpdater::new(destinations, reactivation))
}
