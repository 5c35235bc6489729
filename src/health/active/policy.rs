//! Active health evaluation policies.

use std::sync::Arc;

use axum::body::Body;
use axum::http::Response;

use crate::cluster::{ClusterState, DestinationState};
use crate::config::ConsecutiveFailuresOptions;
use crate::health::consecutive::{ConsecutiveFailuresCounter, ThresholdOverride};
use crate::health::error::ProbeError;
use crate::health::updater::{DestinationHealthUpdater, NewActiveDestinationHealth};

/// Outcome of probing one destination.
#[derive(Debug)]
pub struct DestinationProbingResult {
    pub destination: Arc<DestinationState>,
    pub response: Option<Response<Body>>,
    pub error: Option<ProbeError>,
}

impl DestinationProbingResult {
    pub fn succeeded(destination: Arc<DestinationState>, response: Response<Body>) -> Self {
        Self {
            destination,
            response: Some(response),
            error: None,
        }
    }

    pub fn failed(destination: Arc<DestinationState>, error: ProbeError) -> Self {
        Self {
            destination,
            response: None,
            error: Some(error),
        }
    }

    /// Whether the destination answered with a 2xx status.
    pub fn is_success(&self) -> bool {
        self.response
            .as_ref()
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// Turns a completed probing pass into new active health values.
///
/// Called once per pass with the results of every destination of the cluster.
pub trait ActiveHealthCheckPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn probing_completed(&self, cluster: &ClusterState, results: &[DestinationProbingResult]);

    /// Forget per-destination state, called when active checks are turned off.
    fn reset(&self, _cluster: &ClusterState) {}
}

const COUNTER_KEY: &str = "active.consecutive_failures";
const THRESHOLD_KEY: &str = "active.consecutive_failures.threshold";

/// Marks a destination unhealthy after a streak of failed probes.
pub struct ConsecutiveFailuresHealthPolicy {
    options: ConsecutiveFailuresOptions,
    health_updater: Arc<DestinationHealthUpdater>,
}

impl ConsecutiveFailuresHealthPolicy {
    pub fn new(options: ConsecutiveFailuresOptions, health_updater: Arc<DestinationHealthUpdater>) -> Self {
        Self {
            options,
            health_updater,
        }
    }
}

impl ActiveHealthCheckPolicy for ConsecutiveFailuresHealthPolicy {
    fn name(&self) -> &'static str {
        super::CONSECUTIVE_FAILURES
    }

    fn probing_completed(&self, cluster: &ClusterState, results: &[DestinationProbingResult]) {
        if results.is_empty() {
            return;
        }

        let threshold = cluster
            .policy_state()
            .get_or_init(THRESHOLD_KEY, ThresholdOverride::default)
            .threshold(&cluster.model().config, self.options.default_threshold);

        let batch: Vec<NewActiveDestinationHealth> = results
            .iter()
            .map(|result| {
                let counter = result
                    .destination
                    .policy_state()
                    .get_or_init(COUNTER_KEY, ConsecutiveFailuresCounter::default);
                let new_health = counter.record(result.is_success(), threshold);
                NewActiveDestinationHealth::new(result.destination.clone(), new_health)
            })
            .collect();

        self.health_updater.set_active(cluster, &batch);
    }

    fn reset(&self, cluster: &ClusterState) {
        for destination in cluster.all_destinations() {
            destination.policy_state().remove(COUNTER_KEY);
        }
    }
}
