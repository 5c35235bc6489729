//! Forwarding-engine entry point.
//!
//! # Data Flow
//! ```text
//! acquire(cluster_id)
//!     → registry lookup
//!     → published available destinations
//!     → LoadBalancer pick
//!     → DispatchLease (concurrency counters incremented)
//! request forwarded by the caller
//!     → lease.complete(outcome) → passive health
//!     → lease dropped → counters decremented
//! ```

use std::ops::Deref;
use std::sync::Arc;

use thiserror::Error;

use crate::cluster::{ClusterRegistry, ClusterState, DestinationState};
use crate::health::passive::{ForwardOutcome, PassiveHealthChecker};
use crate::load_balancer::{LoadBalancer, LoadBalancerError};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("cluster '{0}' not found")]
    ClusterNotFound(String),

    #[error("no available destinations in cluster '{0}'")]
    NoAvailableDestinations(String),

    #[error(transparent)]
    LoadBalancer(#[from] LoadBalancerError),
}

pub struct Dispatcher {
    registry: Arc<ClusterRegistry>,
    load_balancer: Arc<LoadBalancer>,
    passive: Arc<PassiveHealthChecker>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ClusterRegistry>,
        load_balancer: Arc<LoadBalancer>,
        passive: Arc<PassiveHealthChecker>,
    ) -> Self {
        Self {
            registry,
            load_balancer,
            passive,
        }
    }

    /// Pick a destination for a request to `cluster_id`.
    ///
    /// Only reads published snapshots; never waits on health checking.
    pub fn acquire(&self, cluster_id: &str) -> Result<DispatchLease, DispatchError> {
        let cluster = self
            .registry
            .get(cluster_id)
            .ok_or_else(|| DispatchError::ClusterNotFound(cluster_id.to_string()))?;

        let snapshot = cluster.destinations();
        let mode = cluster.model().config.load_balancing_policy.clone();
        let destination = self
            .load_balancer
            .pick_destination(&cluster, &snapshot.available, &mode)?
            .ok_or_else(|| {
                tracing::warn!(cluster = %cluster_id, "No available destinations");
                DispatchError::NoAvailableDestinations(cluster_id.to_string())
            })?;

        Ok(DispatchLease::new(cluster, destination, self.passive.clone()))
    }
}

/// A destination reserved for one request.
///
/// Holds one unit of the destination's and the cluster's concurrency
/// counters until dropped.
pub struct DispatchLease {
    cluster: Arc<ClusterState>,
    destination: Arc<DestinationState>,
    passive: Arc<PassiveHealthChecker>,
}

impl DispatchLease {
    fn new(
        cluster: Arc<ClusterState>,
        destination: Arc<DestinationState>,
        passive: Arc<PassiveHealthChecker>,
    ) -> Self {
        destination.concurrency().increment();
        cluster.concurrency().increment();
        Self {
            cluster,
            destination,
            passive,
        }
    }

    pub fn cluster(&self) -> &Arc<ClusterState> {
        &self.cluster
    }

    pub fn destination(&self) -> &Arc<DestinationState> {
        &self.destination
    }

    /// Report how the request went and release the lease.
    pub fn complete(self, outcome: ForwardOutcome) {
        self.passive
            .request_proxied(&self.cluster, &self.destination, &outcome);
    }
}

impl Deref for DispatchLease {
    type Target = DestinationState;
    fn deref(&self) -> &Self::Target {
        &self.destination
    }
}

impl Drop for DispatchLease {
    fn drop(&mut self) {
        self.destination.concurrency().decrement();
        self.cluster.concurrency().decrement();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::test_support::StaticTransport;
    use crate::config::{ClusterConfig, DestinationConfig, HealthCheckOptions};
    use crate::health::availability::ClusterDestinationsUpdater;
    use crate::health::clock::MonotonicClock;
    use crate::health::passive::ForwardError;
    use crate::health::reactivation::ReactivationScheduler;
    use crate::health::state::DestinationHealth;
    use crate::health::updater::DestinationHealthUpdater;
    use crate::load_balancer::{FIRST, LEAST_REQUESTS};

    fn dispatcher_with(policy: &str, destinations: usize) -> Dispatcher {
        let destinations_updater = Arc::new(ClusterDestinationsUpdater::default());
        let clock = Arc::new(MonotonicClock::new());
        let reactivation = ReactivationScheduler::new(destinations_updater.clone());
        let health_updater = Arc::new(DestinationHealthUpdater::new(
            destinations_updater.clone(),
            reactivation,
        ));
        let registry = Arc::new(ClusterRegistry::new(
            StaticTransport::new(),
            destinations_updater,
            health_updater.clone(),
        ));

        let mut config = ClusterConfig::new("web");
        config.load_balancing_policy = policy.to_string();
        config.health_check.passive.enabled = true;
        config.health_check.passive.policy = crate::health::passive::CONSECUTIVE_FAILURES.to_string();
        for i in 1..=destinations {
            config.destinations.push(DestinationConfig::new(
                format!("d{i}"),
                format!("http://127.0.0.1:{}", 9000 + i),
            ));
        }
        registry.apply(vec![config]);

        let options = HealthCheckOptions::default();
        let passive = Arc::new(PassiveHealthChecker::with_defaults(&options, clock, health_updater));
        Dispatcher::new(registry, Arc::new(LoadBalancer::with_defaults()), passive)
    }

    #[tokio::test]
    async fn test_lease_tracks_concurrency() {
        let dispatcher = dispatcher_with(LEAST_REQUESTS, 2);
        let first = dispatcher.acquire("web").unwrap();
        let second = dispatcher.acquire("web").unwrap();
        assert_ne!(first.destination_id(), second.destination_id());
        assert_eq!(first.concurrent_requests(), 1);
        assert_eq!(first.cluster().concurrent_requests(), 2);

        let cluster = first.cluster().clone();
        drop(first);
        second.complete(ForwardOutcome::Success);
        assert_eq!(cluster.concurrent_requests(), 0);
        assert!(cluster.all_destinations().iter().all(|d| d.concurrent_requests() == 0));
    }

    #[tokio::test]
    async fn test_lease_released_on_panic() {
        let dispatcher = dispatcher_with(FIRST, 2);
        let cluster = dispatcher.acquire("web").unwrap().cluster().clone();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _lease = dispatcher.acquire("web").unwrap();
            panic!("forwarding failed");
        }));
        assert!(result.is_err());
        assert_eq!(cluster.concurrent_requests(), 0);
    }

    #[tokio::test]
    async fn test_outcomes_drive_passive_health() {
        let dispatcher = dispatcher_with(FIRST, 2);
        for _ in 0..2 {
            let lease = dispatcher.acquire("web").unwrap();
            assert_eq!(lease.destination_id(), "d1");
            lease.complete(ForwardOutcome::Failed(ForwardError::Request));
        }
        // d1 reached the default threshold of two and left the rotation.
        let lease = dispatcher.acquire("web").unwrap();
        assert_eq!(lease.destination_id(), "d2");
        let d1 = lease.cluster().destination("d1").unwrap();
        assert_eq!(d1.health().passive, DestinationHealth::Unhealthy);
    }

    #[tokio::test]
    async fn test_errors() {
        let dispatcher = dispatcher_with(FIRST, 0);
        assert!(matches!(
            dispatcher.acquire("api"),
            Err(DispatchError::ClusterNotFound(id)) if id == "api"
        ));
        assert!(matches!(
            dispatcher.acquire("web"),
            Err(DispatchError::NoAvailableDestinations(_))
        ));

        let dispatcher = dispatcher_with("Fastest", 2);
        assert!(matches!(
            dispatcher.acquire("web"),
            Err(DispatchError::LoadBalancer(LoadBalancerError::UnknownPolicy(_)))
        ));
    }
}
