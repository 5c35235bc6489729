//! Applies health transitions to destinations.
//!
//! Policies decide *what* a destination's health should be; this module is
//! the single place that writes it, logs the transition, refreshes the
//! cluster's available destinations and arms reactivation.

use std::sync::Arc;
use std::time::Duration;

use crate::cluster::{ClusterState, DestinationState};
use crate::health::availability::ClusterDestinationsUpdater;
use crate::health::reactivation::ReactivationScheduler;
use crate::health::state::DestinationHealth;
use crate::observability::metrics;

/// New active health computed for one destination.
#[derive(Debug, Clone)]
pub struct NewActiveDestinationHealth {
    pub destination: Arc<DestinationState>,
    pub new_health: DestinationHealth,
}

impl NewActiveDestinationHealth {
    pub fn new(destination: Arc<DestinationState>, new_health: DestinationHealth) -> Self {
        Self {
            destination,
            new_health,
        }
    }
}

pub struct DestinationHealthUpdater {
    destinations_updater: Arc<ClusterDestinationsUpdater>,
    reactivation: Arc<ReactivationScheduler>,
}

impl DestinationHealthUpdater {
    pub fn new(
        destinations_updater: Arc<ClusterDestinationsUpdater>,
        reactivation: Arc<ReactivationScheduler>,
    ) -> Self {
        Self {
            destinations_updater,
            reactivation,
        }
    }

    /// Apply a batch of active results, then refresh availability once.
    pub fn set_active(&self, cluster: &ClusterState, batch: &[NewActiveDestinationHealth]) {
        let mut changed = false;
        for item in batch {
            let (previous, current) = item
                .destination
                .health_cell()
                .update(|health| health.change_active(item.new_health));
            if previous.active != current.active {
                changed = true;
                log_transition(cluster, &item.destination, metrics::ACTIVE, previous.active, current.active);
            }
        }

        if changed {
            self.destinations_updater.update_available_destinations(cluster);
        }
    }

    /// Apply a passive result. Unhealthy arms reactivation after
    /// `reactivation_period`.
    pub fn set_passive(
        &self,
        cluster: &Arc<ClusterState>,
        destination: &Arc<DestinationState>,
        new_health: DestinationHealth,
        reactivation_period: Duration,
    ) {
        let (previous, current) = destination
            .health_cell()
            .update(|health| health.change_passive(new_health));

        if previous.passive != current.passive {
            log_transition(cluster, destination, metrics::PASSIVE, previous.passive, current.passive);
            self.destinations_updater.update_available_destinations(cluster);
        }

        if new_health == DestinationHealth::Unhealthy {
            self.reactivation
                .schedule(cluster, destination, reactivation_period);
        }
    }

    /// Cancel any pending work for a destination leaving its cluster.
    pub fn forget_destination(&self, cluster_id: &str, destination_id: &str) {
        self.reactivation.cancel(cluster_id, destination_id);
    }

    /// Cancel pending work for every destination of a removed cluster.
    pub fn forget_cluster(&self, cluster_id: &str) {
        self.reactivation.cancel_cluster(cluster_id);
    }
}

fn log_transition(
    cluster: &ClusterState,
    destination: &DestinationState,
    check: &'static str,
    previous: DestinationHealth,
    current: DestinationHealth,
) {
    if current == DestinationHealth::Unhealthy {
        tracing::warn!(
            cluster = %cluster.cluster_id(),
            destination = %destination.destination_id(),
            check = check,
            from = %previous,
            "Destination marked unhealthy"
        );
    } else {
        tracing::info!(
            cluster = %cluster.cluster_id(),
            destination = %destination.destination_id(),
            check = check,
            from = %previous,
            to = %current,
            "Destination health changed"
        );
    }
    metrics::record_destination_health(cluster.cluster_id(), destination.destination_id(), check, current);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::test_support::{cluster_with, destination_ids};
    use crate::config::{ClusterConfig, DestinationConfig};
    use DestinationHealth::*;

    fn updater() -> (DestinationHealthUpdater, Arc<ReactivationScheduler>) {
        let destinations = Arc::new(ClusterDestinationsUpdater::default());
        let reactivation =
            ReactivationScheduler::new(destinations.clone());
        (
            DestinationHealthUpdater::new(destinations, reactivation.clone()),
            reactivation,
        )
    }

    fn cluster(active: bool, passive: bool) -> Arc<ClusterState> {
        let mut config = ClusterConfig::new("web");
        config.health_check.active.enabled = active;
        config.health_check.passive.enabled = passive;
        config
            .destinations
            .push(DestinationConfig::new("d1", "http://127.0.0.1:9001"));
        config
            .destinations
            .push(DestinationConfig::new("d2", "http://127.0.0.1:9002"));
        cluster_with(config)
    }

    #[tokio::test]
    async fn test_set_active_updates_and_refreshes() {
        let (updater, _) = updater();
        let cluster = cluster(true, false);
        let all = cluster.all_destinations();

        updater.set_active(
            &cluster,
            &[
                NewActiveDestinationHealth::new(all[0].clone(), Unhealthy),
                NewActiveDestinationHealth::new(all[1].clone(), Healthy),
            ],
        );

        assert_eq!(all[0].health().active, Unhealthy);
        assert_eq!(all[0].health().passive, Unknown);
        assert_eq!(all[1].health().active, Healthy);
        assert_eq!(destination_ids(&cluster.available_destinations()), vec!["d2"]);
    }

    #[tokio::test]
    async fn test_unchanged_batch_keeps_snapshot() {
        let (updater, _) = updater();
        let cluster = cluster(true, false);
        let all = cluster.all_destinations();
        let before = cluster.destinations();

        updater.set_active(&cluster, &[NewActiveDestinationHealth::new(all[0].clone(), Unknown)]);
        assert!(Arc::ptr_eq(&before, &cluster.destinations()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_passive_unhealthy_arms_reactivation() {
        let (updater, reactivation) = updater();
        let cluster = cluster(false, true);
        let d1 = cluster.all_destinations()[0].clone();

        updater.set_passive(&cluster, &d1, Unhealthy, Duration::from_secs(2));
        assert_eq!(d1.health().passive, Unhealthy);
        assert!(reactivation.is_pending("web", "d1"));
        assert_eq!(destination_ids(&cluster.available_destinations()), vec!["d2"]);

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(d1.health().passive, Unknown);
        assert_eq!(cluster.available_destinations().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forget_destination_cancels_reactivation() {
        let (updater, reactivation) = updater();
        let cluster = cluster(false, true);
        let d1 = cluster.all_destinations()[0].clone();

        updater.set_passive(&cluster, &d1, Unhealthy, Duration::from_secs(2));
        updater.forget_destination("web", "d1");
        assert!(!reactivation.is_pending("web", "d1"));
    }
}
