//! Cluster registry.
//!
//! # Responsibilities
//! - Hold the current set of clusters by id
//! - Apply configuration revisions as a diff (added, changed, removed)
//! - Reconcile destination membership while keeping per-destination state
//! - Notify listeners (the active monitor) of every cluster change
//!
//! # Design Decisions
//! - A destination keeps its health and counters across revisions as long as
//!   its id is unchanged
//! - Pending reactivations of removed destinations are cancelled
//! - Lookups are lock-free; revisions are applied one at a time

use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;
use serde::Serialize;

use crate::cluster::destination::{DestinationModel, DestinationState};
use crate::cluster::state::{ClusterModel, ClusterState};
use crate::config::ClusterConfig;
use crate::health::active::probe::HealthProbeTransport;
use crate::health::availability::ClusterDestinationsUpdater;
use crate::health::updater::DestinationHealthUpdater;

/// Receives cluster lifecycle events.
pub trait ClusterChangeListener: Send + Sync {
    fn on_cluster_added(&self, cluster: &Arc<ClusterState>);
    fn on_cluster_changed(&self, cluster: &Arc<ClusterState>);
    fn on_cluster_removed(&self, cluster: &Arc<ClusterState>);
}

/// What a call to [`ClusterRegistry::apply`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: usize,
}

/// Current clusters, keyed by id.
pub struct ClusterRegistry {
    clusters: DashMap<String, Arc<ClusterState>>,
    transport: Arc<dyn HealthProbeTransport>,
    destinations_updater: Arc<ClusterDestinationsUpdater>,
    health_updater: Arc<DestinationHealthUpdater>,
    listeners: RwLock<Vec<Arc<dyn ClusterChangeListener>>>,
    apply_lock: Mutex<()>,
}

impl ClusterRegistry {
    pub fn new(
        transport: Arc<dyn HealthProbeTransport>,
        destinations_updater: Arc<ClusterDestinationsUpdater>,
        health_updater: Arc<DestinationHealthUpdater>,
    ) -> Self {
        Self {
            clusters: DashMap::new(),
            transport,
            destinations_updater,
            health_updater,
            listeners: RwLock::new(Vec::new()),
            apply_lock: Mutex::new(()),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn ClusterChangeListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    pub fn get(&self, cluster_id: &str) -> Option<Arc<ClusterState>> {
        self.clusters.get(cluster_id).map(|c| c.value().clone())
    }

    /// All clusters, ordered by id.
    pub fn clusters(&self) -> Vec<Arc<ClusterState>> {
        let mut clusters: Vec<_> = self.clusters.iter().map(|c| c.value().clone()).collect();
        clusters.sort_by(|a, b| a.cluster_id().cmp(b.cluster_id()));
        clusters
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Make the registry match `configs`.
    pub fn apply(&self, configs: Vec<ClusterConfig>) -> ApplySummary {
        let _apply = self.apply_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut summary = ApplySummary::default();
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let incoming: HashSet<String> = configs.iter().map(|c| c.id.clone()).collect();
        let stale: Vec<Arc<ClusterState>> = self
            .clusters
            .iter()
            .filter(|c| !incoming.contains(c.key()))
            .map(|c| c.value().clone())
            .collect();

        for config in configs {
            match self.get(&config.id) {
                Some(cluster) => {
                    if cluster.model().config == config {
                        summary.unchanged += 1;
                        continue;
                    }
                    let id = config.id.clone();
                    cluster.set_model(ClusterModel::new(config, self.transport.clone()));
                    self.reconcile_destinations(&cluster);
                    tracing::info!(cluster = %id, "Cluster updated");
                    for listener in &listeners {
                        listener.on_cluster_changed(&cluster);
                    }
                    summary.changed.push(id);
                }
                None => {
                    let id = config.id.clone();
                    let cluster = Arc::new(ClusterState::new(ClusterModel::new(config, self.transport.clone())));
                    self.reconcile_destinations(&cluster);
                    self.clusters.insert(id.clone(), cluster.clone());
                    tracing::info!(
                        cluster = %id,
                        destinations = cluster.all_destinations().len(),
                        "Cluster added"
                    );
                    for listener in &listeners {
                        listener.on_cluster_added(&cluster);
                    }
                    summary.added.push(id);
                }
            }
        }

        for cluster in stale {
            self.clusters.remove(cluster.cluster_id());
            self.health_updater.forget_cluster(cluster.cluster_id());
            tracing::info!(cluster = %cluster.cluster_id(), "Cluster removed");
            for listener in &listeners {
                listener.on_cluster_removed(&cluster);
            }
            summary.removed.push(cluster.cluster_id().to_string());
        }

        summary
    }

    /// Rebuild the destination list from the cluster's current configuration.
    fn reconcile_destinations(&self, cluster: &ClusterState) {
        let model = cluster.model();
        let current = cluster.all_destinations();
        let mut next = Vec::with_capacity(model.config.destinations.len());

        for config in &model.config.destinations {
            let destination_model = match DestinationModel::from_config(config.clone()) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(
                        cluster = %cluster.cluster_id(),
                        destination = %config.id,
                        address = %config.address,
                        error = %e,
                        "Skipping destination with invalid address"
                    );
                    continue;
                }
            };

            match current.iter().find(|d| d.destination_id() == config.id) {
                Some(existing) => {
                    if *existing.model() != destination_model {
                        existing.set_model(destination_model);
                    }
                    next.push(existing.clone());
                }
                None => {
                    tracing::debug!(
                        cluster = %cluster.cluster_id(),
                        destination = %config.id,
                        "Destination added"
                    );
                    next.push(Arc::new(DestinationState::new(destination_model)));
                }
            }
        }

        for old in &current {
            if !next.iter().any(|d| Arc::ptr_eq(d, old)) {
                tracing::debug!(
                    cluster = %cluster.cluster_id(),
                    destination = %old.destination_id(),
                    "Destination removed"
                );
                self.health_updater
                    .forget_destination(cluster.cluster_id(), old.destination_id());
            }
        }

        self.destinations_updater.update_all_destinations(cluster, next);
    }
}
