//! Cluster runtime state.
//!
//! # Responsibilities
//! - Hold the current cluster configuration snapshot and probe transport
//! - Publish the (all, available) destination snapshot for the request path
//! - Own cluster-wide counters (concurrency, round-robin cursor)
//!
//! # Design Decisions
//! - Readers load an `Arc` snapshot and never block
//! - Writers build a fresh snapshot and swap it in; nothing is patched in place
//! - Snapshot writers are serialized per cluster so an older recomputation
//!   can never overwrite a newer one

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;

use crate::cluster::destination::{ConcurrencyCounter, DestinationState};
use crate::cluster::policy_state::PolicyState;
use crate::config::ClusterConfig;
use crate::health::active::probe::HealthProbeTransport;

/// Immutable cluster configuration plus the transport used to probe it.
pub struct ClusterModel {
    pub config: ClusterConfig,
    pub transport: Arc<dyn HealthProbeTransport>,
}

impl ClusterModel {
    pub fn new(config: ClusterConfig, transport: Arc<dyn HealthProbeTransport>) -> Self {
        Self { config, transport }
    }
}

impl fmt::Debug for ClusterModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterModel")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The complete destination set and the subset currently eligible for traffic.
#[derive(Debug, Default)]
pub struct ClusterDestinationsState {
    pub all: Vec<Arc<DestinationState>>,
    pub available: Vec<Arc<DestinationState>>,
}

/// Runtime state of a cluster.
///
/// Equality and hashing use the cluster id only.
pub struct ClusterState {
    cluster_id: String,
    model: ArcSwap<ClusterModel>,
    destinations: ArcSwap<ClusterDestinationsState>,
    concurrency: ConcurrencyCounter,
    round_robin_cursor: AtomicUsize,
    policy_state: PolicyState,
    update_lock: Mutex<()>,
    probe_gate: tokio::sync::Mutex<()>,
}

impl ClusterState {
    /// Create a cluster with no destinations.
    pub fn new(model: ClusterModel) -> Self {
        Self {
            cluster_id: model.config.id.clone(),
            model: ArcSwap::from_pointee(model),
            destinations: ArcSwap::from_pointee(ClusterDestinationsState::default()),
            concurrency: ConcurrencyCounter::new(),
            round_robin_cursor: AtomicUsize::new(0),
            policy_state: PolicyState::new(),
            update_lock: Mutex::new(()),
            probe_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    /// Current configuration snapshot.
    pub fn model(&self) -> Arc<ClusterModel> {
        self.model.load_full()
    }

    pub(crate) fn set_model(&self, model: ClusterModel) {
        self.model.store(Arc::new(model));
    }

    /// Current destination snapshot.
    pub fn destinations(&self) -> Arc<ClusterDestinationsState> {
        self.destinations.load_full()
    }

    /// Every destination, in configuration order.
    pub fn all_destinations(&self) -> Vec<Arc<DestinationState>> {
        self.destinations.load().all.clone()
    }

    /// Destinations eligible for new requests.
    pub fn available_destinations(&self) -> Vec<Arc<DestinationState>> {
        self.destinations.load().available.clone()
    }

    /// Look up a destination by id.
    pub fn destination(&self, destination_id: &str) -> Option<Arc<DestinationState>> {
        self.destinations
            .load()
            .all
            .iter()
            .find(|d| d.destination_id() == destination_id)
            .cloned()
    }

    pub(crate) fn publish_destinations(&self, state: ClusterDestinationsState) {
        self.destinations.store(Arc::new(state));
    }

    /// Serializes writers of the destination snapshot.
    pub(crate) fn lock_updates(&self) -> MutexGuard<'_, ()> {
        self.update_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Held for the duration of an active probing pass.
    pub(crate) fn probe_gate(&self) -> &tokio::sync::Mutex<()> {
        &self.probe_gate
    }

    /// Number of requests currently in flight to this cluster.
    pub fn concurrent_requests(&self) -> usize {
        self.concurrency.value()
    }

    pub fn concurrency(&self) -> &ConcurrencyCounter {
        &self.concurrency
    }

    /// Advance the round-robin cursor, returning its previous value.
    pub fn next_round_robin(&self) -> usize {
        self.round_robin_cursor.fetch_add(1, Ordering::Relaxed)
    }

    pub fn policy_state(&self) -> &PolicyState {
        &self.policy_state
    }
}

impl fmt::Debug for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let destinations = self.destinations.load();
        f.debug_struct("ClusterState")
            .field("cluster_id", &self.cluster_id)
            .field("destinations", &destinations.all.len())
            .field("available", &destinations.available.len())
            .finish_non_exhaustive()
    }
}

impl PartialEq for ClusterState {
    fn eq(&self, other: &Self) -> bool {
        self.cluster_id == other.cluster_id
    }
}

impl Eq for ClusterState {}

impl Hash for ClusterState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cluster_id.hash(state);
    }
}
