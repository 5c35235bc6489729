//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every destination of clusters with active checks enabled
//! - Feed each completed pass to the cluster's evaluation policy
//! - Follow cluster configuration changes (schedule, reschedule, unschedule)
//!
//! # Data Flow
//! ```text
//! Cluster tick (EntityActionScheduler, one timer per cluster)
//!     → probe every destination concurrently, each with its own timeout
//!     → collect (destination, response | error) for all of them
//!     → policy.probing_completed(cluster, results)
//!     → DestinationHealthUpdater::set_active
//! ```
//!
//! # Design Decisions
//! - One destination's failure never prevents probing the others
//! - Passes for the same cluster never overlap; clusters tick independently
//! - Policy panics are caught and logged; previous health persists
//! - In-flight probes are abandoned on shutdown

pub mod policy;
pub mod probe;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::cluster::{ClusterChangeListener, ClusterModel, ClusterState, DestinationState};
use crate::config::HealthCheckOptions;
use crate::health::error::{HealthCheckError, ProbeError};
use crate::health::scheduler::EntityActionScheduler;
use crate::health::state::DestinationHealth;
use crate::health::updater::{DestinationHealthUpdater, NewActiveDestinationHealth};
use crate::observability::metrics;

pub use policy::{ActiveHealthCheckPolicy, ConsecutiveFailuresHealthPolicy, DestinationProbingResult};
pub use probe::{
    DefaultProbingRequestFactory, HealthProbeTransport, HyperProbeTransport, ProbingRequestFactory,
};

/// Name of the consecutive failures active policy.
pub const CONSECUTIVE_FAILURES: &str = "ConsecutiveFailures";

/// Names accepted by configuration validation.
pub const KNOWN_POLICIES: &[&str] = &[CONSECUTIVE_FAILURES];

struct ClusterProber {
    policies: HashMap<&'static str, Arc<dyn ActiveHealthCheckPolicy>>,
    request_factory: Arc<dyn ProbingRequestFactory>,
    shutdown: CancellationToken,
}

impl ClusterProber {
    fn policy(&self, name: &str) -> Result<Arc<dyn ActiveHealthCheckPolicy>, HealthCheckError> {
        self.policies
            .get(name)
            .cloned()
            .ok_or_else(|| HealthCheckError::UnknownPolicy {
                kind: "active health check",
                name: name.to_string(),
            })
    }

    async fn probe_cluster(&self, cluster: Arc<ClusterState>) {
        let _pass = cluster.probe_gate().lock().await;

        let model = cluster.model();
        let active = &model.config.health_check.active;
        if !active.enabled || self.shutdown.is_cancelled() {
            return;
        }

        let policy = match self.policy(&active.policy) {
            Ok(policy) => policy,
            Err(e) => {
                tracing::error!(cluster = %cluster.cluster_id(), error = %e, "Skipping active health check");
                return;
            }
        };

        let destinations = cluster.all_destinations();
        tracing::debug!(
            cluster = %cluster.cluster_id(),
            destinations = destinations.len(),
            "Probing cluster"
        );

        let probes = destinations
            .into_iter()
            .map(|destination| self.probe_destination(&model, destination, active.timeout()));
        let results = join_all(probes).await;

        // Active checks may have been turned off while probes were in flight.
        if self.shutdown.is_cancelled() || !cluster.model().config.health_check.active.enabled {
            return;
        }

        let evaluated = std::panic::catch_unwind(AssertUnwindSafe(|| {
            policy.probing_completed(&cluster, &results);
        }));
        if evaluated.is_err() {
            tracing::error!(
                cluster = %cluster.cluster_id(),
                policy = policy.name(),
                "Active health check policy panicked, keeping previous health"
            );
        }
    }

    async fn probe_destination(
        &self,
        model: &ClusterModel,
        destination: Arc<DestinationState>,
        timeout: Duration,
    ) -> DestinationProbingResult {
        let cluster_id = model.config.id.as_str();
        let started = Instant::now();

        let request = match self.request_factory.create_request(model, &destination.model()) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(
                    cluster = %cluster_id,
                    destination = %destination.destination_id(),
                    error = %e,
                    "Failed to build probe request"
                );
                return DestinationProbingResult::failed(destination, e);
            }
        };

        let result = tokio::select! {
            _ = self.shutdown.cancelled() => Err(ProbeError::Canceled),
            sent = tokio::time::timeout(timeout, model.transport.send(request)) => {
                sent.unwrap_or(Err(ProbeError::Timeout(timeout)))
            }
        };

        match result {
            Ok(response) => {
                let label = if response.status().is_success() { "success" } else { "failure" };
                metrics::record_probe(cluster_id, label, started.elapsed());
                if !response.status().is_success() {
                    tracing::debug!(
                        cluster = %cluster_id,
                        destination = %destination.destination_id(),
                        status = %response.status(),
                        "Probe returned non-success status"
                    );
                }
                DestinationProbingResult::succeeded(destination, response)
            }
            Err(e) => {
                let label = match e {
                    ProbeError::Timeout(_) => "timeout",
                    _ => "error",
                };
                metrics::record_probe(cluster_id, label, started.elapsed());
                tracing::debug!(
                    cluster = %cluster_id,
                    destination = %destination.destination_id(),
                    error = %e,
                    "Probe failed"
                );
                DestinationProbingResult::failed(destination, e)
            }
        }
    }
}

/// Probes clusters with active health checks enabled.
///
/// The periodic scheduler starts after the first [`check_health`](Self::check_health)
/// pass, so the first tick of every cluster happens one interval after warm-up.
pub struct ActiveHealthCheckMonitor {
    prober: Arc<ClusterProber>,
    scheduler: EntityActionScheduler<Arc<ClusterState>>,
    clusters: DashMap<String, Arc<ClusterState>>,
    health_updater: Arc<DestinationHealthUpdater>,
    initial_probe_completed: AtomicBool,
}

impl ActiveHealthCheckMonitor {
    pub fn new(
        policies: impl IntoIterator<Item = Arc<dyn ActiveHealthCheckPolicy>>,
        request_factory: Arc<dyn ProbingRequestFactory>,
        health_updater: Arc<DestinationHealthUpdater>,
    ) -> Self {
        let prober = Arc::new(ClusterProber {
            policies: policies.into_iter().map(|p| (p.name(), p)).collect(),
            request_factory,
            shutdown: CancellationToken::new(),
        });

        let tick = prober.clone();
        let scheduler = EntityActionScheduler::new(
            move |cluster: Arc<ClusterState>| {
                let prober = tick.clone();
                async move {
                    prober.probe_cluster(cluster).await;
                    Ok(())
                }
            },
            false,
            false,
        );

        Self {
            prober,
            scheduler,
            clusters: DashMap::new(),
            health_updater,
            initial_probe_completed: AtomicBool::new(false),
        }
    }

    /// Monitor with the built-in policies and request factory.
    pub fn with_defaults(options: &HealthCheckOptions, health_updater: Arc<DestinationHealthUpdater>) -> Self {
        let consecutive: Arc<dyn ActiveHealthCheckPolicy> = Arc::new(ConsecutiveFailuresHealthPolicy::new(
            options.consecutive_failures.clone(),
            health_updater.clone(),
        ));
        Self::new([consecutive], Arc::new(DefaultProbingRequestFactory), health_updater)
    }

    /// Probe `clusters` once, then start periodic probing.
    pub async fn check_health(&self, clusters: &[Arc<ClusterState>]) {
        let enabled: Vec<_> = clusters
            .iter()
            .filter(|c| c.model().config.health_check.active.enabled)
            .cloned()
            .collect();

        tracing::info!(clusters = enabled.len(), "Running active health checks");
        join_all(enabled.into_iter().map(|c| self.prober.probe_cluster(c))).await;

        if !self.initial_probe_completed.swap(true, Ordering::AcqRel) {
            tracing::info!("Initial active health probing completed");
        }
        self.scheduler.start();
    }

    /// Probe every known cluster once. Completes after the full pass.
    pub async fn force_check_all(&self) {
        let clusters: Vec<_> = self.clusters.iter().map(|e| e.value().clone()).collect();
        self.check_health(&clusters).await;
    }

    pub fn initial_probe_completed(&self) -> bool {
        self.initial_probe_completed.load(Ordering::Acquire)
    }

    pub fn is_probing(&self, cluster_id: &str) -> bool {
        self.clusters
            .get(cluster_id)
            .map(|c| self.scheduler.is_scheduled(c.value()))
            .unwrap_or(false)
    }

    /// Number of clusters with periodic probing scheduled.
    pub fn probed_clusters(&self) -> usize {
        self.scheduler.scheduled_count()
    }

    /// Stop all timers and abandon in-flight probes.
    pub fn shutdown(&self) {
        self.prober.shutdown.cancel();
        self.scheduler.shutdown();
        tracing::info!("Active health check monitor stopped");
    }

    fn reconcile(&self, cluster: &Arc<ClusterState>) {
        let active = cluster.model().config.health_check.active.clone();
        if !active.enabled {
            if self.scheduler.unschedule_entity(cluster) {
                tracing::info!(cluster = %cluster.cluster_id(), "Active health checks disabled");
            }
            self.reset_active_health(cluster);
            return;
        }

        if !self.scheduler.change_period(cluster, active.interval()) {
            self.scheduler.schedule_entity(cluster.clone(), active.interval());
            tracing::info!(
                cluster = %cluster.cluster_id(),
                interval_ms = active.interval_ms,
                path = %active.path,
                "Active health checks scheduled"
            );
        }
    }
}

impl ActiveHealthCheckMonitor {
    /// Disabled active checks report unknown and start from a clean streak
    /// when re-enabled.
    fn reset_active_health(&self, cluster: &ClusterState) {
        for policy in self.prober.policies.values() {
            policy.reset(cluster);
        }
        let batch: Vec<_> = cluster
            .all_destinations()
            .into_iter()
            .map(|d| NewActiveDestinationHealth::new(d, DestinationHealth::Unknown))
            .collect();
        self.health_updater.set_active(cluster, &batch);
    }
}

impl ClusterChangeListener for ActiveHealthCheckMonitor {
    fn on_cluster_added(&self, cluster: &Arc<ClusterState>) {
        self.clusters
            .insert(cluster.cluster_id().to_string(), cluster.clone());
        self.reconcile(cluster);
    }

    fn on_cluster_changed(&self, cluster: &Arc<ClusterState>) {
        self.clusters
            .insert(cluster.cluster_id().to_string(), cluster.clone());
        self.reconcile(cluster);
    }

    fn on_cluster_removed(&self, cluster: &Arc<ClusterState>) {
        self.clusters.remove(cluster.cluster_id());
        self.scheduler.unschedule_entity(cluster);
    }
}

impl Drop for ActiveHealthCheckMonitor {
    fn drop(&mut self) {
        self.prober.shutdown.cancel();
    }
}
