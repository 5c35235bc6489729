//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the health and selection services in dependency order
//! - Apply the first configuration and run the warm-up probe pass
//! - Apply later configuration revisions
//!
//! # Design Decisions
//! - Fail fast: invalid configuration never reaches the registry
//! - Warm-up completes before periodic probing starts

use std::sync::Arc;

use crate::cluster::{ApplySummary, ClusterRegistry};
use crate::config::validation::validate_config;
use crate::config::{ProxyConfig, ValidationError};
use crate::dispatch::Dispatcher;
use crate::health::active::probe::{HealthProbeTransport, HyperProbeTransport};
use crate::health::active::ActiveHealthCheckMonitor;
use crate::health::availability::ClusterDestinationsUpdater;
use crate::health::clock::{Clock, MonotonicClock};
use crate::health::passive::PassiveHealthChecker;
use crate::health::reactivation::ReactivationScheduler;
use crate::health::updater::DestinationHealthUpdater;
use crate::load_balancer::LoadBalancer;

/// Every long-lived service, wired together.
pub struct HealthServices {
    pub clock: Arc<dyn Clock>,
    pub destinations_updater: Arc<ClusterDestinationsUpdater>,
    pub reactivation: Arc<ReactivationScheduler>,
    pub health_updater: Arc<DestinationHealthUpdater>,
    pub monitor: Arc<ActiveHealthCheckMonitor>,
    pub passive: Arc<PassiveHealthChecker>,
    pub registry: Arc<ClusterRegistry>,
    pub load_balancer: Arc<LoadBalancer>,
    pub dispatcher: Arc<Dispatcher>,
}

impl HealthServices {
    /// Services probing over HTTP with the system clock.
    pub fn new(config: &ProxyConfig) -> Self {
        Self::with_transport(
            config,
            Arc::new(HyperProbeTransport::new()),
            Arc::new(MonotonicClock::new()),
        )
    }

    pub fn with_transport(
        config: &ProxyConfig,
        transport: Arc<dyn HealthProbeTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let options = &config.health_check;
        let destinations_updater = Arc::new(ClusterDestinationsUpdater::default());
        let reactivation = ReactivationScheduler::new(destinations_updater.clone());
        let health_updater = Arc::new(DestinationHealthUpdater::new(
            destinations_updater.clone(),
            reactivation.clone(),
        ));
        let monitor = Arc::new(ActiveHealthCheckMonitor::with_defaults(
            options,
            health_updater.clone(),
        ));
        let passive = Arc::new(PassiveHealthChecker::with_defaults(
            options,
            clock.clone(),
            health_updater.clone(),
        ));

        let registry = Arc::new(ClusterRegistry::new(
            transport,
            destinations_updater.clone(),
            health_updater.clone(),
        ));
        registry.add_listener(monitor.clone());

        let load_balancer = Arc::new(LoadBalancer::with_defaults());
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            load_balancer.clone(),
            passive.clone(),
        ));

        Self {
            clock,
            destinations_updater,
            reactivation,
            health_updater,
            monitor,
            passive,
            registry,
            load_balancer,
            dispatcher,
        }
    }

    /// Register the initial clusters and probe them once.
    pub async fn start(&self, config: &ProxyConfig) -> Result<ApplySummary, Vec<ValidationError>> {
        let summary = self.apply(config)?;
        self.monitor.force_check_all().await;
        tracing::info!(
            clusters = self.registry.len(),
            probed = self.monitor.probed_clusters(),
            "Health services started"
        );
        Ok(summary)
    }

    /// Validate and apply a configuration revision.
    pub fn apply(&self, config: &ProxyConfig) -> Result<ApplySummary, Vec<ValidationError>> {
        validate_config(config)?;
        let summary = self.registry.apply(config.clusters.clone());
        tracing::info!(
            added = summary.added.len(),
            changed = summary.changed.len(),
            removed = summary.removed.len(),
            unchanged = summary.unchanged,
            "Configuration applied"
        );
        Ok(summary)
    }

    pub fn shutdown(&self) {
        self.monitor.shutdown();
        self.reactivation.shutdown();
    }
}
