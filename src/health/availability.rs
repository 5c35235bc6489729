//! Available destinations policies.
//!
//! # Data Flow
//! ```text
//! Health change or membership change
//!     → ClusterDestinationsUpdater::update_available_destinations
//!     → policy (by cluster's configured name) filters all destinations
//!     → new (all, available) snapshot swapped into ClusterState
//! ```
//!
//! # Design Decisions
//! - The snapshot is always recomputed from scratch, never patched
//! - A disabled check type never excludes a destination
//! - An unknown policy name falls back to the default and logs; the request
//!   path never sees a configuration error

use std::collections::HashMap;
use std::sync::Arc;

use crate::cluster::{ClusterDestinationsState, ClusterState, DestinationState};
use crate::config::ClusterConfig;
use crate::health::error::HealthCheckError;
use crate::health::state::DestinationHealth;
use crate::observability::metrics;

/// Include destinations that are not unhealthy under any enabled check.
pub const HEALTHY_AND_UNKNOWN: &str = "HealthyAndUnknown";

/// Like [`HEALTHY_AND_UNKNOWN`], but return every destination when none qualify.
pub const HEALTHY_OR_PANIC: &str = "HealthyOrPanic";

/// Names accepted by configuration validation.
pub const KNOWN_POLICIES: &[&str] = &[HEALTHY_AND_UNKNOWN, HEALTHY_OR_PANIC];

/// Derives the usable destinations of a cluster.
pub trait AvailableDestinationsPolicy: Send + Sync {
    /// Name used in configuration.
    fn name(&self) -> &'static str;

    /// Filter `all` according to the current health of each destination.
    fn get_available_destinations(
        &self,
        config: &ClusterConfig,
        all: &[Arc<DestinationState>],
    ) -> Vec<Arc<DestinationState>>;
}

/// Baseline policy: exclude a destination only if an enabled check marks it unhealthy.
#[derive(Debug, Default)]
pub struct HealthyAndUnknownDestinationsPolicy;

impl AvailableDestinationsPolicy for HealthyAndUnknownDestinationsPolicy {
    fn name(&self) -> &'static str {
        HEALTHY_AND_UNKNOWN
    }

    fn get_available_destinations(
        &self,
        config: &ClusterConfig,
        all: &[Arc<DestinationState>],
    ) -> Vec<Arc<DestinationState>> {
        let active_enabled = config.health_check.active.enabled;
        let passive_enabled = config.health_check.passive.enabled;

        if !active_enabled && !passive_enabled {
            return all.to_vec();
        }

        all.iter()
            .filter(|destination| {
                let health = destination.health();
                (!active_enabled || health.active != DestinationHealth::Unhealthy)
                    && (!passive_enabled || health.passive != DestinationHealth::Unhealthy)
            })
            .cloned()
            .collect()
    }
}

/// Falls back to all destinations when the baseline filter leaves none.
#[derive(Debug, Default)]
pub struct HealthyOrPanicDestinationsPolicy {
    inner: HealthyAndUnknownDestinationsPolicy,
}

impl AvailableDestinationsPolicy for HealthyOrPanicDestinationsPolicy {
    fn name(&self) -> &'static str {
        HEALTHY_OR_PANIC
    }

    fn get_available_destinations(
        &self,
        config: &ClusterConfig,
        all: &[Arc<DestinationState>],
    ) -> Vec<Arc<DestinationState>> {
        let available = self.inner.get_available_destinations(config, all);
        if available.is_empty() {
            all.to_vec()
        } else {
            available
        }
    }
}

/// Registry of available destinations policies by name.
pub struct AvailableDestinationsPolicies {
    policies: HashMap<&'static str, Arc<dyn AvailableDestinationsPolicy>>,
}

impl AvailableDestinationsPolicies {
    /// Registry with the built-in policies.
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            policies: HashMap::new(),
        };
        registry.register(Arc::new(HealthyAndUnknownDestinationsPolicy));
        registry.register(Arc::new(HealthyOrPanicDestinationsPolicy::default()));
        registry
    }

    pub fn register(&mut self, policy: Arc<dyn AvailableDestinationsPolicy>) {
        self.policies.insert(policy.name(), policy);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn AvailableDestinationsPolicy>, HealthCheckError> {
        self.policies
            .get(name)
            .cloned()
            .ok_or_else(|| {
                HealthCheckError::InvalidConfiguration(format!(
                    "unknown available destinations policy '{name}'"
                ))
            })
    }

    /// Evaluate the named policy.
    pub fn evaluate(
        &self,
        name: &str,
        config: &ClusterConfig,
        all: &[Arc<DestinationState>],
    ) -> Result<Vec<Arc<DestinationState>>, HealthCheckError> {
        Ok(self.get(name)?.get_available_destinations(config, all))
    }
}

impl Default for AvailableDestinationsPolicies {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Recomputes and publishes a cluster's available destinations.
pub struct ClusterDestinationsUpdater {
    policies: AvailableDestinationsPolicies,
}

impl ClusterDestinationsUpdater {
    pub fn new(policies: AvailableDestinationsPolicies) -> Self {
        Self { policies }
    }

    /// Recompute availability from the current destination set.
    pub fn update_available_destinations(&self, cluster: &ClusterState) {
        let _guard = cluster.lock_updates();
        let all = cluster.destinations().all.clone();
        self.publish(cluster, all);
    }

    /// Replace the destination set and recompute availability.
    pub fn update_all_destinations(&self, cluster: &ClusterState, all: Vec<Arc<DestinationState>>) {
        let _guard = cluster.lock_updates();
        self.publish(cluster, all);
    }

    fn publish(&self, cluster: &ClusterState, all: Vec<Arc<DestinationState>>) {
        let model = cluster.model();
        let config = &model.config;
        let available = match self
            .policies
            .evaluate(&config.available_destinations_policy, config, &all)
        {
            Ok(available) => available,
            Err(e) => {
                tracing::warn!(
                    cluster = %cluster.cluster_id(),
                    error = %e,
                    fallback = HEALTHY_AND_UNKNOWN,
                    "Falling back to default available destinations policy"
                );
                HealthyAndUnknownDestinationsPolicy.get_available_destinations(config, &all)
            }
        };

        tracing::debug!(
            cluster = %cluster.cluster_id(),
            total = all.len(),
            available = available.len(),
            "Available destinations updated"
        );
        metrics::record_available_destinations(cluster.cluster_id(), available.len());

        cluster.publish_destinations(ClusterDestinationsState { all, available });
    }
}

impl Default for ClusterDestinationsUpdater {
    fn default() -> Self {
        Self::new(AvailableDestinationsPolicies::with_defaults())
    }
}
