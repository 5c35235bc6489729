//! Passive health checking.
//!
//! # Data Flow
//! ```text
//! Request forwarded (dispatch lease completed)
//!     → PassiveHealthChecker::request_proxied(cluster, destination, outcome)
//!     → cluster's passive policy updates per-destination history
//!     → DestinationHealthUpdater::set_passive
//!     → ReactivationScheduler armed when unhealthy
//! ```
//!
//! # Design Decisions
//! - Policies serialize updates per destination; destinations never contend
//! - No I/O happens while a per-destination lock is held
//! - An unknown policy name falls back to the default policy
//! - Policy panics are caught; the request path never sees them

pub mod consecutive_failures;
pub mod failure_rate;
pub mod outcome;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashSet;

use crate::cluster::{ClusterState, DestinationState};
use crate::config::HealthCheckOptions;
use crate::health::clock::Clock;
use crate::health::updater::DestinationHealthUpdater;

pub use consecutive_failures::PassiveConsecutiveFailuresPolicy;
pub use failure_rate::TransportFailureRatePolicy;
pub use outcome::{ForwardError, ForwardOutcome};

/// Name of the sliding window failure rate policy.
pub const TRANSPORT_FAILURE_RATE: &str = "TransportFailureRate";

/// Name of the passive consecutive failures policy.
pub const CONSECUTIVE_FAILURES: &str = "ConsecutiveFailures";

/// Names accepted by configuration validation.
pub const KNOWN_POLICIES: &[&str] = &[TRANSPORT_FAILURE_RATE, CONSECUTIVE_FAILURES];

/// Evaluates destination health from proxied request outcomes.
///
/// Called concurrently, possibly for the same destination.
pub trait PassiveHealthCheckPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn request_proxied(
        &self,
        cluster: &Arc<ClusterState>,
        destination: &Arc<DestinationState>,
        outcome: &ForwardOutcome,
    );
}

/// Routes outcomes to the cluster's configured passive policy.
pub struct PassiveHealthChecker {
    policies: HashMap<&'static str, Arc<dyn PassiveHealthCheckPolicy>>,
    fallback: Arc<dyn PassiveHealthCheckPolicy>,
    warned: DashSet<String>,
}

impl PassiveHealthChecker {
    /// `fallback` is used for clusters naming an unknown policy.
    pub fn new(
        policies: impl IntoIterator<Item = Arc<dyn PassiveHealthCheckPolicy>>,
        fallback: Arc<dyn PassiveHealthCheckPolicy>,
    ) -> Self {
        Self {
            policies: policies.into_iter().map(|p| (p.name(), p)).collect(),
            fallback,
            warned: DashSet::new(),
        }
    }

    /// Checker with both built-in policies; the failure rate policy is the fallback.
    pub fn with_defaults(
        options: &HealthCheckOptions,
        clock: Arc<dyn Clock>,
        health_updater: Arc<DestinationHealthUpdater>,
    ) -> Self {
        let failure_rate: Arc<dyn PassiveHealthCheckPolicy> = Arc::new(TransportFailureRatePolicy::new(
            options.transport_failure_rate.clone(),
            clock,
            health_updater.clone(),
        ));
        let consecutive: Arc<dyn PassiveHealthCheckPolicy> = Arc::new(PassiveConsecutiveFailuresPolicy::new(
            options.consecutive_failures.clone(),
            options.passive_consecutive_failures.clone(),
            health_updater,
        ));
        Self::new([failure_rate.clone(), consecutive], failure_rate)
    }

    fn policy(&self, name: &str) -> &Arc<dyn PassiveHealthCheckPolicy> {
        match self.policies.get(name) {
            Some(policy) => policy,
            None => {
                if self.warned.insert(name.to_string()) {
                    tracing::warn!(
                        policy = %name,
                        fallback = self.fallback.name(),
                        "Unknown passive health check policy, using fallback"
                    );
                }
                &self.fallback
            }
        }
    }

    /// Report the outcome of a proxied request.
    pub fn request_proxied(
        &self,
        cluster: &Arc<ClusterState>,
        destination: &Arc<DestinationState>,
        outcome: &ForwardOutcome,
    ) {
        let model = cluster.model();
        let passive = &model.config.health_check.passive;
        if !passive.enabled {
            return;
        }

        let policy = self.policy(&passive.policy);
        let evaluated = std::panic::catch_unwind(AssertUnwindSafe(|| {
            policy.request_proxied(cluster, destination, outcome);
        }));
        if evaluated.is_err() {
            tracing::error!(
                cluster = %cluster.cluster_id(),
                destination = %destination.destination_id(),
                policy = policy.name(),
                "Passive health check policy panicked, keeping previous health"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::test_support::{cluster_of, health_updater};
    use crate::cluster::ClusterModel;
    use crate::health::clock::MonotonicClock;
    use crate::health::state::DestinationHealth;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingPolicy {
        calls: AtomicUsize,
    }

    impl PassiveHealthCheckPolicy for CountingPolicy {
        fn name(&self) -> &'static str {
            "Counting"
        }

        fn request_proxied(&self, _: &Arc<ClusterState>, _: &Arc<DestinationState>, _: &ForwardOutcome) {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first call fails");
            }
        }
    }

    fn enable_passive(cluster: &ClusterState, policy: &str) {
        let mut model = ClusterModel::new(cluster.model().config.clone(), cluster.model().transport.clone());
        model.config.health_check.passive.enabled = true;
        model.config.health_check.passive.policy = policy.into();
        cluster.set_model(model);
    }

    #[tokio::test]
    async fn test_disabled_passive_is_ignored() {
        let counting = Arc::new(CountingPolicy::default());
        let checker = PassiveHealthChecker::new([counting.clone() as Arc<dyn PassiveHealthCheckPolicy>], counting.clone());
        let cluster = cluster_of(1);
        let d1 = cluster.all_destinations()[0].clone();

        checker.request_proxied(&cluster, &d1, &ForwardOutcome::Success);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_policy_uses_fallback_and_survives_panics() {
        let counting = Arc::new(CountingPolicy::default());
        let checker = PassiveHealthChecker::new(Vec::<Arc<dyn PassiveHealthCheckPolicy>>::new(), counting.clone());
        let cluster = cluster_of(1);
        enable_passive(&cluster, "Missing");
        let d1 = cluster.all_destinations()[0].clone();

        checker.request_proxied(&cluster, &d1, &ForwardOutcome::Success);
        checker.request_proxied(&cluster, &d1, &ForwardOutcome::Success);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_default_policies_are_routed_by_name() {
        let checker = PassiveHealthChecker::with_defaults(
            &HealthCheckOptions::default(),
            Arc::new(MonotonicClock::new()),
            health_updater(),
        );
        let cluster = cluster_of(1);
        enable_passive(&cluster, CONSECUTIVE_FAILURES);
        let d1 = cluster.all_destinations()[0].clone();

        let failure = ForwardOutcome::Failed(ForwardError::Request);
        checker.request_proxied(&cluster, &d1, &failure);
        assert_eq!(d1.health().passive, DestinationHealth::Healthy);
        checker.request_proxied(&cluster, &d1, &failure);
        assert_eq!(d1.health().passive, DestinationHealth::Unhealthy);
        assert!(cluster.available_destinations().is_empty());
    }
}
