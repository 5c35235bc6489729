//! Passive consecutive failures policy.
//!
//! The same streak counting as the active policy, driven by live traffic.
//! Outcomes that say nothing about the destination (client aborts, client
//! body errors) neither extend nor reset the streak.

use std::sync::Arc;

use crate::cluster::{ClusterState, DestinationState};
use crate::config::{ConsecutiveFailuresOptions, PassiveConsecutiveFailuresOptions};
use crate::health::consecutive::{ConsecutiveFailuresCounter, ThresholdOverride};
use crate::health::passive::{ForwardOutcome, PassiveHealthCheckPolicy, CONSECUTIVE_FAILURES};
use crate::health::updater::DestinationHealthUpdater;

const COUNTER_KEY: &str = "passive.consecutive_failures";
const THRESHOLD_KEY: &str = "passive.consecutive_failures.threshold";

pub struct PassiveConsecutiveFailuresPolicy {
    options: ConsecutiveFailuresOptions,
    passive_options: PassiveConsecutiveFailuresOptions,
    health_updater: Arc<DestinationHealthUpdater>,
}

impl PassiveConsecutiveFailuresPolicy {
    pub fn new(
        options: ConsecutiveFailuresOptions,
        passive_options: PassiveConsecutiveFailuresOptions,
        health_updater: Arc<DestinationHealthUpdater>,
    ) -> Self {
        Self {
            options,
            passive_options,
            health_updater,
        }
    }
}

impl PassiveHealthCheckPolicy for PassiveConsecutiveFailuresPolicy {
    fn name(&self) -> &'static str {
        CONSECUTIVE_FAILURES
    }

    fn request_proxied(
        &self,
        cluster: &Arc<ClusterState>,
        destination: &Arc<DestinationState>,
        outcome: &ForwardOutcome,
    ) {
        if outcome.is_inconclusive() {
            return;
        }

        let model = cluster.model();
        let threshold = cluster
            .policy_state()
            .get_or_init(THRESHOLD_KEY, ThresholdOverride::default)
            .threshold(&model.config, self.options.default_threshold);
        let period = model
            .config
            .health_check
            .passive
            .reactivation_period()
            .unwrap_or_else(|| self.passive_options.default_reactivation_period());

        destination
            .policy_state()
            .get_or_init(COUNTER_KEY, ConsecutiveFailuresCounter::default)
            .record_with(outcome.is_success(), threshold, |new_health| {
                self.health_updater
                    .set_passive(cluster, destination, new_health, period);
            });
    }
}
