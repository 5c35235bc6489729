//! Transport failure rate policy.
//!
//! Tracks, per destination, failed and total proxied requests inside a
//! sliding detection window. The destination is unhealthy while the failure
//! rate is at or above the limit.
//!
//! # Design Decisions
//! - Requests are accumulated into one-second buckets; a bucket is pushed
//!   onto the history only once its second has elapsed
//! - Running totals are kept so evaluating the rate never rescans the history
//! - Below the minimal request count the rate is reported as zero

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cluster::{ClusterState, DestinationState};
use crate::config::TransportFailureRateOptions;
use crate::health::clock::Clock;
use crate::health::metadata::{self, ParsedMetadataCache};
use crate::health::passive::{ForwardOutcome, PassiveHealthCheckPolicy, TRANSPORT_FAILURE_RATE};
use crate::health::state::DestinationHealth;
use crate::health::updater::DestinationHealthUpdater;

const BUCKET: Duration = Duration::from_secs(1);

const DESTINATION_KEY: &str = "passive.transport_failure_rate";
const CLUSTER_KEY: &str = "passive.transport_failure_rate.rate_limit";

#[derive(Debug, Clone, Copy)]
struct HistoryRecord {
    recorded_at: Duration,
    total: u64,
    failed: u64,
}

/// Sliding window of request outcomes for one destination.
#[derive(Debug, Default)]
pub struct ProxiedRequestHistory {
    records: VecDeque<HistoryRecord>,
    current: Option<HistoryRecord>,
    total: u64,
    failed: u64,
}

impl ProxiedRequestHistory {
    /// Record an outcome observed at `now` and return the failure rate.
    pub fn add(&mut self, now: Duration, failed: bool, window: Duration, minimal_total: u64) -> f64 {
        match self.current.as_mut() {
            Some(bucket) if now < bucket.recorded_at + BUCKET => {
                bucket.total += 1;
                bucket.failed += u64::from(failed);
            }
            _ => {
                if let Some(finished) = self.current.take() {
                    self.records.push_back(finished);
                }
                self.current = Some(HistoryRecord {
                    recorded_at: now,
                    total: 1,
                    failed: u64::from(failed),
                });
            }
        }
        self.total += 1;
        self.failed += u64::from(failed);

        while let Some(oldest) = self.records.front() {
            if now.saturating_sub(oldest.recorded_at) <= window {
                break;
            }
            self.total -= oldest.total;
            self.failed -= oldest.failed;
            self.records.pop_front();
        }

        self.rate(minimal_total)
    }

    /// Current failure rate.
    pub fn rate(&self, minimal_total: u64) -> f64 {
        if self.total == 0 || self.total < minimal_total {
            return 0.0;
        }
        self.failed as f64 / self.total as f64
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }
}

#[derive(Debug, Default)]
struct DestinationFailureState {
    history: Mutex<ProxiedRequestHistory>,
    rate_limit: ParsedMetadataCache<f64>,
}

pub struct TransportFailureRatePolicy {
    options: TransportFailureRateOptions,
    clock: Arc<dyn Clock>,
    health_updater: Arc<DestinationHealthUpdater>,
}

impl TransportFailureRatePolicy {
    pub fn new(
        options: TransportFailureRateOptions,
        clock: Arc<dyn Clock>,
        health_updater: Arc<DestinationHealthUpdater>,
    ) -> Self {
        Self {
            options,
            clock,
            health_updater,
        }
    }

    /// Destination override, then cluster override, then the default.
    fn rate_limit(&self, cluster: &ClusterState, destination: &DestinationState, state: &DestinationFailureState) -> f64 {
        let destination_model = destination.model();
        let raw = destination_model
            .metadata()
            .get(metadata::FAILURE_RATE_LIMIT)
            .map(String::as_str);
        if let Some(limit) = state
            .rate_limit
            .get_or_parse(metadata::FAILURE_RATE_LIMIT, raw, metadata::parse_rate_limit)
        {
            return limit;
        }

        let cluster_model = cluster.model();
        let raw = cluster_model
            .config
            .metadata
            .get(metadata::FAILURE_RATE_LIMIT)
            .map(String::as_str);
        cluster
            .policy_state()
            .get_or_init(CLUSTER_KEY, ParsedMetadataCache::<f64>::new)
            .get_or_parse(metadata::FAILURE_RATE_LIMIT, raw, metadata::parse_rate_limit)
            .unwrap_or(self.options.default_failure_rate_limit)
    }
}

impl PassiveHealthCheckPolicy for TransportFailureRatePolicy {
    fn name(&self) -> &'static str {
        TRANSPORT_FAILURE_RATE
    }

    fn request_proxied(
        &self,
        cluster: &Arc<ClusterState>,
        destination: &Arc<DestinationState>,
        outcome: &ForwardOutcome,
    ) {
        let state = destination
            .policy_state()
            .get_or_init(DESTINATION_KEY, DestinationFailureState::default);
        let limit = self.rate_limit(cluster, destination, &state);

        let period = cluster
            .model()
            .config
            .health_check
            .passive
            .reactivation_period()
            .unwrap_or_else(|| self.options.default_reactivation_period());

        // Held until the health is published so outcomes for one destination
        // land in the order they were counted.
        let mut history = state.history.lock().unwrap_or_else(|e| e.into_inner());
        let rate = history.add(
            self.clock.tick_count(),
            outcome.is_destination_failure(),
            self.options.detection_window(),
            self.options.minimal_total_count_threshold,
        );

        let new_health = if rate < limit {
            DestinationHealth::Healthy
        } else {
            DestinationHealth::Unhealthy
        };
        if new_health == DestinationHealth::Unhealthy {
            tracing::debug!(
                cluster = %cluster.cluster_id(),
                destination = %destination.destination_id(),
                rate = rate,
                limit = limit,
                "Failure rate limit reached"
            );
        }

        self.health_updater
            .set_passive(cluster, destination, new_health, period);
        drop(history);
    }
}
