//! Consecutive failure counting shared by the active and passive
//! consecutive failures policies.

use std::sync::Mutex;

use crate::config::ClusterConfig;
use crate::health::metadata::{self, ParsedMetadataCache};
use crate::health::state::DestinationHealth;

/// Per-destination failure streak.
#[derive(Debug, Default)]
pub struct ConsecutiveFailuresCounter {
    failures: Mutex<u32>,
}

impl ConsecutiveFailuresCounter {
    /// Record an outcome and return the resulting health.
    ///
    /// A success resets the streak. A failure extends it and reports
    /// unhealthy once the streak reaches `threshold`.
    pub fn record(&self, success: bool, threshold: u32) -> DestinationHealth {
        self.record_with(success, threshold, |health| health)
    }

    /// Like [`record`](Self::record), but hands the resulting health to
    /// `apply` while the streak is still locked, so concurrent outcomes for
    /// the same destination publish their health in the order they counted.
    pub fn record_with<R, F>(&self, success: bool, threshold: u32, apply: F) -> R
    where
        F: FnOnce(DestinationHealth) -> R,
    {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        let health = if success {
            *failures = 0;
            DestinationHealth::Healthy
        } else {
            *failures = failures.saturating_add(1);
            if *failures >= threshold {
                DestinationHealth::Unhealthy
            } else {
                DestinationHealth::Healthy
            }
        };
        apply(health)
    }

    pub fn failures(&self) -> u32 {
        *self.failures.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Per-cluster threshold override read from metadata.
#[derive(Debug, Default)]
pub struct ThresholdOverride {
    cache: ParsedMetadataCache<u32>,
}

impl ThresholdOverride {
    /// Cluster override, or `default` when absent or invalid.
    pub fn threshold(&self, config: &ClusterConfig, default: u32) -> u32 {
        let raw = config
            .metadata
            .get(metadata::CONSECUTIVE_FAILURES_THRESHOLD)
            .map(String::as_str);
        self.cache
            .get_or_parse(metadata::CONSECUTIVE_FAILURES_THRESHOLD, raw, metadata::parse_threshold)
            .unwrap_or(default)
    }
}
