//! Destination abstraction.
//!
//! # Responsibilities
//! - Represent a single backend replica of a cluster
//! - Publish its composite health for lock-free reads
//! - Track in-flight requests (for LeastRequests / PowerOfTwoChoices)
//! - Hold per-policy health state

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use url::Url;

use crate::cluster::policy_state::PolicyState;
use crate::config::DestinationConfig;
use crate::health::state::{AtomicCompositeHealth, CompositeHealth};

/// Immutable, parsed view of a destination's configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationModel {
    pub config: DestinationConfig,
    /// Parsed primary address.
    pub address: Url,
    /// Parsed dedicated health address, if configured.
    pub health_address: Option<Url>,
}

impl DestinationModel {
    /// Parse a destination configuration.
    pub fn from_config(config: DestinationConfig) -> Result<Self, url::ParseError> {
        let address = Url::parse(&config.address)?;
        let health_address = config.health.as_deref().map(Url::parse).transpose()?;
        Ok(Self {
            config,
            address,
            health_address,
        })
    }

    /// Address active probes are sent to.
    pub fn probe_address(&self) -> &Url {
        self.health_address.as_ref().unwrap_or(&self.address)
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.config.metadata
    }
}

/// In-flight request counter that never goes below zero.
#[derive(Debug, Default)]
pub struct ConcurrencyCounter {
    value: AtomicUsize,
}

impl ConcurrencyCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> usize {
        self.value.load(Ordering::Relaxed)
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement(&self) {
        let _ = self
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }
}

/// Runtime state of a single destination.
#[derive(Debug)]
pub struct DestinationState {
    destination_id: String,
    model: ArcSwap<DestinationModel>,
    health: AtomicCompositeHealth,
    concurrency: ConcurrencyCounter,
    policy_state: PolicyState,
}

impl DestinationState {
    /// Create a destination with unknown health and no requests in flight.
    pub fn new(model: DestinationModel) -> Self {
        Self {
            destination_id: model.config.id.clone(),
            model: ArcSwap::from_pointee(model),
            health: AtomicCompositeHealth::default(),
            concurrency: ConcurrencyCounter::new(),
            policy_state: PolicyState::new(),
        }
    }

    /// Convenience constructor from raw configuration.
    pub fn from_config(config: DestinationConfig) -> Result<Self, url::ParseError> {
        DestinationModel::from_config(config).map(Self::new)
    }

    pub fn destination_id(&self) -> &str {
        &self.destination_id
    }

    /// Current configuration snapshot.
    pub fn model(&self) -> Arc<DestinationModel> {
        self.model.load_full()
    }

    pub(crate) fn set_model(&self, model: DestinationModel) {
        self.model.store(Arc::new(model));
    }

    /// Current composite health.
    pub fn health(&self) -> CompositeHealth {
        self.health.load()
    }

    /// Atomic health cell. Writers outside the health updater must not
    /// use this; it bypasses availability recomputation.
    pub(crate) fn health_cell(&self) -> &AtomicCompositeHealth {
        &self.health
    }

    /// Number of requests currently in flight to this destination.
    pub fn concurrent_requests(&self) -> usize {
        self.concurrency.value()
    }

    pub fn concurrency(&self) -> &ConcurrencyCounter {
        &self.concurrency
    }

    pub fn policy_state(&self) -> &PolicyState {
        &self.policy_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_address_prefers_health() {
        let mut config = DestinationConfig::new("d1", "http://10.0.0.1:8080");
        let model = DestinationModel::from_config(config.clone()).unwrap();
        assert_eq!(model.probe_address().as_str(), "http://10.0.0.1:8080/");

        config.health = Some("http://10.0.0.1:9000".into());
        let model = DestinationModel::from_config(config).unwrap();
        assert_eq!(model.probe_address().as_str(), "http://10.0.0.1:9000/");
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        assert!(DestinationState::from_config(DestinationConfig::new("d1", "nope")).is_err());
    }

    #[test]
    fn test_concurrency_never_negative() {
        let counter = ConcurrencyCounter::new();
        counter.decrement();
        assert_eq!(counter.value(), 0);

        counter.increment();
        counter.increment();
        counter.decrement();
        assert_eq!(counter.value(), 1);
    }

    #[test]
    fn test_new_destination_is_unknown() {
        let destination =
            DestinationState::from_config(DestinationConfig::new("d1", "http://127.0.0.1:1")).unwrap();
        assert_eq!(destination.health(), CompositeHealth::default());
        assert_eq!(destination.concurrent_requests(), 0);
        assert_eq!(destination.destination_id(), "d1");
    }
}
