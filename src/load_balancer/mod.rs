//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher has the cluster's available destinations
//!     → LoadBalancer resolves the cluster's policy by name
//!     → 0 destinations: nothing to pick
//!     → 1 destination: returned directly
//!     → otherwise the policy picks:
//!         - first.rs (always index 0)
//!         - random.rs (uniform index)
//!         - round_robin.rs (cluster-wide rotating cursor)
//!         - least_requests.rs (fewest in-flight requests)
//!         - power_of_two.rs (best of two random samples)
//! ```
//!
//! # Design Decisions
//! - Policies are stateless; rotation state lives on the cluster
//! - Picking never touches concurrency counters; the dispatch lease does
//! - An unknown policy name is an error, never a silent fallback

pub mod first;
pub mod least_requests;
pub mod power_of_two;
pub mod random;
pub mod round_robin;

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use thiserror::Error;

use crate::cluster::{ClusterState, DestinationState};

pub use first::FirstPolicy;
pub use least_requests::LeastRequestsPolicy;
pub use power_of_two::PowerOfTwoChoicesPolicy;
pub use random::RandomPolicy;
pub use round_robin::RoundRobinPolicy;

pub const FIRST: &str = "First";
pub const RANDOM: &str = "Random";
pub const ROUND_ROBIN: &str = "RoundRobin";
pub const LEAST_REQUESTS: &str = "LeastRequests";
pub const POWER_OF_TWO_CHOICES: &str = "PowerOfTwoChoices";

pub const KNOWN_POLICIES: &[&str] = &[
    FIRST,
    RANDOM,
    ROUND_ROBIN,
    LEAST_REQUESTS,
    POWER_OF_TWO_CHOICES,
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadBalancerError {
    #[error("unknown load balancing policy '{0}'")]
    UnknownPolicy(String),
}

/// A destination selection algorithm.
///
/// Only called with two or more destinations.
pub trait LoadBalancingPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn pick(
        &self,
        cluster: &ClusterState,
        destinations: &[Arc<DestinationState>],
    ) -> Option<Arc<DestinationState>>;
}

/// Source of random indices.
pub trait RandomSource: Send + Sync {
    /// A uniformly distributed index in `0..upper`. `upper` is never zero.
    fn next_index(&self, upper: usize) -> usize;
}

/// Thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_index(&self, upper: usize) -> usize {
        rand::thread_rng().gen_range(0..upper)
    }
}

/// Name to policy dispatch.
pub struct LoadBalancer {
    policies: HashMap<&'static str, Arc<dyn LoadBalancingPolicy>>,
}

impl LoadBalancer {
    /// All built-in policies backed by the thread RNG.
    pub fn with_defaults() -> Self {
        Self::with_random(Arc::new(ThreadRandom))
    }

    /// All built-in policies sharing `random`.
    pub fn with_random(random: Arc<dyn RandomSource>) -> Self {
        let mut lb = Self {
            policies: HashMap::new(),
        };
        lb.register(Arc::new(FirstPolicy));
        lb.register(Arc::new(RandomPolicy::new(random.clone())));
        lb.register(Arc::new(RoundRobinPolicy));
        lb.register(Arc::new(LeastRequestsPolicy));
        lb.register(Arc::new(PowerOfTwoChoicesPolicy::new(random)));
        lb
    }

    pub fn register(&mut self, policy: Arc<dyn LoadBalancingPolicy>) {
        self.policies.insert(policy.name(), policy);
    }

    pub fn policy(&self, name: &str) -> Result<&Arc<dyn LoadBalancingPolicy>, LoadBalancerError> {
        self.policies
            .get(name)
            .ok_or_else(|| LoadBalancerError::UnknownPolicy(name.to_string()))
    }

    /// Pick one of `available` using the policy named `mode`.
    pub fn pick_destination(
        &self,
        cluster: &ClusterState,
        available: &[Arc<DestinationState>],
        mode: &str,
    ) -> Result<Option<Arc<DestinationState>>, LoadBalancerError> {
        let policy = self.policy(mode)?;
        Ok(match available {
            [] => None,
            [only] => Some(only.clone()),
            _ => policy.pick(cluster, available),
        })
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::with_defaults()
    }
}
