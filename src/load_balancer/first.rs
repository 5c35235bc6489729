//! First available destination.

use std::sync::Arc;

use crate::cluster::{ClusterState, DestinationState};
use crate::load_balancer::{LoadBalancingPolicy, FIRST};

#[derive(Debug, Default, Clone, Copy)]
pub struct FirstPolicy;

impl LoadBalancingPolicy for FirstPolicy {
    fn name(&self) -> &'static str {
        FIRST
    }

    fn pick(
        &self,
        _cluster: &ClusterState,
        destinations: &[Arc<DestinationState>],
    ) -> Option<Arc<DestinationState>> {
        destinations.first().cloned()
    }
}
