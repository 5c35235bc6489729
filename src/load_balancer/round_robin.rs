//! Round-robin load balancing strategy.

use std::sync::Arc;

use crate::cluster::{ClusterState, DestinationState};
use crate::load_balancer::{LoadBalancingPolicy, ROUND_ROBIN};

/// Round-robin selector.
/// The rotating counter is owned by the cluster, so it survives across calls
/// and configuration changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobinPolicy;

impl LoadBalancingPolicy for RoundRobinPolicy {
    fn name(&self) -> &'static str {
        ROUND_ROBIN
    }

    fn pick(
        &self,
        cluster: &ClusterState,
        destinations: &[Arc<DestinationState>],
    ) -> Option<Arc<DestinationState>> {
        if destinations.is_empty() {
            return None;
        }
        let index = cluster.next_round_robin() % destinations.len();
        destinations.get(index).cloned()
    }
}
