//! Least requests load balancing strategy.

use std::sync::Arc;

use crate::cluster::{ClusterState, DestinationState};
use crate::load_balancer::{LoadBalancingPolicy, LEAST_REQUESTS};

/// Selects the destination with the fewest in-flight requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastRequestsPolicy;

impl LoadBalancingPolicy for LeastRequestsPolicy {
    fn name(&self) -> &'static str {
        LEAST_REQUESTS
    }

    fn pick(
        &self,
        _cluster: &ClusterState,
        destinations: &[Arc<DestinationState>],
    ) -> Option<Arc<DestinationState>> {
        // min_by_key keeps the first of equal elements.
        destinations
            .iter()
            .min_by_key(|d| d.concurrent_requests())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::test_support::cluster_of;

    #[test]
    fn test_least_requests() {
        let cluster = cluster_of(2);
        let all = cluster.available_destinations();
        let (d1, d2) = (all[0].clone(), all[1].clone());

        d1.concurrency().increment();
        let picked = LeastRequestsPolicy.pick(&cluster, &all).unwrap();
        assert_eq!(picked.destination_id(), "d2");

        d2.concurrency().increment();
        d2.concurrency().increment();
        let picked = LeastRequestsPolicy.pick(&cluster, &all).unwrap();
        assert_eq!(picked.destination_id(), "d1");
    }

    #[test]
    fn test_tie_picks_first() {
        let cluster = cluster_of(3);
        let all = cluster.available_destinations();
        all[0].concurrency().increment();
        let picked = LeastRequestsPolicy.pick(&cluster, &all).unwrap();
        assert_eq!(picked.destination_id(), "d2");
    }
}
