//! Uniform random selection.

use std::sync::Arc;

use crate::cluster::{ClusterState, DestinationState};
use crate::load_balancer::{LoadBalancingPolicy, RandomSource, RANDOM};

pub struct RandomPolicy {
    random: Arc<dyn RandomSource>,
}

impl RandomPolicy {
    pub fn new(random: Arc<dyn RandomSource>) -> Self {
        Self { random }
    }
}

impl LoadBalancingPolicy for RandomPolicy {
    fn name(&self) -> &'static str {
        RANDOM
    }

    fn pick(
        &self,
        _cluster: &ClusterState,
        destinations: &[Arc<DestinationState>],
    ) -> Option<Arc<DestinationState>> {
        if destinations.is_empty() {
            return None;
        }
        destinations
            .get(self.random.next_index(destinations.len()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::test_support::{cluster_of, destination_ids};
    use crate::load_balancer::test_random::SequenceRandom;
    use crate::load_balancer::ThreadRandom;

    #[test]
    fn test_uses_random_index() {
        let cluster = cluster_of(3);
        let all = cluster.available_destinations();
        let policy = RandomPolicy::new(Arc::new(SequenceRandom::new([2, 0, 1])));
        let picked: Vec<_> = (0..3).filter_map(|_| policy.pick(&cluster, &all)).collect();
        assert_eq!(destination_ids(&picked), vec!["d3", "d1", "d2"]);
    }

    #[test]
    fn test_thread_random_reaches_every_destination() {
        let cluster = cluster_of(3);
        let all = cluster.available_destinations();
        let policy = RandomPolicy::new(Arc::new(ThreadRandom));
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.insert(policy.pick(&cluster, &all).unwrap().destination_id().to_string());
        }
        assert_eq!(seen.len(), 3);
    }
}
