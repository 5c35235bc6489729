//! Power of two choices.
//!
//! Samples two distinct destinations at random and keeps the one with fewer
//! in-flight requests.

use std::sync::Arc;

use crate::cluster::{ClusterState, DestinationState};
use crate::load_balancer::{LoadBalancingPolicy, RandomSource, POWER_OF_TWO_CHOICES};

pub struct PowerOfTwoChoicesPolicy {
    random: Arc<dyn RandomSource>,
}

impl PowerOfTwoChoicesPolicy {
    pub fn new(random: Arc<dyn RandomSource>) -> Self {
        Self { random }
    }

    /// Two distinct indices in `0..len`. Requires `len >= 2`.
    fn sample(&self, len: usize) -> (usize, usize) {
        let first = self.random.next_index(len);
        let mut second = self.random.next_index(len - 1);
        if second >= first {
            second += 1;
        }
        (first, second)
    }
}

impl LoadBalancingPolicy for PowerOfTwoChoicesPolicy {
    fn name(&self) -> &'static str {
        POWER_OF_TWO_CHOICES
    }

    fn pick(
        &self,
        _cluster: &ClusterState,
        destinations: &[Arc<DestinationState>],
    ) -> Option<Arc<DestinationState>> {
        match destinations {
            [] => None,
            [only] => Some(only.clone()),
            _ => {
                let (a, b) = self.sample(destinations.len());
                let first = &destinations[a];
                let second = &destinations[b];
                if second.concurrent_requests() < first.concurrent_requests() {
                    Some(second.clone())
                } else {
                    Some(first.clone())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::test_support::cluster_of;
    use crate::load_balancer::test_random::SequenceRandom;
    use crate::load_balancer::ThreadRandom;

    #[test]
    fn test_picks_lower_count() {
        let cluster = cluster_of(2);
        let all = cluster.available_destinations();
        all[1].concurrency().increment();
        all[1].concurrency().increment();

        // Either sampling order must choose d1 (count 0 vs 2).
        let policy = PowerOfTwoChoicesPolicy::new(Arc::new(SequenceRandom::new([0, 0, 1, 0])));
        assert_eq!(policy.pick(&cluster, &all).unwrap().destination_id(), "d1");
        assert_eq!(policy.pick(&cluster, &all).unwrap().destination_id(), "d1");
    }

    #[test]
    fn test_samples_are_distinct() {
        let policy = PowerOfTwoChoicesPolicy::new(Arc::new(ThreadRandom));
        for _ in 0..200 {
            let (a, b) = policy.sample(3);
            assert_ne!(a, b);
            assert!(a < 3 && b < 3);
        }
    }

    #[test]
    fn test_sample_skips_first_index() {
        // first = 1, second draws 1 of 0..2 which shifts past the first to 2.
        let policy = PowerOfTwoChoicesPolicy::new(Arc::new(SequenceRandom::new([1, 1])));
        assert_eq!(policy.sample(3), (1, 2));
    }

    #[test]
    fn test_tie_keeps_first_sample() {
        let cluster = cluster_of(3);
        let all = cluster.available_destinations();
        let policy = PowerOfTwoChoicesPolicy::new(Arc::new(SequenceRandom::new([2, 0])));
        assert_eq!(policy.pick(&cluster, &all).unwrap().destination_id(), "d3");
    }
}
