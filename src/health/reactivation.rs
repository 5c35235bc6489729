//! Passive health reactivation.
//!
//! A destination marked unhealthy by a passive policy is given a grace
//! period, after which its passive health returns to unknown and it becomes
//! eligible for traffic again.
//!
//! # Data Flow
//! ```text
//! schedule(cluster, destination, period)
//!     → deadline = now + period (soonest pending deadline wins)
//!     → pending set ordered by deadline
//!     → single shared timer armed for the earliest deadline
//!
//! timer fires
//!     → every due entry: passive Unhealthy → Unknown
//!     → affected clusters recompute available destinations
//!     → timer rearmed for the next deadline, if any
//! ```
//!
//! # Design Decisions
//! - One timer for all pending entries, driven by the generic scheduler in
//!   one-shot mode with a single key
//! - A destination has at most one pending entry
//! - A destination that already recovered is left alone when its entry fires
//! - Deadlines are taken from Tokio's clock, the same clock the timer sleeps
//!   on, so paused test time drives both

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::time::Instant;

use crate::cluster::{ClusterState, DestinationState};
use crate::health::availability::ClusterDestinationsUpdater;
use crate::health::scheduler::EntityActionScheduler;
use crate::health::state::DestinationHealth;
use crate::observability::metrics;

type DestinationKey = (String, String);
type DeadlineKey = (Instant, u64);

struct PendingEntry {
    cluster: Arc<ClusterState>,
    destination: Arc<DestinationState>,
}

#[derive(Default)]
struct PendingReactivations {
    by_deadline: BTreeMap<DeadlineKey, PendingEntry>,
    by_destination: HashMap<DestinationKey, DeadlineKey>,
    next_seq: u64,
}

impl PendingReactivations {
    fn earliest(&self) -> Option<Instant> {
        self.by_deadline.keys().next().map(|(deadline, _)| *deadline)
    }

    fn remove(&mut self, key: &DestinationKey) -> bool {
        match self.by_destination.remove(key) {
            Some(deadline) => {
                self.by_deadline.remove(&deadline);
                true
            }
            None => false,
        }
    }

    fn take_due(&mut self, now: Instant) -> Vec<PendingEntry> {
        let mut due = Vec::new();
        while let Some(entry) = self.by_deadline.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let entry = entry.remove();
            self.by_destination.remove(&(
                entry.cluster.cluster_id().to_string(),
                entry.destination.destination_id().to_string(),
            ));
            due.push(entry);
        }
        due
    }
}

/// Resets passive health of unhealthy destinations after their grace period.
pub struct ReactivationScheduler {
    destinations_updater: Arc<ClusterDestinationsUpdater>,
    timer: EntityActionScheduler<()>,
    pending: Mutex<PendingReactivations>,
}

impl ReactivationScheduler {
    pub fn new(destinations_updater: Arc<ClusterDestinationsUpdater>) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let this = this.clone();
            let timer = EntityActionScheduler::new(
                move |_: ()| {
                    let this = this.clone();
                    async move {
                        if let Some(scheduler) = this.upgrade() {
                            scheduler.fire();
                        }
                        Ok(())
                    }
                },
                true,
                true,
            );
            Self {
                destinations_updater,
                timer,
                pending: Mutex::new(PendingReactivations::default()),
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, PendingReactivations> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reactivate `destination` after `period`, unless an earlier
    /// reactivation is already pending.
    pub fn schedule(&self, cluster: &Arc<ClusterState>, destination: &Arc<DestinationState>, period: Duration) {
        let now = Instant::now();
        let deadline = now + period;
        let key = (
            cluster.cluster_id().to_string(),
            destination.destination_id().to_string(),
        );

        let mut pending = self.lock();
        if let Some((existing, _)) = pending.by_destination.get(&key) {
            if *existing <= deadline {
                return;
            }
        }
        pending.remove(&key);

        let seq = pending.next_seq;
        pending.next_seq += 1;
        pending.by_deadline.insert(
            (deadline, seq),
            PendingEntry {
                cluster: cluster.clone(),
                destination: destination.clone(),
            },
        );
        pending.by_destination.insert(key, (deadline, seq));

        if pending.earliest() == Some(deadline) {
            self.arm(deadline, now);
        }

        tracing::debug!(
            cluster = %cluster.cluster_id(),
            destination = %destination.destination_id(),
            period_ms = period.as_millis() as u64,
            "Reactivation scheduled"
        );
    }

    /// Drop the pending entry of a destination.
    pub fn cancel(&self, cluster_id: &str, destination_id: &str) -> bool {
        self.lock()
            .remove(&(cluster_id.to_string(), destination_id.to_string()))
    }

    /// Drop every pending entry of a cluster. Returns how many were removed.
    pub fn cancel_cluster(&self, cluster_id: &str) -> usize {
        let mut pending = self.lock();
        let keys: Vec<DestinationKey> = pending
            .by_destination
            .keys()
            .filter(|(cluster, _)| cluster == cluster_id)
            .cloned()
            .collect();
        for key in &keys {
            pending.remove(key);
        }
        keys.len()
    }

    pub fn is_pending(&self, cluster_id: &str, destination_id: &str) -> bool {
        self.lock()
            .by_destination
            .contains_key(&(cluster_id.to_string(), destination_id.to_string()))
    }

    pub fn pending_count(&self) -> usize {
        self.lock().by_deadline.len()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.lock().earliest()
    }

    /// Stop the timer and forget every pending entry.
    pub fn shutdown(&self) {
        self.timer.shutdown();
        let mut pending = self.lock();
        pending.by_deadline.clear();
        pending.by_destination.clear();
    }

    /// Must be called with the pending lock held.
    fn arm(&self, deadline: Instant, now: Instant) {
        self.timer
            .schedule_entity((), deadline.saturating_duration_since(now));
    }

    fn fire(&self) {
        let now = Instant::now();
        let due = {
            let mut pending = self.lock();
            let due = pending.take_due(now);
            if let Some(next) = pending.earliest() {
                self.arm(next, now);
            }
            due
        };

        let mut affected: Vec<Arc<ClusterState>> = Vec::new();
        for entry in due {
            if self.reactivate(&entry) && !affected.iter().any(|c| Arc::ptr_eq(c, &entry.cluster)) {
                affected.push(entry.cluster);
            }
        }
        for cluster in affected {
            self.destinations_updater.update_available_destinations(&cluster);
        }
    }

    fn reactivate(&self, entry: &PendingEntry) -> bool {
        let (previous, current) = entry.destination.health_cell().update(|health| {
            if health.passive == DestinationHealth::Unhealthy {
                health.change_passive(DestinationHealth::Unknown)
            } else {
                health
            }
        });
        if previous == current {
            return false;
        }

        tracing::info!(
            cluster = %entry.cluster.cluster_id(),
            destination = %entry.destination.destination_id(),
            "Destination reactivated, passive health reset to unknown"
        );
        metrics::record_destination_health(
            entry.cluster.cluster_id(),
            entry.destination.destination_id(),
            metrics::PASSIVE,
            current.passive,
        );
        metrics::record_reactivation(entry.cluster.cluster_id());
        true
    }
}
