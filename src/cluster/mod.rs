//! Clusters and destinations.
//!
//! # Data Flow
//! ```text
//! Configuration revision
//!     → registry.rs (diff: added / changed / removed)
//!     → state.rs (new immutable ClusterModel swapped in)
//!     → destination.rs (membership reconciled, state kept by id)
//!     → listeners notified (active monitor)
//! ```
//!
//! # Design Decisions
//! - Configuration is immutable once published; only health and counters change
//! - Each cluster and destination owns a per-policy state map
//! - The request path only reads published snapshots

pub mod destination;
pub mod policy_state;
pub mod registry;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use destination::{ConcurrencyCounter, DestinationModel, DestinationState};
pub use policy_state::PolicyState;
pub use registry::{ApplySummary, ClusterChangeListener, ClusterRegistry};
pub use state::{ClusterDestinationsState, ClusterModel, ClusterState};
