//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active/):
//!     Per-cluster timer (scheduler.rs)
//!     → Probe every destination
//!     → Policy evaluates the whole pass
//!     → updater.rs sets active health
//!
//! Passive health checks (passive/):
//!     Proxied request completed
//!     → Policy updates per-destination history
//!     → updater.rs sets passive health
//!     → reactivation.rs resets it to unknown after a grace period
//!
//! Availability (availability.rs):
//!     Any health or membership change
//!     → Recompute the cluster's available destinations snapshot
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary and tracked separately
//! - Health flips only after a policy-defined streak or rate, not on a single blip
//! - Health state is per destination; availability is per cluster

pub mod active;
pub mod availability;
pub mod clock;
pub mod consecutive;
pub mod error;
pub mod metadata;
pub mod passive;
pub mod reactivation;
pub mod scheduler;
pub mod state;
pub mod updater;

pub use availability::{AvailableDestinationsPolicy, ClusterDestinationsUpdater};
pub use clock::{Clock, MonotonicClock};
pub use error::{HealthCheckError, ProbeError};
pub use reactivation::ReactivationScheduler;
pub use scheduler::EntityActionScheduler;
pub use state::{CompositeHealth, DestinationHealth};
pub use updater::DestinationHealthUpdater;
