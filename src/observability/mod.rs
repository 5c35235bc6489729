//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Health subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (gauges, counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Library code only emits events; the daemon installs the subscriber and exporter
//! - Metric updates are cheap and safe to call when no recorder is installed

pub mod logging;
pub mod metrics;
