//! Destination health management and selection for a reverse proxy.

pub mod admin;
pub mod cluster;
pub mod config;
pub mod dispatch;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;

pub use cluster::{ClusterRegistry, ClusterState, DestinationState};
pub use config::ProxyConfig;
pub use dispatch::{DispatchError, DispatchLease, Dispatcher};
pub use lifecycle::{HealthServices, Shutdown};
pub use load_balancer::LoadBalancer;
