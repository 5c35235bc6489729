//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks: policy names, addresses, overrides)
//!     → ProxyConfig (validated, immutable)
//!     → ClusterRegistry::apply (diff → added / changed / removed)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → new cluster list delivered over a channel
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Unknown policy names are rejected here, never at request time

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ActiveHealthCheckConfig, AdminConfig, ClusterConfig, ClusterHealthCheckConfig,
    ConsecutiveFailuresOptions, DestinationConfig, HealthCheckOptions, HttpRequestConfig,
    ObservabilityConfig, PassiveConsecutiveFailuresOptions, PassiveHealthCheckConfig,
    ProxyConfig, TransportFailureRateOptions, VersionPolicy,
};
pub use validation::ValidationError;
