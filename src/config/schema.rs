//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the health
//! control plane. All types derive Serde traits for deserialization from
//! config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Cluster definitions with their destinations.
    pub clusters: Vec<ClusterConfig>,

    /// Global health check options (policy defaults).
    pub health_check: HealthCheckOptions,

    /// Admin diagnostics API.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// A group of destinations that serve the same traffic.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ClusterConfig {
    /// Unique cluster identifier.
    pub id: String,

    /// Load balancing policy name.
    #[serde(default = "default_load_balancing_policy")]
    pub load_balancing_policy: String,

    /// Available destinations policy name.
    #[serde(default = "default_available_destinations_policy")]
    pub available_destinations_policy: String,

    /// Active and passive health check settings.
    #[serde(default)]
    pub health_check: ClusterHealthCheckConfig,

    /// Outbound request settings mirrored by health probes.
    #[serde(default)]
    pub http_request: HttpRequestConfig,

    /// Arbitrary metadata, used for policy overrides.
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Destinations in this cluster, in configuration order.
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,
}

impl ClusterConfig {
    /// Create a cluster with default policies and no destinations.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            load_balancing_policy: default_load_balancing_policy(),
            available_destinations_policy: default_available_destinations_policy(),
            health_check: ClusterHealthCheckConfig::default(),
            http_request: HttpRequestConfig::default(),
            metadata: HashMap::new(),
            destinations: Vec::new(),
        }
    }
}

fn default_load_balancing_policy() -> String {
    crate::load_balancer::POWER_OF_TWO_CHOICES.to_string()
}

fn default_available_destinations_policy() -> String {
    crate::health::availability::HEALTHY_AND_UNKNOWN.to_string()
}

/// A single backend replica.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DestinationConfig {
    /// Destination identifier, unique within the cluster.
    pub id: String,

    /// Primary address (e.g., "http://127.0.0.1:3000").
    pub address: String,

    /// Dedicated health probe address, if different from `address`.
    #[serde(default)]
    pub health: Option<String>,

    /// Host header override for requests to this destination.
    #[serde(default)]
    pub host: Option<String>,

    /// Arbitrary metadata, used for per-destination policy overrides.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl DestinationConfig {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            health: None,
            host: None,
            metadata: HashMap::new(),
        }
    }
}

/// Per-cluster health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ClusterHealthCheckConfig {
    pub active: ActiveHealthCheckConfig,
    pub passive: PassiveHealthCheckConfig,
}

/// Active (probe based) health checks.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ActiveHealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Probe interval in milliseconds.
    pub interval_ms: u64,

    /// Probe timeout in milliseconds.
    pub timeout_ms: u64,

    /// Evaluation policy name.
    pub policy: String,

    /// Path appended to the destination address.
    pub path: String,

    /// Optional query string (without the leading `?`).
    pub query: Option<String>,
}

impl ActiveHealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ActiveHealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 15_000,
            timeout_ms: 10_000,
            policy: crate::health::active::CONSECUTIVE_FAILURES.to_string(),
            path: "/".to_string(),
            query: None,
        }
    }
}

/// Passive (traffic based) health checks.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PassiveHealthCheckConfig {
    /// Enable passive health checks.
    pub enabled: bool,

    /// Evaluation policy name.
    pub policy: String,

    /// How long an unhealthy destination stays excluded before its passive
    /// health is reset to unknown. Policy default when unset.
    pub reactivation_period_ms: Option<u64>,
}

impl PassiveHealthCheckConfig {
    pub fn reactivation_period(&self) -> Option<Duration> {
        self.reactivation_period_ms.map(Duration::from_millis)
    }
}

impl Default for PassiveHealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            policy: crate::health::passive::TRANSPORT_FAILURE_RATE.to_string(),
            reactivation_period_ms: None,
        }
    }
}

/// Outbound HTTP request settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HttpRequestConfig {
    /// HTTP version ("1.0", "1.1", "2").
    pub version: String,

    /// How strictly the version is honoured.
    pub version_policy: VersionPolicy,
}

impl Default for HttpRequestConfig {
    fn default() -> Self {
        Self {
            version: "1.1".to_string(),
            version_policy: VersionPolicy::RequestVersionOrLower,
        }
    }
}

/// HTTP version negotiation policy.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
pub enum VersionPolicy {
    /// Use the requested version or downgrade.
    #[default]
    RequestVersionOrLower,
    /// Use the requested version or upgrade.
    RequestVersionOrHigher,
    /// Use exactly the requested version.
    RequestVersionExact,
}

/// Global health check options, the defaults policies fall back to.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct HealthCheckOptions {
    pub consecutive_failures: ConsecutiveFailuresOptions,
    pub transport_failure_rate: TransportFailureRateOptions,
    pub passive_consecutive_failures: PassiveConsecutiveFailuresOptions,
}

/// Options of the consecutive failures policies.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ConsecutiveFailuresOptions {
    /// Consecutive failures before a destination is marked unhealthy.
    pub default_threshold: u32,
}

impl Default for ConsecutiveFailuresOptions {
    fn default() -> Self {
        Self { default_threshold: 2 }
    }
}

/// Options of the transport failure rate policy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TransportFailureRateOptions {
    /// Sliding window the failure rate is computed over, in milliseconds.
    pub detection_window_ms: u64,

    /// Below this many requests in the window the rate is reported as zero.
    pub minimal_total_count_threshold: u64,

    /// Failure rate at or above which a destination is unhealthy.
    pub default_failure_rate_limit: f64,

    /// Reactivation period when the cluster does not configure one.
    pub default_reactivation_period_ms: u64,
}

impl TransportFailureRateOptions {
    pub fn detection_window(&self) -> Duration {
        Duration::from_millis(self.detection_window_ms)
    }

    pub fn default_reactivation_period(&self) -> Duration {
        Duration::from_millis(self.default_reactivation_period_ms)
    }
}

impl Default for TransportFailureRateOptions {
    fn default() -> Self {
        Self {
            detection_window_ms: 60_000,
            minimal_total_count_threshold: 10,
            default_failure_rate_limit: 0.3,
            default_reactivation_period_ms: 60_000,
        }
    }
}

/// Options of the passive consecutive failures policy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PassiveConsecutiveFailuresOptions {
    /// Reactivation period when the cluster does not configure one.
    pub default_reactivation_period_ms: u64,
}

impl PassiveConsecutiveFailuresOptions {
    pub fn default_reactivation_period(&self) -> Duration {
        Duration::from_millis(self.default_reactivation_period_ms)
    }
}

impl Default for PassiveConsecutiveFailuresOptions {
    fn default() -> Self {
        Self {
            default_reactivation_period_ms: 60_000,
        }
    }
}

/// Admin diagnostics API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
