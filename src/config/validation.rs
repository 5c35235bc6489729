//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject unknown policy names of every kind
//! - Validate value ranges (intervals > 0, failure rate limit in (0, 1])
//! - Validate metadata overrides with the same parsers the policies use
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::{ClusterConfig, DestinationConfig, ProxyConfig};
use crate::health::{active, availability, metadata, passive};
use crate::load_balancer;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("duplicate cluster id '{0}'")]
    DuplicateCluster(String),

    #[error("cluster '{cluster}': duplicate destination id '{destination}'")]
    DuplicateDestination { cluster: String, destination: String },

    #[error("cluster '{cluster}': destination '{destination}' has invalid {field} '{value}'")]
    InvalidAddress {
        cluster: String,
        destination: String,
        field: &'static str,
        value: String,
    },

    #[error("cluster '{cluster}': unknown {kind} policy '{name}'")]
    UnknownPolicy {
        cluster: String,
        kind: &'static str,
        name: String,
    },

    #[error("cluster '{cluster}': {field} must be greater than zero")]
    ZeroDuration { cluster: String, field: &'static str },

    #[error("cluster '{cluster}': unsupported HTTP version '{value}'")]
    InvalidHttpVersion { cluster: String, value: String },

    #[error("{owner}: metadata '{key}' has invalid value '{value}'")]
    InvalidMetadata {
        owner: String,
        key: &'static str,
        value: String,
    },

    #[error("health_check: {0}")]
    InvalidOption(String),
}

/// Validate the whole configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_options(config, &mut errors);

    let mut seen = HashSet::new();
    for cluster in &config.clusters {
        if !seen.insert(cluster.id.as_str()) {
            errors.push(ValidationError::DuplicateCluster(cluster.id.clone()));
        }
        validate_cluster(cluster, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_options(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    let options = &config.health_check;
    if options.consecutive_failures.default_threshold == 0 {
        errors.push(ValidationError::InvalidOption(
            "consecutive_failures.default_threshold must be greater than zero".to_string(),
        ));
    }
    let rate = &options.transport_failure_rate;
    if !(rate.default_failure_rate_limit > 0.0 && rate.default_failure_rate_limit <= 1.0) {
        errors.push(ValidationError::InvalidOption(format!(
            "transport_failure_rate.default_failure_rate_limit {} is outside (0, 1]",
            rate.default_failure_rate_limit
        )));
    }
    if rate.detection_window_ms == 0 {
        errors.push(ValidationError::InvalidOption(
            "transport_failure_rate.detection_window_ms must be greater than zero".to_string(),
        ));
    }
}

fn validate_cluster(cluster: &ClusterConfig, errors: &mut Vec<ValidationError>) {
    let id = &cluster.id;

    if !load_balancer::KNOWN_POLICIES.contains(&cluster.load_balancing_policy.as_str()) {
        errors.push(unknown_policy(id, "load balancing", &cluster.load_balancing_policy));
    }
    if !availability::KNOWN_POLICIES.contains(&cluster.available_destinations_policy.as_str()) {
        errors.push(unknown_policy(
            id,
            "available destinations",
            &cluster.available_destinations_policy,
        ));
    }

    let active_config = &cluster.health_check.active;
    if active_config.enabled {
        if !active::KNOWN_POLICIES.contains(&active_config.policy.as_str()) {
            errors.push(unknown_policy(id, "active health check", &active_config.policy));
        }
        if active_config.interval_ms == 0 {
            errors.push(ValidationError::ZeroDuration {
                cluster: id.clone(),
                field: "health_check.active.interval_ms",
            });
        }
        if active_config.timeout_ms == 0 {
            errors.push(ValidationError::ZeroDuration {
                cluster: id.clone(),
                field: "health_check.active.timeout_ms",
            });
        }
    }

    let passive_config = &cluster.health_check.passive;
    if passive_config.enabled {
        if !passive::KNOWN_POLICIES.contains(&passive_config.policy.as_str()) {
            errors.push(unknown_policy(id, "passive health check", &passive_config.policy));
        }
        if passive_config.reactivation_period_ms == Some(0) {
            errors.push(ValidationError::ZeroDuration {
                cluster: id.clone(),
                field: "health_check.passive.reactivation_period_ms",
            });
        }
    }

    if active::probe::parse_http_version(&cluster.http_request.version).is_none() {
        errors.push(ValidationError::InvalidHttpVersion {
            cluster: id.clone(),
            value: cluster.http_request.version.clone(),
        });
    }

    if let Some(raw) = cluster.metadata.get(metadata::CONSECUTIVE_FAILURES_THRESHOLD) {
        if metadata::parse_threshold(raw).is_none() {
            errors.push(ValidationError::InvalidMetadata {
                owner: format!("cluster '{id}'"),
                key: metadata::CONSECUTIVE_FAILURES_THRESHOLD,
                value: raw.clone(),
            });
        }
    }
    if let Some(raw) = cluster.metadata.get(metadata::FAILURE_RATE_LIMIT) {
        if metadata::parse_rate_limit(raw).is_none() {
            errors.push(ValidationError::InvalidMetadata {
                owner: format!("cluster '{id}'"),
                key: metadata::FAILURE_RATE_LIMIT,
                value: raw.clone(),
            });
        }
    }

    let mut seen = HashSet::new();
    for destination in &cluster.destinations {
        if !seen.insert(destination.id.as_str()) {
            errors.push(ValidationError::DuplicateDestination {
                cluster: id.clone(),
                destination: destination.id.clone(),
            });
        }
        validate_destination(id, destination, errors);
    }
}

fn validate_destination(cluster: &str, destination: &DestinationConfig, errors: &mut Vec<ValidationError>) {
    let mut check_address = |field: &'static str, value: &str| {
        if !is_http_url(value) {
            errors.push(ValidationError::InvalidAddress {
                cluster: cluster.to_string(),
                destination: destination.id.clone(),
                field,
                value: value.to_string(),
            });
        }
    };

    check_address("address", &destination.address);
    if let Some(health) = &destination.health {
        check_address("health address", health);
    }

    if let Some(raw) = destination.metadata.get(metadata::FAILURE_RATE_LIMIT) {
        if metadata::parse_rate_limit(raw).is_none() {
            errors.push(ValidationError::InvalidMetadata {
                owner: format!("cluster '{cluster}' destination '{}'", destination.id),
                key: metadata::FAILURE_RATE_LIMIT,
                value: raw.clone(),
            });
        }
    }
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}

fn unknown_policy(cluster: &str, kind: &'static str, name: &str) -> ValidationError {
    ValidationError::UnknownPolicy {
        cluster: cluster.to_string(),
        kind,
        name: name.to_string(),
    }
}
