//! Health subsystem error types.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by health policy lookup and evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HealthCheckError {
    /// No policy of this kind is registered under the name.
    #[error("unknown {kind} policy '{name}'")]
    UnknownPolicy { kind: &'static str, name: String },

    /// Configuration that passed loading but cannot be evaluated.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Why a single active health probe failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbeError {
    #[error("failed to build probe request: {0}")]
    Request(String),

    #[error("probe transport error: {0}")]
    Transport(String),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("probe cancelled")]
    Canceled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HealthCheckError::UnknownPolicy {
            kind: "active health check",
            name: "Magic".into(),
        };
        assert_eq!(err.to_string(), "unknown active health check policy 'Magic'");

        let err = HealthCheckError::InvalidConfiguration("bad".into());
        assert_eq!(err.to_string(), "invalid configuration: bad");

        let err = ProbeError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "probe timed out after 250ms");
    }
}
