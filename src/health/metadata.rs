//! Metadata-driven policy overrides.
//!
//! Clusters and destinations carry a string map; a few well-known keys
//! override policy defaults. Parsing every request or tick would be wasteful,
//! so each owner keeps a [`ParsedMetadataCache`] that re-parses only when the
//! raw string changes.

use std::sync::Mutex;

/// Cluster metadata key overriding the consecutive failures threshold.
pub const CONSECUTIVE_FAILURES_THRESHOLD: &str = "ConsecutiveFailuresHealthPolicy.Threshold";

/// Destination or cluster metadata key overriding the failure rate limit.
pub const FAILURE_RATE_LIMIT: &str = "TransportFailureRateHealthPolicy.RateLimit";

/// Parse a consecutive failures threshold (positive integer).
pub fn parse_threshold(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|v| *v > 0)
}

/// Parse a failure rate limit, a fraction in `(0, 1]`.
pub fn parse_rate_limit(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| *v > 0.0 && *v <= 1.0)
}

/// Memoized parse of a single metadata value, keyed by the last raw string seen.
#[derive(Debug)]
pub struct ParsedMetadataCache<T> {
    cached: Mutex<Option<(String, Option<T>)>>,
}

impl<T> Default for ParsedMetadataCache<T> {
    fn default() -> Self {
        Self {
            cached: Mutex::new(None),
        }
    }
}

impl<T: Copy> ParsedMetadataCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the parsed value of `raw`, parsing only if it differs from the
    /// previous call. Unparsable values yield `None` and are logged once.
    pub fn get_or_parse<F>(&self, key: &str, raw: Option<&str>, parse: F) -> Option<T>
    where
        F: FnOnce(&str) -> Option<T>,
    {
        let raw = raw?;
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((last_raw, parsed)) = cached.as_ref() {
            if last_raw == raw {
                return *parsed;
            }
        }

        let parsed = parse(raw);
        if parsed.is_none() {
            tracing::warn!(key = %key, value = %raw, "Ignoring invalid metadata override");
        }
        *cached = Some((raw.to_string(), parsed));
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_parsers() {
        assert_eq!(parse_threshold("3"), Some(3));
        assert_eq!(parse_threshold(" 7 "), Some(7));
        assert_eq!(parse_threshold("0"), None);
        assert_eq!(parse_threshold("-1"), None);
        assert_eq!(parse_rate_limit("0.5"), Some(0.5));
        assert_eq!(parse_rate_limit("1"), Some(1.0));
        assert_eq!(parse_rate_limit("0"), None);
        assert_eq!(parse_rate_limit("1.01"), None);
        assert_eq!(parse_rate_limit("half"), None);
    }

    #[test]
    fn test_reparses_only_on_change() {
        let cache = ParsedMetadataCache::new();
        let calls = Cell::new(0);
        let parse = |raw: &str| {
            calls.set(calls.get() + 1);
            parse_threshold(raw)
        };

        assert_eq!(cache.get_or_parse("k", Some("4"), parse), Some(4));
        assert_eq!(cache.get_or_parse("k", Some("4"), parse), Some(4));
        assert_eq!(calls.get(), 1);

        assert_eq!(cache.get_or_parse("k", Some("5"), parse), Some(5));
        assert_eq!(calls.get(), 2);

        assert_eq!(cache.get_or_parse("k", Some("bad"), parse), None);
        assert_eq!(cache.get_or_parse("k", Some("bad"), parse), None);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_missing_value_is_none() {
        let cache: ParsedMetadataCache<u32> = ParsedMetadataCache::new();
        assert_eq!(cache.get_or_parse("k", None, parse_threshold), None);
    }
}
