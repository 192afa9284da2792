//! Pipeline tunables with sensible defaults.
//!
//! [`SearchConfig`] controls timeouts, result limits, dedup sensitivity,
//! connection pool bounds and the ban policy. The host loads these from
//! its settings file once at startup; they are immutable afterwards.

use std::time::Duration;

use crate::ban::BanPolicy;
use crate::error::ConfigError;
use crate::orchestrator::DomainFilter;
use crate::pool::PoolConfig;
use crate::types::Query;

/// Longest global deadline a dispatch ever runs under, whatever the
/// engine timeouts and the cap say.
pub const DEADLINE_CEILING: Duration = Duration::from_secs(24 * 3_600);

/// Configuration for the dispatch and aggregation pipeline.
///
/// Use [`Default::default()`] for sensible defaults, or construct with
/// field overrides for custom behaviour.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Timeout applied to engines that do not configure their own.
    pub request_timeout: Duration,
    /// Upper bound on the global deadline of a single dispatch.
    pub max_request_timeout: Option<Duration>,
    /// Maximum number of aggregated results returned per response.
    pub max_results: usize,
    /// Jaro-Winkler similarity at or above which two URL-less results
    /// are considered the same.
    pub title_similarity_threshold: f64,
    /// Results from these domains (and their subdomains) are dropped.
    pub blocked_domains: Vec<String>,
    /// Most ranked results one domain may contribute; `None` is unlimited.
    pub max_results_per_domain: Option<usize>,
    /// Per-engine connection pool bounds.
    pub pool: PoolConfig,
    /// Suspension policy for failing engines.
    pub bans: BanPolicy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(3),
            max_request_timeout: Some(Duration::from_secs(10)),
            max_results: 50,
            title_similarity_threshold: 0.9,
            blocked_domains: Vec::new(),
            max_results_per_domain: None,
            pool: PoolConfig::default(),
            bans: BanPolicy::default(),
        }
    }
}

impl SearchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `request_timeout` must be greater than 0
    /// - `max_request_timeout`, when set, must be >= `request_timeout`
    /// - `max_results` must be greater than 0
    /// - `title_similarity_threshold` must lie in `(0, 1]`
    /// - `max_results_per_domain`, when set, must be greater than 0
    /// - pool and ban policy bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request_timeout must be greater than 0".into(),
            ));
        }
        if let Some(max) = self.max_request_timeout {
            if max < self.request_timeout {
                return Err(ConfigError::Invalid(
                    "max_request_timeout must be >= request_timeout".into(),
                ));
            }
        }
        if self.max_results == 0 {
            return Err(ConfigError::Invalid(
                "max_results must be greater than 0".into(),
            ));
        }
        if !(self.title_similarity_threshold > 0.0 && self.title_similarity_threshold <= 1.0) {
            return Err(ConfigError::Invalid(
                "title_similarity_threshold must be in (0, 1]".into(),
            ));
        }
        if self.max_results_per_domain == Some(0) {
            return Err(ConfigError::Invalid(
                "max_results_per_domain must be greater than 0".into(),
            ));
        }
        self.pool.validate()?;
        self.bans.validate()
    }

    /// Domain filter applied while aggregating.
    pub fn domain_filter(&self) -> DomainFilter {
        DomainFilter::new(&self.blocked_domains, self.max_results_per_domain)
    }

    /// Global deadline for a dispatch to engines with the given timeouts.
    ///
    /// The slowest selected engine sets the pace. The query's own
    /// `timeout_limit` can only shorten that. The result is capped by
    /// `max_request_timeout` and never exceeds [`DEADLINE_CEILING`].
    pub fn deadline_for(&self, query: &Query, engine_timeouts: &[Duration]) -> Duration {
        let slowest = engine_timeouts
            .iter()
            .copied()
            .max()
            .unwrap_or(self.request_timeout);
        let wanted = match query.timeout_limit {
            Some(limit) => limit.min(slowest),
            None => slowest,
        };
        let capped = match self.max_request_timeout {
            Some(cap) => wanted.min(cap),
            None => wanted,
        };
        capped.min(DEADLINE_CEILING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sensible_values() {
        let config = SearchConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.max_request_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.max_results, 50);
        assert!((config.title_similarity_threshold - 0.9).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = SearchConfig {
            request_timeout: Duration::ZERO,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("request_timeout"));
    }

    #[test]
    fn cap_below_request_timeout_rejected() {
        let config = SearchConfig {
            max_request_timeout: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_request_timeout"));
    }

    #[test]
    fn zero_max_results_rejected() {
        let config = SearchConfig {
            max_results: 0,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("max_results"));
    }

    #[test]
    fn out_of_range_similarity_rejected() {
        for threshold in [0.0, 1.5, f64::NAN] {
            let config = SearchConfig {
                title_similarity_threshold: threshold,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "threshold {threshold} accepted");
        }
    }

    #[test]
    fn zero_per_domain_cap_rejected() {
        let config = SearchConfig {
            max_results_per_domain: Some(0),
            ..Default::default()
        };
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("max_results_per_domain"));
    }

    #[test]
    fn deadline_uses_slowest_engine() {
        let config = SearchConfig::default();
        let deadline = config.deadline_for(
            &Query::new("q"),
            &[Duration::from_secs(2), Duration::from_secs(5)],
        );
        assert_eq!(deadline, Duration::from_secs(5));
    }

    #[test]
    fn deadline_is_capped() {
        let config = SearchConfig::default();
        let deadline = config.deadline_for(&Query::new("q"), &[Duration::from_secs(30)]);
        assert_eq!(deadline, Duration::from_secs(10));
    }

    #[test]
    fn query_timeout_limit_wins() {
        let config = SearchConfig::default();
        let query = Query::new("q").with_timeout_limit(Duration::from_millis(1500));
        let deadline = config.deadline_for(&query, &[Duration::from_secs(5)]);
        assert_eq!(deadline, Duration::from_millis(1500));
    }

    #[test]
    fn query_timeout_limit_never_extends_deadline() {
        let config = SearchConfig {
            max_request_timeout: None,
            ..Default::default()
        };
        let query = Query::new("q").with_timeout_limit(Duration::from_secs(60));
        let deadline = config.deadline_for(&query, &[Duration::from_secs(2), Duration::from_secs(4)]);
        assert_eq!(deadline, Duration::from_secs(4));
    }

    #[test]
    fn uncapped_deadline_stays_under_ceiling() {
        let config = SearchConfig {
            max_request_timeout: None,
            ..Default::default()
        };
        let huge = Duration::from_secs(u64::MAX);
        let query = Query::new("q").with_timeout_limit(huge);
        assert_eq!(config.deadline_for(&query, &[huge]), DEADLINE_CEILING);
    }

    #[test]
    fn no_engines_falls_back_to_request_timeout() {
        let config = SearchConfig::default();
        assert_eq!(
            config.deadline_for(&Query::new("q"), &[]),
            Duration::from_secs(3)
        );
    }
}
