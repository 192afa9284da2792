//! Shared HTTP client with User-Agent rotation for engine requests.
//!
//! Provides a configured [`reqwest::Client`] with a browser-like
//! User-Agent, picked from a rotation list unless an override is set.

use crate::error::ConfigError;
use rand::seq::SliceRandom;
use std::time::Duration;

/// Realistic browser User-Agent strings, rotated per client.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
];

/// Options for the shared outbound client.
#[derive(Debug, Clone, Default)]
pub struct HttpOptions {
    /// Fixed User-Agent; a random browser one is used when unset.
    pub user_agent: Option<String>,
    /// Hard upper bound on any single request. Per-call budgets are
    /// applied on top of this by the adapters.
    pub timeout: Option<Duration>,
    /// Idle connections kept per host.
    pub pool_max_idle_per_host: Option<usize>,
}

/// Build a [`reqwest::Client`] for engine requests.
///
/// The client has:
/// - A random User-Agent from the built-in rotation list (or the override)
/// - Brotli and gzip decompression
/// - At most 10 redirects
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if the client cannot be constructed.
pub fn build_client(options: &HttpOptions) -> Result<reqwest::Client, ConfigError> {
    let ua = match options.user_agent {
        Some(ref custom) => custom.clone(),
        None => random_user_agent().to_owned(),
    };

    let mut builder = reqwest::Client::builder()
        .user_agent(ua)
        .redirect(reqwest::redirect::Policy::limited(10));
    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(idle) = options.pool_max_idle_per_host {
        builder = builder.pool_max_idle_per_host(idle);
    }
    builder
        .build()
        .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {e}")))
}

/// Select a random User-Agent string from the rotation list.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_user_agent_returns_valid_ua() {
        let ua = random_user_agent();
        assert!(USER_AGENTS.contains(&ua));
        assert!(ua.contains("Mozilla/5.0"));
    }

    #[test]
    fn build_client_with_defaults() {
        assert!(build_client(&HttpOptions::default()).is_ok());
    }

    #[test]
    fn build_client_with_overrides() {
        let options = HttpOptions {
            user_agent: Some("CustomBot/1.0".into()),
            timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: Some(4),
        };
        assert!(build_client(&options).is_ok());
    }
}
