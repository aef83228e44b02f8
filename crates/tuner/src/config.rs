use std::time::Duration;

use poetscrew_core::retry::{RetryPolicy, RESULT_FETCH_MAX_ATTEMPTS, STATUS_POLL_MAX_ATTEMPTS};

use crate::api::DEFAULT_REQUEST_TIMEOUT;
use crate::poller::{PollConfig, DEFAULT_POLL_INTERVAL};

/// Errors while loading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} must be a valid {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Engine configuration.
///
/// Defaults match the production backend; only the API URL is required.
#[derive(Debug, Clone)]
pub struct TunerConfig {
    /// Backend base URL including the version prefix.
    pub api_url: String,
    /// Bearer token sent with every request, if any.
    pub access_token: Option<String>,
    /// Per-request timeout, distinct from the retry budgets.
    pub request_timeout: Duration,
    pub poll: PollConfig,
    pub result_retry: RetryPolicy,
}

impl TunerConfig {
    /// Configuration with default timings for `api_url`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            access_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll: PollConfig::default(),
            result_retry: RetryPolicy::result_fetch(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                      | Default |
    /// |------------------------------|---------|
    /// | `POETS_API_URL`              | --      |
    /// | `POETS_ACCESS_TOKEN`         | none    |
    /// | `POETS_REQUEST_TIMEOUT_SECS` | `10`    |
    /// | `POETS_POLL_INTERVAL_MS`     | `5000`  |
    /// | `POETS_STATUS_MAX_ATTEMPTS`  | `3`     |
    /// | `POETS_RESULT_MAX_ATTEMPTS`  | `4`     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("POETS_API_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("POETS_API_URL"))?;

        let access_token = lookup("POETS_ACCESS_TOKEN").filter(|v| !v.trim().is_empty());

        let timeout_secs: u64 = parse_or(
            &lookup,
            "POETS_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT.as_secs(),
        )?;
        let interval_ms: u64 = parse_or(
            &lookup,
            "POETS_POLL_INTERVAL_MS",
            DEFAULT_POLL_INTERVAL.as_millis() as u64,
        )?;
        let status_attempts: u32 =
            parse_or(&lookup, "POETS_STATUS_MAX_ATTEMPTS", STATUS_POLL_MAX_ATTEMPTS)?;
        let result_attempts: u32 =
            parse_or(&lookup, "POETS_RESULT_MAX_ATTEMPTS", RESULT_FETCH_MAX_ATTEMPTS)?;

        Ok(Self {
            api_url,
            access_token,
            request_timeout: Duration::from_secs(timeout_secs),
            poll: PollConfig {
                interval: Duration::from_millis(interval_ms),
                retry: RetryPolicy::status_poll().with_max_attempts(status_attempts),
            },
            result_retry: RetryPolicy::result_fetch().with_max_attempts(result_attempts),
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected: std::any::type_name::<T>(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_url_is_set() {
        let config =
            TunerConfig::from_lookup(lookup(&[("POETS_API_URL", "http://api/v1")])).unwrap();
        assert_eq!(config.api_url, "http://api/v1");
        assert_eq!(config.access_token, None);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.poll.interval, Duration::from_millis(5000));
        assert_eq!(config.poll.retry.max_attempts, 3);
        assert_eq!(config.result_retry.max_attempts, 4);
    }

    #[test]
    fn missing_url_is_an_error() {
        let err = TunerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err.to_string(), "POETS_API_URL must be set");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = TunerConfig::from_lookup(lookup(&[
            ("POETS_API_URL", "http://api/v1"),
            ("POETS_ACCESS_TOKEN", "secret"),
            ("POETS_POLL_INTERVAL_MS", "250"),
            ("POETS_STATUS_MAX_ATTEMPTS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.access_token.as_deref(), Some("secret"));
        assert_eq!(config.poll.interval, Duration::from_millis(250));
        assert_eq!(config.poll.retry.max_attempts, 5);
    }

    #[test]
    fn invalid_number_is_reported() {
        let err = TunerConfig::from_lookup(lookup(&[
            ("POETS_API_URL", "http://api/v1"),
            ("POETS_REQUEST_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("POETS_REQUEST_TIMEOUT_SECS"));
    }
}
