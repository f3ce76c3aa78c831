//! Client configuration.

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const ENV_BASE_URL: &str = "RELAYLINK_API_BASE_URL";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "RELAYLINK_REQUEST_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("base url must not be empty")]
    EmptyBaseUrl,
    #[error("base url must use http:// or https:// and include a host")]
    InvalidBaseUrl,
    #[error("request timeout must be a positive number of milliseconds, got {0:?}")]
    InvalidTimeout(String),
}

/// Where the backend lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Normalized base URL without a trailing slash.
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl ClientConfig {
    /// Config for `base_url` with the default timeout.
    ///
    /// # Errors
    /// Returns error if the URL is empty or not http(s).
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            ..Self::default()
        })
    }

    /// Resolve from the environment, falling back to defaults.
    ///
    /// # Errors
    /// Returns error if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve from an arbitrary variable lookup.
    ///
    /// # Errors
    /// Returns error if a variable is set to an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let base_url = match non_empty(ENV_BASE_URL) {
            Some(raw) => normalize_base_url(&raw)?,
            None => DEFAULT_BASE_URL.to_owned(),
        };

        let request_timeout = match non_empty(ENV_REQUEST_TIMEOUT_MS) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => return Err(ConfigError::InvalidTimeout(raw)),
            },
            None => Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        };

        Ok(Self {
            base_url,
            request_timeout,
        })
    }

    /// Absolute URL for an endpoint path.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Trim and drop trailing slashes; require an http(s) scheme and a host.
///
/// # Errors
/// Returns error if the URL is empty or not http(s).
pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyBaseUrl);
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::InvalidBaseUrl);
    }
    let Some((_, remainder)) = trimmed.split_once("://") else {
        return Err(ConfigError::InvalidBaseUrl);
    };
    if remainder.trim().is_empty() || remainder.starts_with('/') {
        return Err(ConfigError::InvalidBaseUrl);
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_to_local_backend() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.endpoint("/mqtt/connect"), "http://localhost:8080/mqtt/connect");
    }

    #[test]
    fn reads_and_normalizes_environment() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, " https://relay.example.com/api/ "),
            (ENV_REQUEST_TIMEOUT_MS, "2500"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "https://relay.example.com/api");
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn blank_variables_fall_back() {
        let config = ClientConfig::from_lookup(lookup(&[(ENV_BASE_URL, "   ")])).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn rejects_invalid_values() {
        assert_eq!(normalize_base_url("relay.example.com"), Err(ConfigError::InvalidBaseUrl));
        assert_eq!(normalize_base_url("http:///x"), Err(ConfigError::InvalidBaseUrl));
        assert_eq!(normalize_base_url(" / "), Err(ConfigError::EmptyBaseUrl));
        assert_eq!(
            ClientConfig::from_lookup(lookup(&[(ENV_REQUEST_TIMEOUT_MS, "0")])),
            Err(ConfigError::InvalidTimeout("0".into()))
        );
    }
}
