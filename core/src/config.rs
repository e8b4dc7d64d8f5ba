//! Client configuration resolved once at startup.
//!
//! # Design
//! The base address and request defaults live in an explicitly constructed
//! `ClientConfig` that is handed to the request client. Nothing is global;
//! a new configuration means a new client.

use std::time::Duration;

use url::Url;

use crate::error::ApiError;

/// Environment variables consulted for the base address, in priority order.
pub const BASE_URL_VARS: [&str; 2] = ["EVENTS_API_URL", "API_URL"];

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(25_000);
pub const DEFAULT_RETRIES: u32 = 1;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(1_200);

/// Host platform, used only to pick the default base address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// The Android emulator reaches the host loopback through `10.0.2.2`.
    Android,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            Platform::Android
        } else {
            Platform::Other
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Platform::Android => "http://10.0.2.2:3000",
            Platform::Other => "http://localhost:3000",
        }
    }
}

/// How the backend expects like/going mutations to be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationConvention {
    /// `POST /events/{id}/{kind}` with `{"userId", "on"}` for both directions.
    #[default]
    OnFlag,
    /// `POST /events/{id}/{kind}` to turn on, `DELETE ...?userId=` to turn off.
    PostDelete,
}

/// Query parameter naming the relation on `/events/mine/list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelationParam {
    #[default]
    Type,
    Status,
}

impl RelationParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationParam::Type => "type",
            RelationParam::Status => "status",
        }
    }
}

/// Immutable client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    base_url: String,
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
    pub convention: MutationConvention,
    pub relation_param: RelationParam,
}

impl ClientConfig {
    /// Build a config for `base_url`. Trailing slashes are stripped.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let parsed = Url::parse(trimmed)
            .map_err(|e| ApiError::Config(format!("invalid base url {trimmed:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::Config(format!(
                "base url must be http(s), got {trimmed:?}"
            )));
        }
        Ok(Self {
            base_url: trimmed.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            backoff: DEFAULT_BACKOFF,
            convention: MutationConvention::default(),
            relation_param: RelationParam::default(),
        })
    }

    /// Resolve from the process environment, falling back to the platform default.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(Platform::current(), |key| std::env::var(key).ok())
    }

    /// Resolve using `lookup` in place of the process environment.
    pub fn from_lookup<F>(platform: Platform, lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let configured = BASE_URL_VARS
            .iter()
            .filter_map(|key| lookup(key))
            .find(|value| !value.trim().is_empty());
        match configured {
            Some(url) => {
                tracing::debug!(%url, "base url from environment");
                Self::new(&url)
            }
            None => Self::new(platform.default_base_url()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_convention(mut self, convention: MutationConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn with_relation_param(mut self, param: RelationParam) -> Self {
        self.relation_param = param;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_are_stripped() {
        let config = ClientConfig::new("http://localhost:3000///").unwrap();
        assert_eq!(config.base_url(), "http://localhost:3000");
    }

    #[test]
    fn defaults_match_request_policy() {
        let config = ClientConfig::new("http://localhost:3000").unwrap();
        assert_eq!(config.timeout, Duration::from_millis(25_000));
        assert_eq!(config.retries, 1);
        assert_eq!(config.backoff, Duration::from_millis(1_200));
        assert_eq!(config.convention, MutationConvention::OnFlag);
    }

    #[test]
    fn first_env_var_wins() {
        let config = ClientConfig::from_lookup(Platform::Other, |key| match key {
            "EVENTS_API_URL" => Some("https://api.example.com/".to_string()),
            "API_URL" => Some("https://other.example.com".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.base_url(), "https://api.example.com");
    }

    #[test]
    fn blank_env_value_falls_through() {
        let config = ClientConfig::from_lookup(Platform::Other, |key| match key {
            "EVENTS_API_URL" => Some("   ".to_string()),
            "API_URL" => Some("http://api.local:8080".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.base_url(), "http://api.local:8080");
    }

    #[test]
    fn platform_default_when_unset() {
        let android = ClientConfig::from_lookup(Platform::Android, |_| None).unwrap();
        assert_eq!(android.base_url(), "http://10.0.2.2:3000");

        let other = ClientConfig::from_lookup(Platform::Other, |_| None).unwrap();
        assert_eq!(other.base_url(), "http://localhost:3000");
    }

    #[test]
    fn rejects_non_http_base() {
        let err = ClientConfig::new("ftp://files.example.com").unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));

        let err = ClientConfig::new("not a url").unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn builders_override_defaults() {
        let config = ClientConfig::new("http://localhost:3000")
            .unwrap()
            .with_timeout(Duration::from_millis(500))
            .with_retries(3)
            .with_backoff(Duration::from_millis(10))
            .with_convention(MutationConvention::PostDelete)
            .with_relation_param(RelationParam::Status);
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert_eq!(config.retries, 3);
        assert_eq!(config.backoff, Duration::from_millis(10));
        assert_eq!(config.convention, MutationConvention::PostDelete);
        assert_eq!(config.relation_param.as_str(), "status");
    }
}
