//! Client configuration and credentials.
//!
//! Both values are immutable once built and are handed to the client at
//! construction. Nothing here is global.

use std::fmt;
use std::time::Duration;

use crate::error::ApiError;

/// Production marketplace API root.
pub const DEFAULT_BASE_URL: &str = "https://marketplace.tensordock.com/api/v0/";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_KEY: &str = "TENSORDOCK_API_KEY";
pub const ENV_API_TOKEN: &str = "TENSORDOCK_API_TOKEN";
pub const ENV_BASE_URL: &str = "TENSORDOCK_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "TENSORDOCK_TIMEOUT_SECS";
pub const ENV_DEBUG: &str = "TENSORDOCK_DEBUG";

/// An organization's API key/token pair.
///
/// Sent with every request: as form fields on POST, as query parameters on GET.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
    api_token: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_token: api_token.into(),
        }
    }

    /// Read `TENSORDOCK_API_KEY` and `TENSORDOCK_API_TOKEN`.
    ///
    /// # Errors
    /// Returns `ApiError::Config` if either variable is unset or empty.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let require = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ApiError::Config(format!("{name} is not set")))
        };
        Ok(Self::new(require(ENV_API_KEY)?, require(ENV_API_TOKEN)?))
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    /// The `(api_key, api_token)` pairs merged into every request.
    pub(crate) fn pairs(&self) -> Vec<(String, String)> {
        vec![
            ("api_key".to_string(), self.api_key.clone()),
            ("api_token".to_string(), self.api_token.clone()),
        ]
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// Client settings other than credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API root every endpoint path is appended to. Always ends with `/`.
    pub base_url: String,

    /// Global per-request timeout applied by the transport.
    pub timeout: Duration,

    /// Pretty-print every response to stdout.
    pub debug: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            debug: false,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.base_url = normalize_base_url(base_url.as_ref());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Defaults overridden by `TENSORDOCK_BASE_URL`, `TENSORDOCK_TIMEOUT_SECS`
    /// and `TENSORDOCK_DEBUG` when they are set.
    ///
    /// # Errors
    /// Returns `ApiError::Config` if the timeout or debug flag cannot be parsed.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            config = config.with_base_url(url);
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| ApiError::Config(format!("{ENV_TIMEOUT_SECS}: {e}")))?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(flag) = lookup(ENV_DEBUG) {
            config.debug = parse_flag(&flag).ok_or_else(|| {
                ApiError::Config(format!("{ENV_DEBUG}: expected a boolean, got {flag:?}"))
            })?;
        }
        Ok(config)
    }
}

pub(crate) fn normalize_base_url(url: &str) -> String {
    format!("{}/", url.trim_end_matches('/'))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
