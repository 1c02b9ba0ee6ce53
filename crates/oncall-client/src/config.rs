//! Schedule API client configuration.
//!
//! Defaults point at the production endpoint. Override via environment
//! variables or explicit construction for staging/testing.

use url::Url;
use zeroize::Zeroizing;

/// Default base URL of the schedule API.
pub const DEFAULT_API_URL: &str = "https://api.oncall.example.com";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for connecting to the schedule API.
///
/// Custom `Debug` implementation redacts the `api_token` field
/// to prevent credential leakage in log output.
#[derive(Clone)]
pub struct ApiConfig {
    /// Base URL of the API. Paths are joined below `/api/v2/`.
    pub base_url: Url,
    /// Bearer token for API authentication. Zeroized on drop.
    pub api_token: Zeroizing<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `ONCALL_API_URL` (default: [`DEFAULT_API_URL`])
    /// - `ONCALL_API_TOKEN` (required)
    /// - `ONCALL_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_token = std::env::var("ONCALL_API_TOKEN").map_err(|_| ConfigError::MissingToken)?;

        Ok(Self {
            base_url: env_url("ONCALL_API_URL", DEFAULT_API_URL)?,
            api_token: Zeroizing::new(api_token),
            timeout_secs: std::env::var("ONCALL_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Configuration pointing at a local stub server (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if the localhost URL cannot be parsed.
    pub fn local(port: u16, token: &str) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&format!("http://127.0.0.1:{port}"))
            .map_err(|e| ConfigError::InvalidUrl("localhost".to_string(), e.to_string()))?;
        Ok(Self {
            base_url,
            api_token: Zeroizing::new(token.to_string()),
            timeout_secs: 5,
        })
    }

    /// Replace the base URL, validating it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if `raw` is not a URL.
    pub fn with_base_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.base_url =
            Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(raw.to_string(), e.to_string()))?;
        Ok(self)
    }
}

fn env_url(var: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ONCALL_API_TOKEN environment variable is required")]
    MissingToken,
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
}
