//! Configuration for the product council client.
//!
//! [`ApiConfig`] is an explicitly passed value: it is loaded once through a
//! [`ConfigStore`], edited through the builder, and written back through the
//! same store whenever it changes.

mod endpoint;
mod store;

pub use endpoint::{resolve_endpoint, CHAT_COMPLETIONS_PATH};
pub use store::{default_settings_path, load_or_default, ConfigStore, FileConfigStore, MemoryConfigStore};

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use crate::errors::{CouncilError, CouncilResult};

/// Default base URL used on first run.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model used on first run.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default time allowed to connect and receive the response headers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Environment variable overriding the base URL.
pub const ENV_BASE_URL: &str = "PRODUCT_COUNCIL_BASE_URL";
/// Environment variable overriding the API key.
pub const ENV_API_KEY: &str = "PRODUCT_COUNCIL_API_KEY";
/// Environment variable overriding the model.
pub const ENV_MODEL: &str = "PRODUCT_COUNCIL_MODEL";
/// Environment variable overriding the timeout, in seconds.
pub const ENV_TIMEOUT: &str = "PRODUCT_COUNCIL_TIMEOUT";

/// Connection settings for the chat-completions endpoint.
#[derive(Clone)]
pub struct ApiConfig {
    /// Base URL as typed by the user; resolved lazily via [`ApiConfig::endpoint`].
    pub base_url: String,
    /// API key for bearer authentication (stored securely).
    pub(crate) api_key: SecretString,
    /// Model name sent with every request.
    pub model: String,
    /// Time allowed to connect and receive the response headers. Streaming
    /// the body afterwards is not bounded.
    pub timeout: Duration,
}

impl ApiConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ApiConfigBuilder {
        ApiConfigBuilder::new()
    }

    /// Returns the API key (exposing the secret).
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Returns the API key hint (last 4 characters) for debugging.
    pub fn api_key_hint(&self) -> String {
        crate::auth::key_hint(self.api_key.expose_secret())
    }

    /// Returns true once both base URL and API key are set.
    pub fn is_complete(&self) -> bool {
        !self.base_url.trim().is_empty() && !self.api_key().trim().is_empty()
    }

    /// Returns true when requests would go out over plain HTTP.
    pub fn uses_insecure_transport(&self) -> bool {
        self.base_url.trim_start().starts_with("http://")
    }

    /// Returns the resolved chat-completions endpoint.
    pub fn endpoint(&self) -> String {
        resolve_endpoint(self.base_url.trim())
    }

    /// Checks that the configuration can be used for a request.
    pub fn ensure_complete(&self) -> CouncilResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(CouncilError::config_missing("API base URL is not set"));
        }
        if self.api_key().trim().is_empty() {
            return Err(CouncilError::config_missing("API key is not set"));
        }
        Ok(())
    }

    /// Applies `PRODUCT_COUNCIL_*` environment variables on top of this configuration.
    ///
    /// # Environment Variables
    ///
    /// - `PRODUCT_COUNCIL_BASE_URL`: base URL
    /// - `PRODUCT_COUNCIL_API_KEY`: API key
    /// - `PRODUCT_COUNCIL_MODEL`: model name
    /// - `PRODUCT_COUNCIL_TIMEOUT`: connect and response-header timeout in seconds
    pub fn apply_env_overrides(self) -> CouncilResult<Self> {
        let mut builder = ApiConfigBuilder::from_config(&self);

        if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
            builder = builder.base_url(base_url);
        }

        if let Ok(api_key) = std::env::var(ENV_API_KEY) {
            builder = builder.api_key(api_key);
        }

        if let Ok(model) = std::env::var(ENV_MODEL) {
            builder = builder.model(model);
        }

        if let Ok(timeout_str) = std::env::var(ENV_TIMEOUT) {
            if let Ok(timeout_secs) = timeout_str.parse::<u64>() {
                builder = builder.timeout(Duration::from_secs(timeout_secs));
            }
        }

        builder.build()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: SecretString::new(String::new()),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Builder for `ApiConfig`.
#[derive(Default)]
pub struct ApiConfigBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout: Option<Duration>,
}

impl ApiConfigBuilder {
    /// Creates a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration.
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            base_url: Some(config.base_url.clone()),
            api_key: Some(config.api_key().to_string()),
            model: Some(config.model.clone()),
            timeout: Some(config.timeout),
        }
    }

    /// Sets the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the API key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the connect and response-header timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the configuration.
    ///
    /// An empty API key is accepted: it is the first-run state and the
    /// orchestrator turns it into a configuration prompt.
    pub fn build(self) -> CouncilResult<ApiConfig> {
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim()
            .to_string();

        if !base_url.is_empty() {
            let parsed = url::Url::parse(&base_url)?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(CouncilError::Configuration {
                    message: format!("Unsupported URL scheme: {}", parsed.scheme()),
                });
            }
            if parsed.scheme() == "http" {
                tracing::warn!(
                    base_url = %base_url,
                    "Base URL uses plain HTTP; browsers and proxies may block it"
                );
            }
        }

        let model = self
            .model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(ApiConfig {
            base_url,
            api_key: SecretString::new(self.api_key.unwrap_or_default().trim().to_string()),
            model,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
        })
    }
}
