//! Collaboration configuration module
//!
//! Tunables of the sync core: endpoints, timeouts, debounce windows and the
//! presence staleness policy. Built with `CollabConfig::builder()`, read from
//! the environment with `CollabConfig::from_env()` or parsed from TOML.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Default REST base URL
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";
/// Default relay websocket URL
pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:1234";

/// Collaboration configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CollabConfig {
    /// REST base URL, without trailing slash
    pub api_url: String,
    /// Relay websocket URL, without trailing slash
    pub relay_url: String,
    /// How long a connection may stay unconfirmed before it is torn down
    pub connect_timeout: Duration,
    /// Quiet period before a burst of position updates is persisted
    pub update_debounce: Duration,
    /// Minimum movement on either axis that counts as a position change
    pub position_threshold: f64,
    /// Age at which a peer's chat bubble starts fading
    pub chat_fade_after: Duration,
    /// Age at which a peer's chat bubble is gone
    pub chat_expire_after: Duration,
    /// Interval of the presence sweep
    pub presence_sweep_interval: Duration,
    /// Silence after which a peer's presence is dropped
    pub peer_timeout: Duration,
    /// Canvas extent; bootstrapped positions are clamped to `0..=canvas_size`
    pub canvas_size: f64,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            relay_url: DEFAULT_RELAY_URL.to_string(),
            connect_timeout: Duration::from_secs(3),
            update_debounce: Duration::from_millis(300),
            position_threshold: 1.0,
            chat_fade_after: Duration::from_secs(6),
            chat_expire_after: Duration::from_secs(7),
            presence_sweep_interval: Duration::from_secs(1),
            peer_timeout: Duration::from_secs(30),
            canvas_size: 5000.0,
        }
    }
}

impl CollabConfig {
    /// Create a new CollabConfigBuilder
    pub fn builder() -> CollabConfigBuilder {
        CollabConfigBuilder::default()
    }

    /// Read overrides from `MINDMAP_API_URL`, `MINDMAP_WS_URL` and
    /// `MINDMAP_CONNECT_TIMEOUT_MS`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = Self::builder();
        if let Ok(url) = std::env::var("MINDMAP_API_URL") {
            builder = builder.api_url(url);
        }
        if let Ok(url) = std::env::var("MINDMAP_WS_URL") {
            builder = builder.relay_url(url);
        }
        if let Ok(raw) = std::env::var("MINDMAP_CONNECT_TIMEOUT_MS") {
            let millis = raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue("MINDMAP_CONNECT_TIMEOUT_MS", raw))?;
            builder = builder.connect_timeout(Duration::from_millis(millis));
        }
        builder.build()
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut builder = Self::builder();
        if let Some(url) = file.api_url {
            builder = builder.api_url(url);
        }
        if let Some(url) = file.relay_url {
            builder = builder.relay_url(url);
        }
        if let Some(ms) = file.connect_timeout_ms {
            builder = builder.connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = file.update_debounce_ms {
            builder = builder.update_debounce(Duration::from_millis(ms));
        }
        if let Some(threshold) = file.position_threshold {
            builder = builder.position_threshold(threshold);
        }
        if let Some(size) = file.canvas_size {
            builder = builder.canvas_size(size);
        }
        builder.build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(self.api_url.clone()));
        }
        if !(self.relay_url.starts_with("ws://") || self.relay_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidUrl(self.relay_url.clone()));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "connect_timeout",
                "must be greater than zero".to_string(),
            ));
        }
        if !(self.position_threshold.is_finite() && self.position_threshold >= 0.0) {
            return Err(ConfigError::InvalidValue(
                "position_threshold",
                self.position_threshold.to_string(),
            ));
        }
        if self.chat_expire_after < self.chat_fade_after {
            return Err(ConfigError::InvalidValue(
                "chat_expire_after",
                "must not be shorter than chat_fade_after".to_string(),
            ));
        }
        if !(self.canvas_size.is_finite() && self.canvas_size > 0.0) {
            return Err(ConfigError::InvalidValue("canvas_size", self.canvas_size.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    api_url: Option<String>,
    relay_url: Option<String>,
    connect_timeout_ms: Option<u64>,
    update_debounce_ms: Option<u64>,
    position_threshold: Option<f64>,
    canvas_size: Option<f64>,
}

/// Builder for CollabConfig
#[derive(Debug, Default)]
pub struct CollabConfigBuilder {
    config: Option<CollabConfig>,
}

impl CollabConfigBuilder {
    fn inner(&mut self) -> &mut CollabConfig {
        self.config.get_or_insert_with(CollabConfig::default)
    }

    /// Set the REST base URL
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.inner().api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the relay websocket URL
    pub fn relay_url(mut self, url: impl Into<String>) -> Self {
        self.inner().relay_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the connection confirmation timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.inner().connect_timeout = timeout;
        self
    }

    /// Set the position update debounce window
    pub fn update_debounce(mut self, debounce: Duration) -> Self {
        self.inner().update_debounce = debounce;
        self
    }

    /// Set the minimum significant movement
    pub fn position_threshold(mut self, threshold: f64) -> Self {
        self.inner().position_threshold = threshold;
        self
    }

    /// Set the chat fade and expiry ages
    pub fn chat_staleness(mut self, fade_after: Duration, expire_after: Duration) -> Self {
        let config = self.inner();
        config.chat_fade_after = fade_after;
        config.chat_expire_after = expire_after;
        self
    }

    /// Set the presence sweep interval
    pub fn presence_sweep_interval(mut self, interval: Duration) -> Self {
        self.inner().presence_sweep_interval = interval;
        self
    }

    /// Set the peer silence timeout
    pub fn peer_timeout(mut self, timeout: Duration) -> Self {
        self.inner().peer_timeout = timeout;
        self
    }

    /// Set the canvas extent
    pub fn canvas_size(mut self, size: f64) -> Self {
        self.inner().canvas_size = size;
        self
    }

    /// Build and validate the configuration
    pub fn build(mut self) -> Result<CollabConfig, ConfigError> {
        let config = self.inner().clone();
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}
