use crate::shared::config::{CollabConfig, CollabConfigBuilder, ConfigError};
use reqwest::Url;

/// Client configuration wrapper.
///
/// Holds the collaboration tunables plus the caller's bearer token.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    collab: CollabConfig,
    token: Option<String>,
}

impl ClientConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an already validated collaboration config
    pub fn from_collab(collab: CollabConfig) -> Self {
        Self { collab, token: None }
    }

    pub fn with_builder(builder: CollabConfigBuilder) -> Result<Self, ConfigError> {
        Ok(Self::from_collab(builder.build()?))
    }

    /// Read the collaboration config from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::from_collab(CollabConfig::from_env()?))
    }

    /// Collaboration tunables
    pub fn collab(&self) -> &CollabConfig {
        &self.collab
    }

    /// Set the bearer token
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    /// Get the bearer token
    pub fn get_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Clear the token (logout)
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    /// Get the full URL for an API path
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.collab.api_url, path)
    }

    /// Websocket URL joining `workspace_id` with `token`
    pub fn relay_url_for(&self, workspace_id: &str, token: &str) -> Result<String, ConfigError> {
        let mut url = Url::parse(&self.collab.relay_url)
            .map_err(|_| ConfigError::InvalidUrl(self.collab.relay_url.clone()))?;
        if !url.path().ends_with("/ws") {
            let path = format!("{}/ws", url.path().trim_end_matches('/'));
            url.set_path(&path);
        }
        url.query_pairs_mut()
            .append_pair("workspace", workspace_id)
            .append_pair("token", token);
        Ok(url.to_string())
    }
}
