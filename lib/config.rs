//! Dispatcher configuration.
//!
//! Configuration may be given in code or loaded from a TOML file.

use std::path::Path;
use std::time::Duration;

use http::HeaderValue;
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

fn default_timeout_secs() -> u64 {
    30
}

/// Settings shared by a dispatcher and its built-in transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DispatcherConfig {
    /// Shared token sent as `Authorization: Token <token>` when a request has no header of its
    /// own.
    #[serde(default, serialize_with = "serialize_token")]
    pub authorization_token: Option<SecretString>,

    /// Overall timeout applied by the built-in transports.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// `User-Agent` sent by the built-in transports.
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn serialize_token<S>(token: &Option<SecretString>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match token {
        Some(_) => serializer.serialize_some("****"),
        None => serializer.serialize_none(),
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            authorization_token: None,
            timeout_secs: default_timeout_secs(),
            user_agent: None,
        }
    }
}

/// Failure to load a [`DispatcherConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document parsed but failed [`DispatcherConfig::validate`].
    #[error("Configuration validation errors: {0:?}")]
    ValidationErrors(Vec<String>),

    /// The document is not valid TOML or does not match the expected shape.
    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    /// The file could not be read.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DispatcherConfig {
    /// The transport timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The configured `User-Agent` as a header value.
    ///
    /// An agent that is not a legal header value is skipped with a warning; [`validate`]
    /// rejects it up front.
    ///
    /// [`validate`]: Self::validate
    #[must_use]
    pub fn user_agent_header(&self) -> Option<HeaderValue> {
        let user_agent = self.user_agent.as_deref()?;
        match HeaderValue::from_str(user_agent) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "Ignoring user-agent that is not a valid header value.");
                None
            }
        }
    }

    /// Validate the correctness of the configuration.
    ///
    /// Returns:
    /// - `Ok(())` if the configuration is valid.
    /// - `Err(Vec<String>)` containing a list of validation error messages otherwise.
    ///
    /// # Errors
    ///
    /// Every violated rule contributes one message.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.timeout_secs == 0 {
            errors.push("timeout-secs must be greater than zero.".to_owned());
        }

        if let Some(token) = &self.authorization_token {
            let token = token.expose_secret();
            if token.is_empty() {
                errors.push("authorization-token must not be empty.".to_owned());
            } else if token.chars().any(char::is_control) {
                errors.push("authorization-token contains control characters.".to_owned());
            }
        }

        if let Some(user_agent) = &self.user_agent {
            if HeaderValue::from_str(user_agent).is_err() {
                errors.push("user-agent is not a valid header value.".to_owned());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DeserializationError`] for malformed TOML and
    /// [`ConfigError::ValidationErrors`] when [`validate`](Self::validate) fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate().map_err(ConfigError::ValidationErrors)?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IoError`] if the file cannot be read, otherwise the errors of
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = ?path, "Loading dispatcher configuration.");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
