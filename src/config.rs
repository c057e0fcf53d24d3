//! Configuration types.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

/// Default polling interval: 30 seconds.
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 30_000;

/// Default bound on retries for a single external call.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default Grok model.
pub const DEFAULT_GROK_MODEL: &str = "grok-beta";

/// Credentials for the X API. Only the bearer token is used for requests;
/// the OAuth fields are carried so a user-context signer can be added.
#[derive(Debug, Clone)]
pub struct XApiConfig {
    pub api_key: Option<SecretString>,
    pub api_secret: Option<SecretString>,
    pub access_token: Option<SecretString>,
    pub access_token_secret: Option<SecretString>,
    pub bearer_token: Option<SecretString>,
}

impl XApiConfig {
    /// True when requests can be authenticated.
    pub fn has_bearer_token(&self) -> bool {
        self.bearer_token
            .as_ref()
            .is_some_and(|t| !t.expose_secret().is_empty())
    }
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Handle of the monitored account, without the leading `@`.
    pub username: String,
    /// xAI key for Grok. `None` selects the heuristic oracle.
    pub xai_api_key: Option<SecretString>,
    /// Grok model name.
    pub grok_model: String,
    pub x_api: XApiConfig,
    /// Delay between polling cycles.
    pub polling_interval: Duration,
    /// Retries allowed per external HTTP call.
    pub max_retries: u32,
}

impl AgentConfig {
    /// Load configuration from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let secret = |key: &str| non_empty(key).map(SecretString::from);

        let username = non_empty("X_USERNAME")
            .map(|u| u.trim_start_matches('@').to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "X_USERNAME".to_string(),
                hint: "Set it to the handle the agent should monitor".to_string(),
            })?;

        let polling_interval_ms = parse_or(
            "POLLING_INTERVAL_MS",
            non_empty("POLLING_INTERVAL_MS"),
            DEFAULT_POLLING_INTERVAL_MS,
        )?;
        if polling_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "POLLING_INTERVAL_MS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let max_retries = parse_or("MAX_RETRIES", non_empty("MAX_RETRIES"), DEFAULT_MAX_RETRIES)?;

        let x_api = XApiConfig {
            api_key: secret("X_API_KEY"),
            api_secret: secret("X_API_SECRET"),
            access_token: secret("X_ACCESS_TOKEN"),
            access_token_secret: secret("X_ACCESS_TOKEN_SECRET"),
            bearer_token: secret("X_BEARER_TOKEN"),
        };

        let config = Self {
            username,
            xai_api_key: secret("XAI_API_KEY"),
            grok_model: non_empty("GROK_MODEL").unwrap_or_else(|| DEFAULT_GROK_MODEL.to_string()),
            x_api,
            polling_interval: Duration::from_millis(polling_interval_ms),
            max_retries,
        };

        if !config.x_api.has_bearer_token() {
            tracing::warn!("X_BEARER_TOKEN not set - X API calls will be simulated");
        }
        if config.xai_api_key.is_none() {
            tracing::warn!("XAI_API_KEY not set - Grok decisions will be simulated");
        }

        Ok(config)
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{value}': {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AgentConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AgentConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn missing_username_is_fatal() {
        let err = config_from(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "X_USERNAME"));
    }

    #[test]
    fn blank_username_is_fatal() {
        assert!(config_from(&[("X_USERNAME", "  ")]).is_err());
        assert!(config_from(&[("X_USERNAME", "@")]).is_err());
    }

    #[test]
    fn defaults_apply() {
        let config = config_from(&[("X_USERNAME", "mybot")]).unwrap();
        assert_eq!(config.username, "mybot");
        assert_eq!(config.polling_interval, Duration::from_millis(30_000));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.grok_model, "grok-beta");
        assert!(config.xai_api_key.is_none());
        assert!(!config.x_api.has_bearer_token());
    }

    #[test]
    fn strips_leading_at() {
        let config = config_from(&[("X_USERNAME", "@mybot")]).unwrap();
        assert_eq!(config.username, "mybot");
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("X_USERNAME", "mybot"),
            ("POLLING_INTERVAL_MS", "5000"),
            ("MAX_RETRIES", "0"),
            ("X_BEARER_TOKEN", "token"),
            ("XAI_API_KEY", "xai-key"),
            ("GROK_MODEL", "grok-2"),
        ])
        .unwrap();
        assert_eq!(config.polling_interval, Duration::from_millis(5000));
        assert_eq!(config.max_retries, 0);
        assert!(config.x_api.has_bearer_token());
        assert_eq!(config.xai_api_key.unwrap().expose_secret(), "xai-key");
        assert_eq!(config.grok_model, "grok-2");
    }

    #[test]
    fn rejects_invalid_interval() {
        let err = config_from(&[("X_USERNAME", "mybot"), ("POLLING_INTERVAL_MS", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "POLLING_INTERVAL_MS"));

        let err = config_from(&[("X_USERNAME", "mybot"), ("POLLING_INTERVAL_MS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
