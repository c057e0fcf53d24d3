//! Error types for the mention agent.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors from the social-media API client.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Rate limited on {endpoint}")]
    RateLimited { endpoint: String },

    #[error("Unexpected response shape from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("Unknown account: @{handle}")]
    UnknownAccount { handle: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} unavailable: HTTP {status}")]
    Unavailable { provider: String, status: u16 },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decision oracle failures. Never escape the processor's oracle boundary.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Reasoning service failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Malformed decision: {0}")]
    Malformed(String),

    #[error("Invalid action: {0}")]
    InvalidAction(#[from] ActionError),
}

/// Rejections from the validating `AgentAction` constructors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("{kind} action requires non-empty {field}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("unknown action type: '{0}'")]
    UnknownKind(String),
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Mention fetch failed: {0}")]
    MentionFetch(#[source] ChannelError),

    #[error("Cycle task failed: {0}")]
    CycleTask(String),
}
