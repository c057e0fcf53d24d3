//! LLM integration.
//!
//! The decision oracle talks to Grok through the `LlmProvider` trait, so
//! tests and alternative backends plug in without touching the pipeline.

pub mod grok;
pub mod provider;

pub use grok::GrokProvider;
pub use provider::*;

use std::sync::Arc;

use secrecy::SecretString;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub model: String,
    pub max_retries: u32,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    tracing::info!("Using Grok (model: {})", config.model);
    Arc::new(GrokProvider::new(
        config.api_key.clone(),
        config.model.clone(),
        config.max_retries,
    ))
}
