//! Backend factory.
//!
//! Resolves a provider name to a client, applying default endpoints and
//! checking that required secrets are present.

use crate::client::LlmClient;
use crate::providers::{MockClient, OllamaClient, OpenAiCompatClient};
use crate::types::ProviderType;
use locodata_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Create a backend client.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama", "openai", "qwen", "mock")
/// * `endpoint` - Custom endpoint URL, replacing the provider default
/// * `api_key` - API key for providers that require one
/// * `timeout` - Per-request HTTP timeout
///
/// # Errors
/// `AppError::Config` for an unknown provider or a missing API key.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
    timeout: Duration,
) -> AppResult<Arc<dyn LlmClient>> {
    let provider_type = ProviderType::parse(provider)
        .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;

    let base_url = endpoint
        .or_else(|| provider_type.default_endpoint())
        .unwrap_or_default();

    if provider_type.requires_api_key() && api_key.map_or(true, str::is_empty) {
        return Err(AppError::Config(format!(
            "{} provider requires API key",
            provider_type.as_str()
        )));
    }

    tracing::debug!(provider = provider_type.as_str(), endpoint = base_url, "Creating backend client");

    match provider_type {
        ProviderType::Ollama => Ok(Arc::new(OllamaClient::with_base_url(base_url, timeout)?)),
        ProviderType::OpenAi | ProviderType::Qwen => Ok(Arc::new(OpenAiCompatClient::new(
            provider_type.as_str(),
            base_url,
            api_key.unwrap_or_default(),
            timeout,
        )?)),
        ProviderType::Mock => Ok(Arc::new(MockClient::new())),
    }
}
