//! Provider factories
//!
//! Builds the embedding and chat backends once from the application config;
//! the resulting handles are shared by reference for the life of the process,
//! which keeps test doubles trivial to substitute.

use concord_core::completions::{AzureChatClient, ChatBackend, CompletionConfig, CompletionError};
use concord_core::embeddings::{
    AzureEmbeddingClient, EmbeddingBackend, EmbeddingConfig, EmbeddingError,
};
use concord_core::ConcordConfig;

pub fn embedding_backend_from_config(
    config: &ConcordConfig,
) -> Result<Box<dyn EmbeddingBackend>, EmbeddingError> {
    let settings = &config.embedding;

    let client_config = EmbeddingConfig {
        api_key: std::env::var("AZURE_OPENAI_API_KEY").unwrap_or_default(),
        deployment: settings.deployment.clone(),
        api_version: settings.api_version.clone(),
        dimensions: settings.dimensions as usize,
        max_retries: settings.max_retries as usize,
        retry_delay_ms: settings.retry_delay_ms,
        timeout_seconds: settings.timeout_seconds,
    };

    Ok(Box::new(AzureEmbeddingClient::new(
        client_config,
        settings.endpoint.clone(),
    )?))
}

pub fn chat_backend_from_config(
    config: &ConcordConfig,
) -> Result<Box<dyn ChatBackend>, CompletionError> {
    let settings = &config.chat;

    let client_config = CompletionConfig {
        api_key: std::env::var("AZURE_OPENAI_API_KEY").unwrap_or_default(),
        deployment: settings.deployment.clone(),
        api_version: settings.api_version.clone(),
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
        timeout_seconds: settings.timeout_seconds,
    };

    Ok(Box::new(AzureChatClient::new(
        client_config,
        settings.endpoint.clone(),
    )?))
}
