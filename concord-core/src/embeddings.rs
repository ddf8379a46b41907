//! Embeddings module for Concord: Azure OpenAI embedding support
//!
//! Provides an `EmbeddingBackend` trait with an implementation for the
//! Azure OpenAI Embeddings API (`text-embedding-3-small`, 1536-dim).
//! Every call carries a bounded request timeout and retries with
//! exponential backoff; any error that survives the retries is returned
//! to the caller as an explicit `EmbeddingError`, never swallowed.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

/// Default `text-embedding-3-small` embedding dimensions
pub const EMBEDDING_DIMENSIONS: usize = 1536;

// ============================================================================
// EmbeddingBackend trait
// ============================================================================

/// Abstraction over embedding providers.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a single text. Any provider failure, including timeouts,
    /// surfaces as an `Err`: callers decide whether an item is droppable.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Returns the embedding dimension (e.g., 1536).
    fn dimensions(&self) -> usize;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

/// Embedding generation errors
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: String, message: String },

    #[error("Invalid response: expected {expected} dimensions, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("Missing embedding in response")]
    MissingEmbedding,

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

// ============================================================================
// Config
// ============================================================================

/// Azure OpenAI embedding client configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
    pub dimensions: usize,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
}

impl EmbeddingConfig {
    pub fn new(api_key: Option<String>, deployment: String, api_version: String) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("AZURE_OPENAI_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            deployment,
            api_version,
            dimensions: EMBEDDING_DIMENSIONS,
            max_retries: 3,
            retry_delay_ms: 1000,
            timeout_seconds: 30,
        }
    }
}

// ============================================================================
// Azure OpenAI API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct AzureEmbeddingRequest {
    input: String,
}

#[derive(Debug, Deserialize)]
struct AzureEmbeddingResponse {
    data: Vec<AzureEmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct AzureEmbeddingItem {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct AzureErrorResponse {
    error: Option<AzureErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct AzureErrorDetail {
    #[serde(default)]
    code: String,
    message: String,
}

// ============================================================================
// AzureEmbeddingClient
// ============================================================================

/// Azure OpenAI embedding client: calls a deployment's embeddings endpoint.
#[derive(Debug, Clone)]
pub struct AzureEmbeddingClient {
    client: Client,
    config: EmbeddingConfig,
    base_url: String,
}

impl AzureEmbeddingClient {
    pub fn new(config: EmbeddingConfig, endpoint: String) -> Result<Self, EmbeddingError> {
        if config.api_key.is_empty() {
            return Err(EmbeddingError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(config: EmbeddingConfig, base_url: String) -> Result<Self, EmbeddingError> {
        Self::new(config, base_url)
    }

    /// Generate an embedding for the given text, retrying transient failures.
    pub async fn embed_raw(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let result = Retry::spawn(retry_strategy, || self.embed_once(text)).await;

        match result {
            Ok(vec) => Ok(vec),
            Err(e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All embedding retry attempts failed"
                );
                Err(EmbeddingError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            self.base_url, self.config.deployment, self.config.api_version
        );

        let request = AzureEmbeddingRequest {
            input: text.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .header("api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let error_detail = serde_json::from_str::<AzureErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error);

            let (code, message) = error_detail
                .map(|e| (e.code, e.message))
                .unwrap_or((status.as_u16().to_string(), error_body));

            tracing::error!(code = %code, message = %message, "Azure OpenAI embeddings API error");

            return Err(EmbeddingError::Api { code, message });
        }

        let embedding_response: AzureEmbeddingResponse = response.json().await?;

        let values = embedding_response
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or(EmbeddingError::MissingEmbedding)?;

        if values.len() != self.config.dimensions {
            return Err(EmbeddingError::InvalidDimensions {
                expected: self.config.dimensions,
                actual: values.len(),
            });
        }

        Ok(values)
    }
}

#[async_trait]
impl EmbeddingBackend for AzureEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_raw(text).await
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        "azure-openai"
    }
}

// ============================================================================
// TESTS
// ============================================================================
