//! Chat completions module: Azure OpenAI chat support
//!
//! The chat provider is a black box from Concord's point of view: only its
//! latency and failure behavior matter. The client mirrors the embeddings
//! client: bounded request timeout, typed errors, `with_base_url` for tests.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ChatBackend trait
// ============================================================================

/// A single message in a chat prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Abstraction over chat-completion providers.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Produce a completion for the given prompt.
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, CompletionError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: String, message: String },

    #[error("Missing completion in response")]
    MissingCompletion,

    #[error("Missing API key")]
    MissingApiKey,
}

// ============================================================================
// Config
// ============================================================================

/// Azure OpenAI chat client configuration
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
}

impl CompletionConfig {
    pub fn new(api_key: Option<String>, deployment: String, api_version: String) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("AZURE_OPENAI_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            deployment,
            api_version,
            temperature: 0.2,
            max_tokens: 800,
            timeout_seconds: 60,
        }
    }
}

// ============================================================================
// Azure OpenAI API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct AzureChatRequest<'a> {
    messages: &'a [PromptMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AzureChatResponse {
    choices: Vec<AzureChatChoice>,
}

#[derive(Debug, Deserialize)]
struct AzureChatChoice {
    message: AzureChatMessage,
}

#[derive(Debug, Deserialize)]
struct AzureChatMessage {
    content: Option<String>,
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
// AzureChatClient
// ============================================================================

/// Azure OpenAI chat client: calls a deployment's chat/completions endpoint.
#[derive(Debug, Clone)]
pub struct AzureChatClient {
    client: Client,
    config: CompletionConfig,
    base_url: String,
}

impl AzureChatClient {
    pub fn new(config: CompletionConfig, endpoint: String) -> Result<Self, CompletionError> {
        if config.api_key.is_empty() {
            return Err(CompletionError::MissingApiKey);
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
    pub fn with_base_url(config: CompletionConfig, base_url: String) -> Result<Self, CompletionError> {
        Self::new(config, base_url)
    }

    async fn complete_once(&self, messages: &[PromptMessage]) -> Result<String, CompletionError> {
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.base_url, self.config.deployment, self.config.api_version
        );

        let request = AzureChatRequest {
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
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

            tracing::error!(code = %code, message = %message, "Azure OpenAI chat API error");

            return Err(CompletionError::Api { code, message });
        }

        let chat_response: AzureChatResponse = response.json().await?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(CompletionError::MissingCompletion)
    }
}

#[async_trait]
impl ChatBackend for AzureChatClient {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, CompletionError> {
        self.complete_once(messages).await
    }

    fn name(&self) -> &str {
        "azure-openai"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_key: &str) -> CompletionConfig {
        CompletionConfig {
            api_key: api_key.to_string(),
            deployment: "gpt-4o".to_string(),
            api_version: "2024-02-01".to_string(),
            temperature: 0.2,
            max_tokens: 800,
            timeout_seconds: 10,
        }
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice_content() {
        let mock_server = MockServer::start().await;
        let config = test_config("test-api-key");
        let client = AzureChatClient::with_base_url(config, mock_server.uri())
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4o/chat/completions"))
            .and(header("api-key", "test-api-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [
                    { "message": { "role": "assistant", "content": "The move-in date is August 15." } }
                ]
            })))
            .mount(&mock_server)
            .await;

        let messages = vec![
            PromptMessage::new("system", "You are a helpful assistant."),
            PromptMessage::new("user", "When is move-in?"),
        ];

        let result = client.complete(&messages).await;
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result.err());
        assert_eq!(result.unwrap(), "The move-in date is August 15.");
    }

    #[tokio::test]
    async fn test_complete_returns_api_error_on_500() {
        let mock_server = MockServer::start().await;
        let config = test_config("test-api-key");
        let client = AzureChatClient::with_base_url(config, mock_server.uri())
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": { "code": "InternalServerError", "message": "boom" }
            })))
            .mount(&mock_server)
            .await;

        let messages = vec![PromptMessage::new("user", "hello")];
        let result = client.complete(&messages).await;

        match result {
            Err(CompletionError::Api { code, message }) => {
                assert_eq!(code, "InternalServerError");
                assert_eq!(message, "boom");
            }
            other => panic!("Expected Api error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_errors_on_empty_choices() {
        let mock_server = MockServer::start().await;
        let config = test_config("test-api-key");
        let client = AzureChatClient::with_base_url(config, mock_server.uri())
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": []
            })))
            .mount(&mock_server)
            .await;

        let messages = vec![PromptMessage::new("user", "hello")];
        let result = client.complete(&messages).await;

        assert!(matches!(result, Err(CompletionError::MissingCompletion)));
    }

    #[tokio::test]
    async fn test_client_fails_with_missing_api_key() {
        let config = test_config("");
        let result = AzureChatClient::with_base_url(config, "http://localhost".to_string());

        assert!(matches!(result, Err(CompletionError::MissingApiKey)));
    }
}
