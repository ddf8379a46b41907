pub mod completions;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod models;
pub mod pii;
pub mod scoring;
pub mod store;
pub mod taxonomy;

pub use completions::{
    AzureChatClient, ChatBackend, CompletionConfig, CompletionError, PromptMessage,
};
pub use config::ConcordConfig;
pub use embeddings::{
    AzureEmbeddingClient, EmbeddingBackend, EmbeddingConfig, EmbeddingError, EMBEDDING_DIMENSIONS,
};
pub use error::ConcordError;
