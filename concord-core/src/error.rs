use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConcordError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Embedding error: {0}")]
    Embedding(#[from] crate::embeddings::EmbeddingError),

    #[error("Completion error: {0}")]
    Completion(#[from] crate::completions::CompletionError),

    #[error("Other error: {0}")]
    Other(String),
}
