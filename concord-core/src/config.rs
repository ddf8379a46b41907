use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ConcordConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub chat: ChatConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
    pub dimensions: u32,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    pub history_turns: u32,
    pub system_prompt: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalyticsConfig {
    pub recent_chat_limit: i64,
    pub embed_concurrency: u32,
    pub question_key_max_chars: u32,
    pub answer_embed_max_chars: u32,
    pub usage_window_days: i32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            recent_chat_limit: 200,
            embed_concurrency: 4,
            question_key_max_chars: 200,
            answer_embed_max_chars: 2000,
            usage_window_days: 7,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub admin_token: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8900,
            admin_token: "change-me".to_string(),
        }
    }
}

impl ConcordConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        s.try_deserialize()
    }
}
