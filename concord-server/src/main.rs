use std::sync::Arc;

use clap::Parser;
use concord_core::ConcordConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use concord_server::http::{self, HttpState};
use concord_server::subsystems::providers;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "concord.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience, production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match ConcordConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Connect to DB
    let pool = match concord_core::db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match concord_core::db::health_check(&pool).await {
            Ok(v) => println!("PostgreSQL connected: {}", v),
            Err(e) => {
                println!("PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }

        println!("Concord DB health check passed");
        return Ok(());
    }

    // Provider clients are built once and shared for the life of the process
    let embedder: Arc<dyn concord_core::embeddings::EmbeddingBackend> =
        match providers::embedding_backend_from_config(&config) {
            Ok(b) => Arc::from(b),
            Err(e) => {
                eprintln!("Failed to create embedding backend: {}", e);
                std::process::exit(1);
            }
        };

    let chat: Arc<dyn concord_core::completions::ChatBackend> =
        match providers::chat_backend_from_config(&config) {
            Ok(b) => Arc::from(b),
            Err(e) => {
                eprintln!("Failed to create chat backend: {}", e);
                std::process::exit(1);
            }
        };

    // Shutdown signal
    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let state = Arc::new(HttpState {
        pool,
        config,
        embedder,
        chat,
    });

    http::start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
