//! concord-cli: operator frontend for the Concord analytics API
//!
//! # Subcommands
//! - `status`                                   : show server health
//! - `analytics [--device <id>] [--admin-key <key>] [--json]`
//!                                              : fetch and render the analytics payload

use std::collections::BTreeMap;

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8900";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "concord-cli",
    version,
    about = "Concord chatbot analytics: operator CLI"
)]
struct Cli {
    /// Concord HTTP server URL (overrides CONCORD_HTTP_URL env var)
    #[arg(long, env = "CONCORD_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show Concord server status
    Status,

    /// Fetch the analytics payload (counts + consistency scores)
    Analytics {
        /// Scope to one device id (sent as X-Device-Id)
        #[arg(long)]
        device: Option<String>,

        /// Admin dashboard token for the system-wide view (sent as X-Admin-Key)
        #[arg(long, env = "CONCORD_ADMIN_KEY")]
        admin_key: Option<String>,

        /// Print the raw JSON payload instead of the rendered report
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct Totals {
    pub chats: i64,
    pub devices: i64,
    pub pii_flags: i64,
    pub pii_devices: i64,
}

#[derive(Debug, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Deserialize)]
pub struct DayCount {
    pub date: String,
    pub count: i64,
}

/// The full payload from GET /api/analytics
#[derive(Debug, Deserialize)]
pub struct AnalyticsPayload {
    pub totals: Totals,
    pub top_categories: Vec<CategoryCount>,
    pub by_day: Vec<DayCount>,
    #[serde(rename = "consistencyScore")]
    pub consistency_score: f64,
    #[serde(rename = "consistencyByCategory")]
    pub consistency_by_category: BTreeMap<String, f64>,
}

// ============================================================================
// Rendering
// ============================================================================

/// Render the analytics payload as a human-readable report.
pub fn render_analytics(payload: &AnalyticsPayload) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Chats: {}   Devices: {}   PII blocks: {} (from {} devices)\n",
        payload.totals.chats,
        payload.totals.devices,
        payload.totals.pii_flags,
        payload.totals.pii_devices
    ));

    out.push_str(&format!(
        "\nConsistency score: {:.1}\n",
        payload.consistency_score
    ));

    out.push_str("\nConsistency by category:\n");
    for (category, score) in &payload.consistency_by_category {
        out.push_str(&format!("  {:<28} {:>6.1}\n", category, score));
    }

    if !payload.top_categories.is_empty() {
        out.push_str("\nTop categories:\n");
        for entry in &payload.top_categories {
            out.push_str(&format!("  {:<28} {:>6}\n", entry.category, entry.count));
        }
    }

    if !payload.by_day.is_empty() {
        out.push_str("\nQuestions per day:\n");
        for entry in &payload.by_day {
            out.push_str(&format!("  {}  {:>6}\n", entry.date, entry.count));
        }
    }

    out
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn do_analytics(
    server: &str,
    device: Option<&str>,
    admin_key: Option<&str>,
    json_output: bool,
) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()?;

    let url = format!("{}/api/analytics", server);
    let mut request = client.get(&url);

    if let Some(device) = device {
        request = request.header("X-Device-Id", device);
    }
    if let Some(key) = admin_key {
        request = request.header("X-Admin-Key", key);
    }

    let resp = match request.send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("concord-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("concord-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    if json_output {
        let raw: serde_json::Value = resp.json()?;
        println!("{}", serde_json::to_string_pretty(&raw)?);
        return Ok(());
    }

    let payload: AnalyticsPayload = match resp.json() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("concord-cli: failed to parse analytics response: {}", e);
            std::process::exit(1);
        }
    };

    print!("{}", render_analytics(&payload));
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;

    let url = format!("{}/health", server);
    let resp = client.get(&url).send();

    match resp {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Concord server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:        {}", body["version"].as_str().unwrap_or("?"));
            println!("PostgreSQL:     {}", body["postgresql"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            let status = r.status();
            eprintln!("concord-cli: server unhealthy (HTTP {})", status);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("concord-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Status => do_status(&server),
        Commands::Analytics {
            device,
            admin_key,
            json,
        } => do_analytics(&server, device.as_deref(), admin_key.as_deref(), json),
    };

    if let Err(e) = result {
        eprintln!("concord-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
