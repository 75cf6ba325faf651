//! List the secrets the configured wallet has stored on the DON
//!
//! Usage: list-secrets [--gateway <url>]...

use chrono::{TimeZone, Utc};
use clap::Parser;
use std::process::ExitCode;

use secrets2don_lib::commands;
use secrets2don_lib::config::{self, Config};
use secrets2don_lib::gateway::SecretsRow;

#[derive(Parser)]
#[command(name = "list-secrets")]
#[command(about = "Show the DON-hosted secrets stored by this wallet")]
#[command(version)]
struct Cli {
    /// Gateway URL to use instead of the defaults (repeatable)
    #[arg(long = "gateway")]
    gateways: Vec<String>,
}

fn format_expiration(row: &SecretsRow) -> String {
    i64::try_from(row.expiration)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| row.expiration.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    secrets2don_lib::init_logging();
    config::load_dotenv();
    let cli = Cli::parse();

    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if !cli.gateways.is_empty() {
        config.gateway_urls = cli.gateways;
    }

    let listed = match commands::list_secrets(&config).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Error listing secrets: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                    DON-HOSTED SECRETS                        ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║ DON: {:<55} ║", config.don_id);
    for node in &listed.node_responses {
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ Node: {:<54} ║", node.node_address);
        if !node.success {
            let reason = node.error_message.as_deref().unwrap_or("unknown error");
            println!("║   error: {:<51} ║", reason);
            continue;
        }
        if node.rows.is_empty() {
            println!("║   (no secrets stored)                                        ║");
        }
        for row in &node.rows {
            println!(
                "║   slot {:<3} version {:<12} expires {:<23} ║",
                row.slot_id,
                row.version,
                format_expiration(row)
            );
        }
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    match listed.error {
        Some(e) => {
            eprintln!("Warning: {}", e);
            ExitCode::FAILURE
        }
        None => ExitCode::SUCCESS,
    }
}
