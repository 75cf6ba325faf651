//! Upload the Alpaca credentials to the Sepolia Functions DON.
//!
//! Reads PRIVATE_KEY, SEPOLIA_RPC_URL, ALPACA_API_KEY and ALPACA_SECRET_KEY
//! from the environment (or a `.env` file).

use clap::Parser;
use std::process::ExitCode;

use secrets2don_lib::commands::{self, CommandError};
use secrets2don_lib::config::{self, Config, DEFAULT_EXPIRATION_MINUTES, DEFAULT_SLOT_ID};
use secrets2don_lib::secrets::Secrets;

#[derive(Parser)]
#[command(name = "upload-secrets")]
#[command(about = "Encrypt API credentials for the Functions DON and upload them to its gateways")]
#[command(version)]
struct Cli {
    /// DON storage slot to write
    #[arg(long, env = "SLOT_ID", default_value_t = DEFAULT_SLOT_ID)]
    slot_id: u32,

    /// Minutes until the DON discards the secrets
    #[arg(long, env = "EXPIRATION_MINUTES", default_value_t = DEFAULT_EXPIRATION_MINUTES)]
    expiration_minutes: u64,

    /// Gateway URL to use instead of the defaults (repeatable)
    #[arg(long = "gateway")]
    gateways: Vec<String>,
}

async fn run(cli: Cli) -> Result<(), CommandError> {
    let mut config = Config::from_env()?;
    config.slot_id = cli.slot_id;
    config.expiration_minutes = cli.expiration_minutes;
    if !cli.gateways.is_empty() {
        config.gateway_urls = cli.gateways;
    }
    log::debug!("{:?}", config);

    let secrets = Secrets::from_env();
    let outcome = commands::upload_secrets(&config, &secrets).await?;

    println!();
    println!("Secrets uploaded successfully to slot {}", outcome.slot_id);
    println!("secrets version: {}", outcome.version);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    secrets2don_lib::init_logging();
    config::load_dotenv();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
