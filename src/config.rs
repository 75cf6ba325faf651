use thiserror::Error;

// Chainlink Functions on Ethereum Sepolia
pub const FUNCTIONS_ROUTER_ADDRESS: &str = "0xb83E47C2bC239B3bf370bc41e1459A34b41238D0";
pub const DON_ID: &str = "fun-ethereum-sepolia-1";
pub const GATEWAY_URLS: [&str; 2] = [
    "https://01.functions-gateway.testnet.chain.link/",
    "https://02.functions-gateway.testnet.chain.link/",
];

pub const DEFAULT_SLOT_ID: u32 = 0;
pub const DEFAULT_EXPIRATION_MINUTES: u64 = 1440;

const PRIVATE_KEY_VAR: &str = "PRIVATE_KEY";
const RPC_URL_VAR: &str = "SEPOLIA_RPC_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    MissingVar(&'static str),
}

#[derive(Clone)]
pub struct Config {
    pub router_address: String,
    pub don_id: String,
    pub gateway_urls: Vec<String>,
    pub slot_id: u32,
    pub expiration_minutes: u64,
    pub rpc_url: String,
    pub private_key: String,
}

impl Config {
    /// Read the wallet key and RPC endpoint from the environment.
    /// Everything else uses the Sepolia defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let private_key = read_var(PRIVATE_KEY_VAR)?;
        let rpc_url = read_var(RPC_URL_VAR)?;

        Ok(Self::new(rpc_url, private_key))
    }

    pub fn new(rpc_url: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            router_address: FUNCTIONS_ROUTER_ADDRESS.to_string(),
            don_id: DON_ID.to_string(),
            gateway_urls: GATEWAY_URLS.iter().map(|u| u.to_string()).collect(),
            slot_id: DEFAULT_SLOT_ID,
            expiration_minutes: DEFAULT_EXPIRATION_MINUTES,
            rpc_url: rpc_url.into(),
            private_key: private_key.into(),
        }
    }
}

// The private key must never end up in logs
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("router_address", &self.router_address)
            .field("don_id", &self.don_id)
            .field("gateway_urls", &self.gateway_urls)
            .field("slot_id", &self.slot_id)
            .field("expiration_minutes", &self.expiration_minutes)
            .field("rpc_url", &self.rpc_url)
            .finish_non_exhaustive()
    }
}

/// Merge a `.env` file from the working directory into the environment.
/// Variables already set win.
pub fn load_dotenv() {
    if dotenv::dotenv().is_ok() {
        log::debug!("Loaded variables from .env");
    }
}

fn read_var(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(name)),
    }
}
