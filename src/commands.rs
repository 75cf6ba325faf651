use serde::Serialize;
use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::rpc::Provider;
use crate::secrets::Secrets;
use crate::secrets_manager::{ListResult, SecretsManager, SecretsManagerError, UploadRequest};
use crate::signer::{SignerError, Wallet};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error(transparent)]
    SecretsManager(#[from] SecretsManagerError),
    #[error("Failed to upload secrets: {0}")]
    UploadFailed(String),
}

/// Where the DON stored the secrets
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub slot_id: u32,
    pub version: u64,
}

/// Build the wallet and provider, then resolve the DON coordinator
async fn connect(config: &Config) -> Result<SecretsManager, CommandError> {
    let wallet = Wallet::from_hex(&config.private_key)?;
    log::info!("Using wallet {}", wallet.address_hex());

    let provider = Provider::new(config.rpc_url.clone());
    let mut manager =
        SecretsManager::new(wallet, provider, &config.router_address, &config.don_id);
    manager.initialize().await?;
    Ok(manager)
}

/// Encrypt `secrets` for the configured DON and store them in its slot
pub async fn upload_secrets(
    config: &Config,
    secrets: &Secrets,
) -> Result<UploadOutcome, CommandError> {
    let manager = connect(config).await?;

    let encrypted = manager.encrypt_secrets(secrets).await?;

    let result = manager
        .upload_encrypted_secrets_to_don(UploadRequest {
            encrypted_secrets_hexstring: &encrypted.encrypted_secrets,
            gateway_urls: &config.gateway_urls,
            slot_id: config.slot_id,
            minutes_until_expiration: config.expiration_minutes,
        })
        .await?;

    if !result.success {
        return Err(CommandError::UploadFailed(
            result
                .error_message
                .unwrap_or_else(|| "unknown error".to_string()),
        ));
    }

    log::info!(
        "Stored secrets in slot {} with version {}",
        config.slot_id,
        result.version
    );
    Ok(UploadOutcome {
        slot_id: config.slot_id,
        version: result.version,
    })
}

/// List what the configured wallet has stored on the DON
pub async fn list_secrets(config: &Config) -> Result<ListResult, CommandError> {
    let manager = connect(config).await?;
    Ok(manager
        .list_don_hosted_encrypted_secrets(&config.gateway_urls)
        .await?)
}
