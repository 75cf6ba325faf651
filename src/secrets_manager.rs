use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::crypto::{self, CryptoError, ThresholdPublicKey};
use crate::ecies::{self, EciesError};
use crate::gateway::{
    GatewayClient, GatewayError, NodeResponse, METHOD_SECRETS_LIST, METHOD_SECRETS_SET,
};
use crate::rpc::{self, Provider, RpcError};
use crate::secrets::Secrets;
use crate::signer::{to_checksum_address, SignerError, Wallet};

const GET_CONTRACT_BY_ID: &str = "getContractById(bytes32)";
const GET_THRESHOLD_PUBLIC_KEY: &str = "getThresholdPublicKey()";
const GET_DON_PUBLIC_KEY: &str = "getDONPublicKey()";

pub const MIN_EXPIRATION_MINUTES: u64 = 5;

#[derive(Debug, Error)]
pub enum SecretsManagerError {
    #[error("SecretsManager has not been initialized")]
    NotInitialized,
    #[error("No coordinator registered for DON id '{0}'")]
    CoordinatorNotFound(String),
    #[error("Secrets are empty")]
    EmptySecrets,
    #[error("Encrypted secrets must be a 0x-prefixed hex string")]
    InvalidHexstring,
    #[error("No gateway URLs provided")]
    NoGatewayUrls,
    #[error("Invalid gateway URL: {0}")]
    InvalidGatewayUrl(String),
    #[error("Expiration must be at least 5 minutes, got {0}")]
    ExpirationTooShort(u64),
    #[error("Expiration of {0} minutes is too far in the future")]
    ExpirationTooLong(u64),
    #[error("All nodes failed to store the encrypted secrets")]
    AllNodesFailed,
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Ecies(#[from] EciesError),
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Public keys the DON publishes through its coordinator contract
#[derive(Debug, Clone)]
pub struct DonKeys {
    pub threshold_public_key: ThresholdPublicKey,
    pub don_public_key: k256::PublicKey,
}

#[derive(Debug, Clone)]
pub struct EncryptedSecrets {
    /// `0x`-prefixed hex of the threshold-encrypted envelope
    pub encrypted_secrets: String,
}

#[derive(Debug, Clone)]
pub struct UploadRequest<'a> {
    pub encrypted_secrets_hexstring: &'a str,
    pub gateway_urls: &'a [String],
    pub slot_id: u32,
    pub minutes_until_expiration: u64,
}

#[derive(Debug, Clone)]
pub struct UploadResult {
    pub version: u64,
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ListResult {
    pub node_responses: Vec<NodeResponse>,
    /// Set when a node failed or nodes disagree about the stored rows
    pub error: Option<String>,
}

#[derive(Serialize)]
struct SignedSecrets<'a> {
    message: &'a str,
    signature: &'a str,
}

// Field order is part of the signed bytes
#[derive(Serialize)]
struct StorageMessage<'a> {
    address: String,
    slotid: u32,
    payload: &'a str,
    version: u64,
    expiration: u64,
}

pub struct SecretsManager {
    wallet: Arc<Wallet>,
    provider: Provider,
    router_address: String,
    don_id: String,
    gateway: GatewayClient,
    coordinator_address: Option<String>,
}

impl SecretsManager {
    pub fn new(
        wallet: Wallet,
        provider: Provider,
        router_address: impl Into<String>,
        don_id: impl Into<String>,
    ) -> Self {
        let wallet = Arc::new(wallet);
        let don_id = don_id.into();
        Self {
            gateway: GatewayClient::new(Arc::clone(&wallet), don_id.clone()),
            wallet,
            provider,
            router_address: router_address.into(),
            don_id,
            coordinator_address: None,
        }
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn coordinator_address(&self) -> Option<&str> {
        self.coordinator_address.as_deref()
    }

    /// Resolve the coordinator contract serving this DON through the router
    pub async fn initialize(&mut self) -> Result<(), SecretsManagerError> {
        let don_id = rpc::bytes32_from_str(&self.don_id)?;
        let data = rpc::encode_call_bytes32(GET_CONTRACT_BY_ID, &don_id);
        let output = self.provider.eth_call(&self.router_address, &data).await?;
        let address = rpc::decode_address(&output)?;

        if address == [0u8; 20] {
            return Err(SecretsManagerError::CoordinatorNotFound(self.don_id.clone()));
        }

        let coordinator = to_checksum_address(&address);
        log::info!("DON '{}' is served by coordinator {}", self.don_id, coordinator);
        self.coordinator_address = Some(coordinator);
        Ok(())
    }

    fn coordinator(&self) -> Result<&str, SecretsManagerError> {
        self.coordinator_address
            .as_deref()
            .ok_or(SecretsManagerError::NotInitialized)
    }

    pub async fn fetch_keys(&self) -> Result<DonKeys, SecretsManagerError> {
        let coordinator = self.coordinator()?;

        let output = self
            .provider
            .eth_call(coordinator, &rpc::selector(GET_THRESHOLD_PUBLIC_KEY))
            .await?;
        let threshold_public_key = ThresholdPublicKey::from_json(&rpc::decode_bytes(&output)?)?;

        let output = self
            .provider
            .eth_call(coordinator, &rpc::selector(GET_DON_PUBLIC_KEY))
            .await?;
        let don_public_key = ecies::parse_public_key(&rpc::decode_bytes(&output)?)?;

        Ok(DonKeys {
            threshold_public_key,
            don_public_key,
        })
    }

    /// Sign the secrets with the wallet, encrypt them to the DON key, then
    /// threshold-encrypt the result
    pub async fn encrypt_secrets(
        &self,
        secrets: &Secrets,
    ) -> Result<EncryptedSecrets, SecretsManagerError> {
        if secrets.is_empty() {
            return Err(SecretsManagerError::EmptySecrets);
        }
        let keys = self.fetch_keys().await?;

        let message = secrets.to_json().map_err(|_| CryptoError::InvalidPayload)?;
        let signature = self.wallet.sign_message_hex(message.as_bytes())?;
        let signed = serde_json::to_vec(&SignedSecrets {
            message: &message,
            signature: &signature,
        })
        .map_err(|_| CryptoError::InvalidPayload)?;

        let don_encrypted = ecies::encrypt(&keys.don_public_key, &signed)?;
        let wrapped = json!({ "0x0": STANDARD.encode(don_encrypted) }).to_string();
        let sealed = crypto::encrypt(&keys.threshold_public_key, wrapped.as_bytes())?;

        log::info!("Encrypted {} secrets for DON '{}'", secrets.len(), self.don_id);
        Ok(EncryptedSecrets {
            encrypted_secrets: format!("0x{}", hex::encode(sealed)),
        })
    }

    pub async fn upload_encrypted_secrets_to_don(
        &self,
        request: UploadRequest<'_>,
    ) -> Result<UploadResult, SecretsManagerError> {
        self.coordinator()?;

        let payload_bytes = decode_hexstring(request.encrypted_secrets_hexstring)?;
        validate_gateway_urls(request.gateway_urls)?;
        if request.minutes_until_expiration < MIN_EXPIRATION_MINUTES {
            return Err(SecretsManagerError::ExpirationTooShort(
                request.minutes_until_expiration,
            ));
        }

        let now = Utc::now();
        let version = now.timestamp().max(0) as u64;
        let expiration = request
            .minutes_until_expiration
            .checked_mul(60 * 1000)
            .and_then(|ms| ms.checked_add(now.timestamp_millis().max(0) as u64))
            .ok_or(SecretsManagerError::ExpirationTooLong(
                request.minutes_until_expiration,
            ))?;
        let payload = STANDARD.encode(payload_bytes);

        let message = StorageMessage {
            address: STANDARD.encode(self.wallet.address()),
            slotid: request.slot_id,
            payload: &payload,
            version,
            expiration,
        };
        let message_json =
            serde_json::to_vec(&message).map_err(|_| CryptoError::InvalidPayload)?;
        let storage_signature = STANDARD.encode(self.wallet.sign_message(&message_json)?);

        let gateway_payload = json!({
            "slot_id": request.slot_id,
            "version": version,
            "payload": payload,
            "expiration": expiration,
            "signature": storage_signature,
        });

        let responses = self
            .gateway
            .send(request.gateway_urls, METHOD_SECRETS_SET, Some(gateway_payload))
            .await?;

        let failures: Vec<String> = responses
            .iter()
            .filter(|node| !node.success)
            .map(|node| {
                let reason = node.error_message.as_deref().unwrap_or("unknown error");
                log::warn!("Node {} responded with error: {}", node.node_address, reason);
                format!("{}: {}", node.node_address, reason)
            })
            .collect();

        if failures.len() == responses.len() {
            return Err(SecretsManagerError::AllNodesFailed);
        }

        if !failures.is_empty() {
            return Ok(UploadResult {
                version,
                success: false,
                error_message: Some(format!(
                    "{} of {} nodes failed to store the secrets ({})",
                    failures.len(),
                    responses.len(),
                    failures.join("; ")
                )),
            });
        }

        Ok(UploadResult {
            version,
            success: true,
            error_message: None,
        })
    }

    /// Ask the DON which secrets the wallet currently has stored
    pub async fn list_don_hosted_encrypted_secrets(
        &self,
        gateway_urls: &[String],
    ) -> Result<ListResult, SecretsManagerError> {
        self.coordinator()?;
        validate_gateway_urls(gateway_urls)?;

        let node_responses = self
            .gateway
            .send(gateway_urls, METHOD_SECRETS_LIST, None)
            .await?;
        let error = verify_node_rows(&node_responses).err();

        Ok(ListResult {
            node_responses,
            error,
        })
    }
}

fn decode_hexstring(value: &str) -> Result<Vec<u8>, SecretsManagerError> {
    let stripped = value
        .strip_prefix("0x")
        .filter(|rest| !rest.is_empty())
        .ok_or(SecretsManagerError::InvalidHexstring)?;
    hex::decode(stripped).map_err(|_| SecretsManagerError::InvalidHexstring)
}

fn validate_gateway_urls(urls: &[String]) -> Result<(), SecretsManagerError> {
    if urls.is_empty() {
        return Err(SecretsManagerError::NoGatewayUrls);
    }
    for raw in urls {
        let parsed =
            url::Url::parse(raw).map_err(|_| SecretsManagerError::InvalidGatewayUrl(raw.clone()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(SecretsManagerError::InvalidGatewayUrl(raw.clone()));
        }
    }
    Ok(())
}

fn verify_node_rows(responses: &[NodeResponse]) -> Result<(), String> {
    let mut expected = None;
    for node in responses {
        if !node.success {
            return Err(format!(
                "Node {} responded with error: {}",
                node.node_address,
                node.error_message.as_deref().unwrap_or("unknown error")
            ));
        }

        let mut rows = node.rows.clone();
        rows.sort_by_key(|row| (row.slot_id, row.version));
        match &expected {
            None => expected = Some(rows),
            Some(reference) if *reference != rows => {
                return Err(format!(
                    "Node {} returned rows that differ from the other nodes",
                    node.node_address
                ));
            }
            Some(_) => {}
        }
    }
    Ok(())
}
