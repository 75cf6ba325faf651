use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::signer::{SignerError, Wallet};

// Fixed field widths of the signed gateway message header
const MESSAGE_ID_MAX_LEN: usize = 128;
const MESSAGE_METHOD_MAX_LEN: usize = 64;
const MESSAGE_DON_ID_MAX_LEN: usize = 64;
const MESSAGE_RECEIVER_LEN: usize = 2 + 2 * 20;

pub const METHOD_SECRETS_SET: &str = "secrets_set";
pub const METHOD_SECRETS_LIST: &str = "secrets_list";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Message field '{field}' exceeds {max} bytes")]
    FieldTooLong { field: &'static str, max: usize },
    #[error("Signing failed: {0}")]
    Signing(#[from] SignerError),
    #[error("Unexpected response data from DON gateway: {0}")]
    UnexpectedResponse(String),
    #[error("Failed to send request to any of the DON gateway URLs: {0:?}")]
    AllGatewaysFailed(Vec<String>),
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayMessageBody {
    pub message_id: String,
    pub method: String,
    pub don_id: String,
    pub receiver: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

#[derive(Debug, Serialize)]
struct GatewayParams {
    body: GatewayMessageBody,
    signature: String,
}

#[derive(Debug, Serialize)]
struct GatewayMessage {
    id: String,
    jsonrpc: &'static str,
    method: String,
    params: GatewayParams,
}

/// One stored secrets entry as reported by a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretsRow {
    pub slot_id: u32,
    pub version: u64,
    pub expiration: u64,
}

#[derive(Debug, Clone)]
pub struct NodeResponse {
    pub node_address: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub rows: Vec<SecretsRow>,
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    result: Option<ResultEnvelope>,
}

#[derive(Debug, Deserialize)]
struct ResultEnvelope {
    body: ResultBody,
}

#[derive(Debug, Deserialize)]
struct ResultBody {
    payload: ResultPayload,
}

#[derive(Debug, Deserialize)]
struct ResultPayload {
    #[serde(default)]
    node_responses: Vec<NodeEnvelope>,
}

#[derive(Debug, Deserialize)]
struct NodeEnvelope {
    body: NodeBody,
}

#[derive(Debug, Deserialize)]
struct NodeBody {
    #[serde(default)]
    receiver: String,
    payload: NodePayload,
}

#[derive(Debug, Deserialize)]
struct NodePayload {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    rows: Vec<SecretsRow>,
}

/// Serialize JSON with object keys sorted, recursively
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

fn padded(value: &str, width: usize, field: &'static str) -> Result<Vec<u8>, GatewayError> {
    let bytes = value.as_bytes();
    if bytes.len() > width {
        return Err(GatewayError::FieldTooLong { field, max: width });
    }
    let mut out = vec![0u8; width];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

/// Bytes covered by the gateway message signature: fixed-width header
/// fields followed by the canonical JSON payload
pub fn message_signing_bytes(body: &GatewayMessageBody) -> Result<Vec<u8>, GatewayError> {
    let mut out = Vec::new();
    out.extend(padded(&body.message_id, MESSAGE_ID_MAX_LEN, "message_id")?);
    out.extend(padded(&body.method, MESSAGE_METHOD_MAX_LEN, "method")?);
    out.extend(padded(&body.don_id, MESSAGE_DON_ID_MAX_LEN, "don_id")?);
    out.extend(padded(&body.receiver, MESSAGE_RECEIVER_LEN, "receiver")?);
    if let Some(payload) = &body.payload {
        out.extend(canonical_json(payload).into_bytes());
    }
    Ok(out)
}

fn extract_node_responses(response: Value) -> Result<Vec<NodeResponse>, GatewayError> {
    let raw = response.to_string();
    let parsed: GatewayResponse = serde_json::from_value(response)
        .map_err(|e| GatewayError::UnexpectedResponse(format!("{}: {}", e, raw)))?;

    let result = parsed
        .result
        .ok_or_else(|| GatewayError::UnexpectedResponse(raw.clone()))?;

    if result.body.payload.node_responses.is_empty() {
        return Err(GatewayError::UnexpectedResponse(raw));
    }

    Ok(result
        .body
        .payload
        .node_responses
        .into_iter()
        .map(|node| {
            let payload = node.body.payload;
            NodeResponse {
                node_address: node.body.receiver,
                success: payload.success,
                error_message: if payload.success {
                    None
                } else {
                    payload.error_message
                },
                rows: payload.rows,
            }
        })
        .collect())
}

/// Signs and posts JSON-RPC messages to a DON's gateways
pub struct GatewayClient {
    client: reqwest::Client,
    wallet: Arc<Wallet>,
    don_id: String,
}

impl GatewayClient {
    pub fn new(wallet: Arc<Wallet>, don_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            wallet,
            don_id: don_id.into(),
        }
    }

    fn build_message(
        &self,
        method: &str,
        payload: Option<Value>,
    ) -> Result<GatewayMessage, GatewayError> {
        let message_id = rand::random::<u32>().to_string();
        let body = GatewayMessageBody {
            message_id: message_id.clone(),
            method: method.to_string(),
            don_id: self.don_id.clone(),
            receiver: String::new(),
            payload,
        };
        let signature = self
            .wallet
            .sign_message_hex(&message_signing_bytes(&body)?)?;

        Ok(GatewayMessage {
            id: message_id,
            jsonrpc: "2.0",
            method: method.to_string(),
            params: GatewayParams { body, signature },
        })
    }

    async fn post(&self, url: &str, message: &GatewayMessage) -> Result<Vec<NodeResponse>, String> {
        let response = self
            .client
            .post(url)
            .json(message)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("Gateway {} returned status {}", url, response.status()));
        }

        let json: Value = response.json().await.map_err(|e| e.to_string())?;
        extract_node_responses(json).map_err(|e| e.to_string())
    }

    /// Send `method` to the gateways in order, returning the node responses
    /// of the first gateway that answers
    pub async fn send(
        &self,
        gateway_urls: &[String],
        method: &str,
        payload: Option<Value>,
    ) -> Result<Vec<NodeResponse>, GatewayError> {
        for url in gateway_urls {
            let message = self.build_message(method, payload.clone())?;
            log::info!("Sending {} to gateway {}", method, url);

            match self.post(url, &message).await {
                Ok(responses) => return Ok(responses),
                Err(e) => log::warn!("Error sending message to gateway {}: {}", url, e),
            }
        }

        Err(GatewayError::AllGatewaysFailed(gateway_urls.to_vec()))
    }
}
