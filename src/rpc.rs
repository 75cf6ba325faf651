//! Read-only JSON-RPC provider and ABI helpers for `eth_call`

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::signer::keccak256;

const WORD: usize = 32;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Malformed RPC response: {0}")]
    InvalidResponse(String),
    #[error("ABI decoding failed: {0}")]
    Abi(String),
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

pub struct Provider {
    client: reqwest::Client,
    url: String,
}

impl Provider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RpcError::Http(format!(
                "{} returned status {}",
                self.url,
                response.status()
            )));
        }

        let response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::InvalidResponse(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        response
            .result
            .ok_or_else(|| RpcError::InvalidResponse("missing result".into()))
    }

    /// Execute a read-only call against `to` at the latest block
    pub async fn eth_call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, RpcError> {
        log::debug!("eth_call to {} ({} bytes calldata)", to, data.len());

        let params = json!([
            { "to": to, "data": format!("0x{}", hex::encode(data)) },
            "latest"
        ]);
        let result = self.request("eth_call", params).await?;

        let hex_result = result
            .as_str()
            .ok_or_else(|| RpcError::InvalidResponse(format!("expected hex string, got {}", result)))?;
        let stripped = hex_result.strip_prefix("0x").unwrap_or(hex_result);

        hex::decode(stripped).map_err(|e| RpcError::InvalidResponse(e.to_string()))
    }
}

/// First four bytes of the keccak hash of a function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Encode a short UTF-8 string as `bytes32`, right-padded with zeros.
/// One byte is reserved for a terminator, so at most 31 bytes fit.
pub fn bytes32_from_str(value: &str) -> Result<[u8; 32], RpcError> {
    let bytes = value.as_bytes();
    if bytes.len() > WORD - 1 {
        return Err(RpcError::Abi(format!(
            "'{}' is longer than 31 bytes",
            value
        )));
    }
    let mut out = [0u8; 32];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

/// Calldata for a function taking a single `bytes32`
pub fn encode_call_bytes32(signature: &str, arg: &[u8; 32]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(arg);
    data
}

/// ABI-encode a single dynamic `bytes` value (offset, length, padded data)
pub fn encode_bytes(value: &[u8]) -> Vec<u8> {
    let mut out = encode_usize(WORD);
    out.extend(encode_usize(value.len()));
    out.extend_from_slice(value);
    let padding = (WORD - value.len() % WORD) % WORD;
    out.resize(out.len() + padding, 0);
    out
}

/// ABI-encode an `address` as a left-padded word
pub fn encode_address(address: &[u8; 20]) -> Vec<u8> {
    let mut out = vec![0u8; 12];
    out.extend_from_slice(address);
    out
}

fn encode_usize(value: usize) -> Vec<u8> {
    let mut out = vec![0u8; WORD - 8];
    out.extend_from_slice(&(value as u64).to_be_bytes());
    out
}

/// Decode a single `address` return value
pub fn decode_address(data: &[u8]) -> Result<[u8; 20], RpcError> {
    if data.len() < WORD {
        return Err(RpcError::Abi(format!(
            "address return value too short ({} bytes)",
            data.len()
        )));
    }
    if data[..12].iter().any(|b| *b != 0) {
        return Err(RpcError::Abi("address word has dirty high bytes".into()));
    }
    let mut address = [0u8; 20];
    address.copy_from_slice(&data[12..WORD]);
    Ok(address)
}

/// Decode a single dynamic `bytes` return value
pub fn decode_bytes(data: &[u8]) -> Result<Vec<u8>, RpcError> {
    let offset = read_usize(data, 0)?;
    let length = read_usize(data, offset)?;
    let start = offset + WORD;
    let end = start
        .checked_add(length)
        .ok_or_else(|| RpcError::Abi("bytes length overflow".into()))?;

    if end > data.len() {
        return Err(RpcError::Abi(format!(
            "bytes value runs past end of data ({} > {})",
            end,
            data.len()
        )));
    }
    Ok(data[start..end].to_vec())
}

fn read_usize(data: &[u8], at: usize) -> Result<usize, RpcError> {
    let word = at
        .checked_add(WORD)
        .and_then(|end| data.get(at..end))
        .ok_or_else(|| RpcError::Abi(format!("no word at offset {}", at)))?;

    // Anything above 8 bytes cannot be a sane length or offset
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(RpcError::Abi(format!("word at offset {} is too large", at)));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(buf)).map_err(|e| RpcError::Abi(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_selector() {
        // transfer(address,uint256)
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn test_bytes32_from_str() {
        let encoded = bytes32_from_str("fun-ethereum-sepolia-1").unwrap();
        assert_eq!(&encoded[..22], b"fun-ethereum-sepolia-1");
        assert!(encoded[22..].iter().all(|b| *b == 0));

        assert!(bytes32_from_str(&"x".repeat(32)).is_err());
    }

    #[test]
    fn test_decode_bytes() {
        let payload = b"{\"Group\":\"P256\"}".to_vec();
        assert_eq!(decode_bytes(&encode_bytes(&payload)).unwrap(), payload);

        let mut truncated = encode_bytes(&payload);
        truncated.truncate(70);
        assert!(decode_bytes(&truncated).is_err());
    }

    #[test]
    fn test_decode_address() {
        let mut word = encode_address(&[0xab; 20]);
        assert_eq!(decode_address(&word).unwrap(), [0xab; 20]);

        word[0] = 1;
        assert!(decode_address(&word).is_err());
        assert!(decode_address(&[0u8; 10]).is_err());
    }

    #[tokio::test]
    async fn test_eth_call_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "eth_call" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "0x00ff"
            })))
            .mount(&server)
            .await;

        let provider = Provider::new(server.uri());
        let out = provider.eth_call("0x0000000000000000000000000000000000000001", &[1, 2]).await.unwrap();
        assert_eq!(out, vec![0x00, 0xff]);
    }

    #[tokio::test]
    async fn test_eth_call_error_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32000, "message": "execution reverted" }
            })))
            .mount(&server)
            .await;

        let provider = Provider::new(server.uri());
        let err = provider.eth_call("0x01", &[]).await.unwrap_err();
        match err {
            RpcError::Rpc { code, message } => {
                assert_eq!(code, -32000);
                assert_eq!(message, "execution reverted");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_eth_call_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = Provider::new(server.uri());
        assert!(matches!(
            provider.eth_call("0x01", &[]).await,
            Err(RpcError::Http(_))
        ));
    }
}
