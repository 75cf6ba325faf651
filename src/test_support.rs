use base64::{engine::general_purpose::STANDARD, Engine};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use crate::rpc;

pub const WALLET_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const ROUTER: &str = "0xb83E47C2bC239B3bf370bc41e1459A34b41238D0";
pub const COORDINATOR: [u8; 20] = [0x42; 20];

pub struct MockDon {
    pub rpc: MockServer,
    pub gateway: MockServer,
}

/// Matches `eth_call` requests whose calldata starts with the selector of `signature`
struct CallSelector(String);

impl CallSelector {
    fn new(signature: &str) -> Self {
        Self(format!("0x{}", hex::encode(rpc::selector(signature))))
    }
}

impl Match for CallSelector {
    fn matches(&self, request: &Request) -> bool {
        serde_json::from_slice::<Value>(&request.body)
            .ok()
            .and_then(|body| body["params"][0]["data"].as_str().map(str::to_owned))
            .map(|data| data.starts_with(&self.0))
            .unwrap_or(false)
    }
}

fn rpc_result(data: &[u8]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": format!("0x{}", hex::encode(data)),
    }))
}

fn threshold_key_json() -> Vec<u8> {
    let encode = |pk: &p256::PublicKey| STANDARD.encode(pk.to_encoded_point(false).as_bytes());
    let g_bar = p256::SecretKey::random(&mut OsRng).public_key();
    let h = p256::SecretKey::random(&mut OsRng).public_key();

    serde_json::to_vec(&json!({
        "Group": "P256",
        "G_bar": encode(&g_bar),
        "H": encode(&h),
        "HArray": [encode(&h)],
    }))
    .unwrap_or_default()
}

/// A DON whose router resolves to [`COORDINATOR`], and whose gateway
/// answers with one node response per entry of `node_success`
pub async fn mock_don(node_success: &[bool]) -> MockDon {
    mock_don_with_coordinator(COORDINATOR, node_success).await
}

pub async fn mock_don_with_coordinator(coordinator: [u8; 20], node_success: &[bool]) -> MockDon {
    let rpc_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(CallSelector::new("getContractById(bytes32)"))
        .respond_with(rpc_result(&rpc::encode_address(&coordinator)))
        .mount(&rpc_server)
        .await;

    Mock::given(method("POST"))
        .and(CallSelector::new("getThresholdPublicKey()"))
        .respond_with(rpc_result(&rpc::encode_bytes(&threshold_key_json())))
        .mount(&rpc_server)
        .await;

    let don_key = k256::SecretKey::random(&mut OsRng).public_key();
    // Coordinators store the node key without the SEC1 tag
    let raw_don_key = don_key.to_encoded_point(false).as_bytes()[1..].to_vec();
    Mock::given(method("POST"))
        .and(CallSelector::new("getDONPublicKey()"))
        .respond_with(rpc_result(&rpc::encode_bytes(&raw_don_key)))
        .mount(&rpc_server)
        .await;

    let nodes: Vec<Value> = node_success
        .iter()
        .enumerate()
        .map(|(i, success)| {
            let payload = if *success {
                json!({ "success": true, "rows": [] })
            } else {
                json!({ "success": false, "error_message": "node rejected secrets" })
            };
            json!({ "body": { "receiver": format!("0x{:040x}", i + 1), "payload": payload } })
        })
        .collect();

    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "jsonrpc": "2.0" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "1",
            "jsonrpc": "2.0",
            "result": { "body": { "payload": { "node_responses": nodes } } }
        })))
        .mount(&gateway)
        .await;

    MockDon {
        rpc: rpc_server,
        gateway,
    }
}
