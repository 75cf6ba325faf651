//! Threshold encryption (TDH2 over P-256 plus AES-256-GCM) for the DON

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use p256::elliptic_curve::ops::Reduce;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::elliptic_curve::PrimeField;
use p256::{NonZeroScalar, ProjectivePoint, PublicKey, Scalar, U256};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const GROUP_NAME: &str = "P256";
const INPUT_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid threshold public key: {0}")]
    InvalidPublicKey(String),
    #[error("Unsupported group: {0}")]
    UnsupportedGroup(String),
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Invalid JSON payload")]
    InvalidPayload,
}

/// The DON's TDH2 public key as published by the coordinator contract
#[derive(Debug, Clone)]
pub struct ThresholdPublicKey {
    g_bar: ProjectivePoint,
    h: ProjectivePoint,
}

#[derive(Debug, Deserialize)]
struct ThresholdPublicKeyRaw {
    #[serde(rename = "Group")]
    group: String,
    #[serde(rename = "G_bar")]
    g_bar: String,
    #[serde(rename = "H")]
    h: String,
    #[serde(rename = "HArray", default)]
    h_array: Vec<String>,
}

impl ThresholdPublicKey {
    pub fn from_json(json: &[u8]) -> Result<Self, CryptoError> {
        let raw: ThresholdPublicKeyRaw = serde_json::from_slice(json)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;

        if raw.group != GROUP_NAME {
            return Err(CryptoError::UnsupportedGroup(raw.group));
        }
        log::debug!("Threshold public key with {} node shares", raw.h_array.len());

        Ok(Self {
            g_bar: decode_point(&raw.g_bar)?,
            h: decode_point(&raw.h)?,
        })
    }
}

/// TDH2 ciphertext in the layout the nodes unmarshal
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tdh2Ciphertext {
    #[serde(rename = "Group")]
    group: String,
    #[serde(rename = "C")]
    c: String,
    #[serde(rename = "Label")]
    label: String,
    #[serde(rename = "U")]
    u: String,
    #[serde(rename = "U_bar")]
    u_bar: String,
    #[serde(rename = "E")]
    e: String,
    #[serde(rename = "F")]
    f: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "TDH2Ctxt")]
    tdh2_ctxt: String,
    #[serde(rename = "SymCtxt")]
    sym_ctxt: String,
    #[serde(rename = "Nonce")]
    nonce: String,
}

fn decode_point(encoded: &str) -> Result<ProjectivePoint, CryptoError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    PublicKey::from_sec1_bytes(&bytes)
        .map(|pk| pk.to_projective())
        .map_err(|_| CryptoError::InvalidPublicKey("point is not on P-256".into()))
}

fn marshal(point: &ProjectivePoint) -> Vec<u8> {
    point.to_affine().to_encoded_point(false).as_bytes().to_vec()
}

fn hash1(point: &ProjectivePoint) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"tdh2hash1");
    hasher.update(marshal(point));
    hasher.finalize().into()
}

fn hash2(
    msg: &[u8],
    label: &[u8],
    p1: &ProjectivePoint,
    p2: &ProjectivePoint,
    p3: &ProjectivePoint,
    p4: &ProjectivePoint,
) -> Scalar {
    let mut hasher = Sha256::new();
    hasher.update(b"tdh2hash2");
    hasher.update(msg);
    hasher.update(label);
    for p in [p1, p2, p3, p4] {
        hasher.update(marshal(p));
    }
    <Scalar as Reduce<U256>>::reduce_bytes(&hasher.finalize())
}

fn tdh2_encrypt(
    pub_key: &ThresholdPublicKey,
    msg: &[u8; INPUT_SIZE],
    label: &[u8; INPUT_SIZE],
) -> Tdh2Ciphertext {
    let r: Scalar = *NonZeroScalar::random(&mut OsRng);
    let s: Scalar = *NonZeroScalar::random(&mut OsRng);

    let mask = hash1(&(pub_key.h * r));
    let c: Vec<u8> = msg.iter().zip(mask.iter()).map(|(m, k)| m ^ k).collect();

    let u = ProjectivePoint::GENERATOR * r;
    let w = ProjectivePoint::GENERATOR * s;
    let u_bar = pub_key.g_bar * r;
    let w_bar = pub_key.g_bar * s;

    let e = hash2(&c, label, &u, &w, &u_bar, &w_bar);
    let f = s + r * e;

    Tdh2Ciphertext {
        group: GROUP_NAME.to_string(),
        c: STANDARD.encode(&c),
        label: STANDARD.encode(label),
        u: STANDARD.encode(marshal(&u)),
        u_bar: STANDARD.encode(marshal(&u_bar)),
        e: STANDARD.encode(e.to_repr()),
        f: STANDARD.encode(f.to_repr()),
    }
}

/// Encrypt `msg` so that it can only be opened by the DON holding `pub_key`.
/// Returns the serialized JSON envelope.
pub fn encrypt(pub_key: &ThresholdPublicKey, msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut key = [0u8; INPUT_SIZE];
    OsRng.fill_bytes(&mut key);
    let nonce_bytes: [u8; NONCE_SIZE] = rand::random();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::EncryptionFailed)?;
    let sym_ctxt = cipher
        .encrypt(nonce, msg)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let tdh2_ctxt = tdh2_encrypt(pub_key, &key, &[0u8; INPUT_SIZE]);
    let tdh2_json = serde_json::to_vec(&tdh2_ctxt).map_err(|_| CryptoError::InvalidPayload)?;

    let envelope = Envelope {
        tdh2_ctxt: STANDARD.encode(tdh2_json),
        sym_ctxt: STANDARD.encode(sym_ctxt),
        nonce: STANDARD.encode(nonce_bytes),
    };
    serde_json::to_vec(&envelope).map_err(|_| CryptoError::InvalidPayload)
}
