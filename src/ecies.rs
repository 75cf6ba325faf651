//! ECIES over secp256k1 for the DON node key

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

const IV_LEN: usize = 16;
const COMPRESSED_KEY_LEN: usize = 33;
const MAC_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum EciesError {
    #[error("Invalid recipient public key: {0}")]
    InvalidPublicKey(String),
    #[error("MAC computation failed")]
    MacFailed,
}

/// Parse a secp256k1 public key given either as 64 raw bytes (x || y),
/// 65-byte SEC1 uncompressed or 33-byte SEC1 compressed
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, EciesError> {
    let sec1 = if bytes.len() == 64 {
        let mut tagged = Vec::with_capacity(65);
        tagged.push(0x04);
        tagged.extend_from_slice(bytes);
        tagged
    } else {
        bytes.to_vec()
    };

    PublicKey::from_sec1_bytes(&sec1).map_err(|_| {
        EciesError::InvalidPublicKey(format!("{} bytes, not a secp256k1 point", bytes.len()))
    })
}

fn derive_keys(secret: &SecretKey, public: &PublicKey) -> ([u8; 32], [u8; 32]) {
    let shared = k256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    let hash = Sha512::digest(shared.raw_secret_bytes());

    let mut enc_key = [0u8; 32];
    let mut mac_key = [0u8; 32];
    enc_key.copy_from_slice(&hash[..32]);
    mac_key.copy_from_slice(&hash[32..]);
    (enc_key, mac_key)
}

/// Encrypt `plaintext` to `recipient`.
/// Output layout: `iv(16) || ephemeral_pubkey_compressed(33) || mac(32) || ciphertext`
pub fn encrypt(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, EciesError> {
    let ephemeral = SecretKey::random(&mut OsRng);
    let ephemeral_public = ephemeral.public_key();
    let (enc_key, mac_key) = derive_keys(&ephemeral, recipient);

    let iv: [u8; IV_LEN] = rand::random();
    let ciphertext = Aes256CbcEnc::new(&enc_key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let uncompressed = ephemeral_public.to_encoded_point(false);
    let mut mac = HmacSha256::new_from_slice(&mac_key).map_err(|_| EciesError::MacFailed)?;
    mac.update(&iv);
    mac.update(uncompressed.as_bytes());
    mac.update(&ciphertext);
    let tag = mac.finalize().into_bytes();

    let compressed = ephemeral_public.to_encoded_point(true);
    let mut out =
        Vec::with_capacity(IV_LEN + COMPRESSED_KEY_LEN + MAC_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(compressed.as_bytes());
    out.extend_from_slice(&tag);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbc::cipher::BlockDecryptMut;

    type Aes256CbcDec = cbc::Decryptor<Aes256>;

    fn decrypt(secret: &SecretKey, data: &[u8]) -> Option<Vec<u8>> {
        let (iv, rest) = data.split_at(IV_LEN);
        let (ephemeral, rest) = rest.split_at(COMPRESSED_KEY_LEN);
        let (tag, ciphertext) = rest.split_at(MAC_LEN);

        let ephemeral = PublicKey::from_sec1_bytes(ephemeral).ok()?;
        let (enc_key, mac_key) = derive_keys(secret, &ephemeral);

        let mut mac = HmacSha256::new_from_slice(&mac_key).ok()?;
        mac.update(iv);
        mac.update(ephemeral.to_encoded_point(false).as_bytes());
        mac.update(ciphertext);
        mac.verify_slice(tag).ok()?;

        let iv: [u8; IV_LEN] = iv.try_into().ok()?;
        Aes256CbcDec::new(&enc_key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .ok()
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let node_key = SecretKey::random(&mut OsRng);
        let message = br#"{"message":"{}","signature":"0x00"}"#;

        let sealed = encrypt(&node_key.public_key(), message).unwrap();
        assert_eq!(sealed.len(), IV_LEN + COMPRESSED_KEY_LEN + MAC_LEN + 48);
        assert_eq!(decrypt(&node_key, &sealed).unwrap(), message.to_vec());
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let node_key = SecretKey::random(&mut OsRng);
        let mut sealed = encrypt(&node_key.public_key(), b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(decrypt(&node_key, &sealed).is_none());
    }

    #[test]
    fn test_parse_public_key_forms() {
        let key = SecretKey::random(&mut OsRng).public_key();
        let uncompressed = key.to_encoded_point(false);
        let compressed = key.to_encoded_point(true);

        assert_eq!(parse_public_key(&uncompressed.as_bytes()[1..]).unwrap(), key);
        assert_eq!(parse_public_key(uncompressed.as_bytes()).unwrap(), key);
        assert_eq!(parse_public_key(compressed.as_bytes()).unwrap(), key);
        assert!(parse_public_key(&[0u8; 12]).is_err());
    }
}
