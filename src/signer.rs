use k256::ecdsa::SigningKey;
use sha3::{Digest, Keccak256};
use thiserror::Error;

const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("Invalid private key: {0}")]
    InvalidKey(String),
    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

/// Keccak-256 digest of `data`
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Hash of a message as signed by `personal_sign` (EIP-191 version 0x45)
pub fn hash_personal_message(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(PERSONAL_MESSAGE_PREFIX.as_bytes());
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// A local secp256k1 wallet able to sign messages on behalf of an address
pub struct Wallet {
    key: SigningKey,
    address: [u8; 20],
}

impl Wallet {
    /// Parse a hex private key, with or without the `0x` prefix
    pub fn from_hex(private_key: &str) -> Result<Self, SignerError> {
        let trimmed = private_key.trim();
        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);

        let bytes = hex::decode(stripped).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(SignerError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }

        let key =
            SigningKey::from_slice(&bytes).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let address = address_of(&key);

        Ok(Self { key, address })
    }

    pub fn address(&self) -> [u8; 20] {
        self.address
    }

    /// EIP-55 checksummed address
    pub fn address_hex(&self) -> String {
        to_checksum_address(&self.address)
    }

    /// Sign `message` the way `personal_sign` does: 65 bytes `r || s || v`, v in {27, 28}
    pub fn sign_message(&self, message: &[u8]) -> Result<[u8; 65], SignerError> {
        let digest = hash_personal_message(message);

        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| SignerError::SigningFailed(e.to_string()))?;

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = 27 + recovery_id.to_byte();
        Ok(out)
    }

    /// Same as [`Wallet::sign_message`], `0x`-prefixed hex encoded
    pub fn sign_message_hex(&self, message: &[u8]) -> Result<String, SignerError> {
        Ok(format!("0x{}", hex::encode(self.sign_message(message)?)))
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address_hex())
            .finish_non_exhaustive()
    }
}

fn address_of(key: &SigningKey) -> [u8; 20] {
    let point = key.verifying_key().to_encoded_point(false);
    // Skip the 0x04 SEC1 tag
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

pub fn to_checksum_address(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    const KEY_ONE: &str =
        "0x0000000000000000000000000000000000000000000000000000000000000001";

    #[test]
    fn test_address_from_known_key() {
        let wallet = Wallet::from_hex(KEY_ONE).unwrap();
        assert_eq!(
            wallet.address_hex(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }

    #[test]
    fn test_key_without_prefix() {
        let with = Wallet::from_hex(KEY_ONE).unwrap();
        let without = Wallet::from_hex(KEY_ONE.trim_start_matches("0x")).unwrap();
        assert_eq!(with.address(), without.address());
    }

    #[test]
    fn test_invalid_keys() {
        assert!(Wallet::from_hex("not hex").is_err());
        assert!(Wallet::from_hex("0x1234").is_err());
        // zero is not a valid scalar
        assert!(Wallet::from_hex(&"0".repeat(64)).is_err());
    }

    #[test]
    fn test_signature_recovers_to_address() {
        let wallet = Wallet::from_hex(KEY_ONE).unwrap();
        let message = b"{\"alpacaKey\":\"k\",\"alpacaSecret\":\"s\"}";
        let sig = wallet.sign_message(message).unwrap();

        assert!(sig[64] == 27 || sig[64] == 28);

        let signature = Signature::from_slice(&sig[..64]).unwrap();
        let recovery_id = RecoveryId::from_byte(sig[64] - 27).unwrap();
        let recovered = VerifyingKey::recover_from_prehash(
            &hash_personal_message(message),
            &signature,
            recovery_id,
        )
        .unwrap();

        let point = recovered.to_encoded_point(false);
        let hash = keccak256(&point.as_bytes()[1..]);
        assert_eq!(&hash[12..], &wallet.address()[..]);
    }

    #[test]
    fn test_hex_signature_format() {
        let wallet = Wallet::from_hex(KEY_ONE).unwrap();
        let sig = wallet.sign_message_hex(b"hello").unwrap();
        assert!(sig.starts_with("0x"));
        assert_eq!(sig.len(), 2 + 130);
    }

    #[test]
    fn test_debug_hides_key() {
        let wallet = Wallet::from_hex(KEY_ONE).unwrap();
        let shown = format!("{:?}", wallet);
        assert!(shown.contains("0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"));
        assert!(!shown.contains("0000000000000001"));
    }
}
