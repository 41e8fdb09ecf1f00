//! Master key handling, at-rest sealing and keyed lookup hashes.
use std::fmt;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const MASTER_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TOKEN_PREFIX: &str = "zg_";

const ENCRYPTION_LABEL: &[u8] = b"zonegate/at-rest-encryption/v1";
const LOOKUP_LABEL: &[u8] = b"zonegate/key-lookup/v1";

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("master key must be 32 bytes (raw or base64), got {0}")]
    InvalidKeyLength(usize),
    #[error("encryption failed")]
    Encryption,
    #[error("decryption failed")]
    Decryption,
}

/// Process-wide secret the store derives its encryption and lookup subkeys from.
///
/// Never persisted; supplied at startup.
#[derive(Clone)]
pub struct MasterKey {
    encryption: [u8; MASTER_KEY_LEN],
    lookup: [u8; MASTER_KEY_LEN],
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;
    mac.update(data);
    let digest = mac.finalize().into_bytes();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Ok(out)
}

impl MasterKey {
    pub fn from_bytes(root: &[u8]) -> Result<Self, CryptoError> {
        if root.len() != MASTER_KEY_LEN {
            return Err(CryptoError::InvalidKeyLength(root.len()));
        }
        Ok(Self {
            encryption: hmac_sha256(root, ENCRYPTION_LABEL)?,
            lookup: hmac_sha256(root, LOOKUP_LABEL)?,
        })
    }

    /// Accepts exactly 32 raw characters, or base64 that decodes to 32 bytes.
    pub fn parse(input: &str) -> Result<Self, CryptoError> {
        let trimmed = input.trim();
        if trimmed.len() == MASTER_KEY_LEN {
            return Self::from_bytes(trimmed.as_bytes());
        }
        match BASE64.decode(trimmed) {
            Ok(bytes) => Self::from_bytes(&bytes),
            Err(_) => Err(CryptoError::InvalidKeyLength(trimmed.len())),
        }
    }

    /// Hex HMAC of a presented secret, used as the indexed lookup column.
    pub fn lookup_hash(&self, secret: &str) -> Result<String, CryptoError> {
        Ok(hex::encode(hmac_sha256(&self.lookup, secret.as_bytes())?))
    }

    /// AES-256-GCM seal; output is base64 of `nonce || ciphertext`.
    pub fn seal(&self, plaintext: &str) -> Result<String, CryptoError> {
        let cipher =
            Aes256Gcm::new_from_slice(&self.encryption).map_err(|_| CryptoError::Encryption)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encryption)?;

        let mut sealed = nonce_bytes.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    pub fn open(&self, sealed: &str) -> Result<String, CryptoError> {
        let raw = BASE64.decode(sealed).map_err(|_| CryptoError::Decryption)?;
        if raw.len() < NONCE_LEN {
            return Err(CryptoError::Decryption);
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);

        let cipher =
            Aes256Gcm::new_from_slice(&self.encryption).map_err(|_| CryptoError::Decryption)?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::Decryption)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption)
    }
}

/// Compare two secrets or digests without short-circuiting on the first difference.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Fresh random API key handed to a caller exactly once.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    format!("{TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes))
}
