//! AES-256-GCM payload wrapping (§4.10): the shape every shredded payload is
//! rewritten to, and the encrypt/decrypt primitives over it.

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key as AesKey, KeyInit, Nonce};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ShredError;

pub const PRIVACY_MODE: &str = "aes-gcm-v1";

/// The wrapper a shredded event's `payload` is rewritten to. This is what
/// gets signed, so the hash chain and signatures stay valid across
/// shredding — only the plaintext is gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyWrapper {
    #[serde(rename = "_privacy")]
    pub privacy: String,
    pub kid: String,
    pub nonce_b64: String,
    pub ciphertext_b64: String,
}

/// Generates a fresh 256-bit DEK.
pub fn generate_dek() -> [u8; 32] {
    let key = Aes256Gcm::generate_key(&mut OsRng);
    key.into()
}

/// Encrypts `plaintext` (the canonical JSON bytes of the original payload)
/// under `dek`, tagging the wrapper with `kid` so the sidecar can look the
/// key back up.
pub fn encrypt_payload(plaintext: &[u8], dek: &[u8; 32], kid: &str) -> Result<PrivacyWrapper, ShredError> {
    let cipher = Aes256Gcm::new(AesKey::<Aes256Gcm>::from_slice(dek));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| ShredError::Crypto(e.to_string()))?;

    let b64 = base64::engine::general_purpose::STANDARD;
    Ok(PrivacyWrapper {
        privacy: PRIVACY_MODE.to_string(),
        kid: kid.to_string(),
        nonce_b64: b64.encode(nonce),
        ciphertext_b64: b64.encode(ciphertext),
    })
}

/// Decrypts a wrapper given its DEK. Returns `Ok(None)` (not an error) when
/// the DEK has already been destroyed — the spec's "decryption of shredded
/// entries yields null" contract — callers distinguish "no DEK" from "DEK
/// present but decryption failed" via the `Err` variant.
pub fn decrypt_payload(wrapper: &PrivacyWrapper, dek: Option<&[u8; 32]>) -> Result<Option<Value>, ShredError> {
    let Some(dek) = dek else { return Ok(None) };
    let b64 = base64::engine::general_purpose::STANDARD;
    let nonce_bytes = b64
        .decode(&wrapper.nonce_b64)
        .map_err(|e| ShredError::Crypto(e.to_string()))?;
    let ciphertext = b64
        .decode(&wrapper.ciphertext_b64)
        .map_err(|e| ShredError::Crypto(e.to_string()))?;

    let cipher = Aes256Gcm::new(AesKey::<Aes256Gcm>::from_slice(dek));
    let nonce = Nonce::from_slice(&nonce_bytes);
    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|e| ShredError::Crypto(e.to_string()))?;
    let value: Value = serde_json::from_slice(&plaintext)?;
    Ok(Some(value))
}

pub fn is_wrapped(payload: &Value) -> bool {
    payload.get("_privacy").and_then(Value::as_str) == Some(PRIVACY_MODE)
}
