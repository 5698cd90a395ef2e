//! Key registry and Ed25519 signing (C3).

use std::fs;
use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::canon::{self, CanonError};
use crate::integrity::{sha256_file, sha256_hex};

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("{code}: {source}", code = crate::error::ErrorCode::E300RequiredFieldMissing)]
    Canon {
        #[source]
        source: CanonError,
    },
    #[error("{code}: {0}", code = crate::error::ErrorCode::E302VaultStructureInvalid)]
    Io(#[from] std::io::Error),
}

impl From<CanonError> for CryptoError {
    fn from(source: CanonError) -> Self {
        CryptoError::Canon { source }
    }
}

/// `key_id` = `"bp1_"` + first 16 hex chars of SHA-256 over the raw 32-byte
/// public key.
pub fn key_id_from_public_bytes(public_bytes: &[u8]) -> String {
    format!("bp1_{}", &sha256_hex(public_bytes)[..16])
}

/// An Ed25519 keypair generated per RFC 8032. The private half never
/// implements `Serialize` — callers are responsible for keeping it outside
/// the vault, per the vault's private-key policy.
pub struct Keypair {
    pub signing: SigningKey,
    pub verifying: VerifyingKey,
}

impl Keypair {
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        let verifying = signing.verifying_key();
        Keypair { signing, verifying }
    }

    pub fn key_id(&self) -> String {
        key_id_from_public_bytes(self.verifying.as_bytes())
    }
}

/// Signs `bytes` and returns a standard-alphabet base64 signature.
pub fn sign_bytes(signing: &SigningKey, bytes: &[u8]) -> String {
    use base64::Engine;
    let sig: Signature = signing.sign(bytes);
    base64::engine::general_purpose::STANDARD.encode(sig.to_bytes())
}

/// Total verification: returns `false` on malformed base64 or a failed
/// signature, never panics or propagates an error. Matches the reference
/// implementation's `verify_event_signature`, which must tolerate malformed
/// input by reporting failure rather than raising.
pub fn verify_bytes(verifying: &VerifyingKey, bytes: &[u8], sig_b64: &str) -> bool {
    use base64::Engine;
    let Ok(raw) = base64::engine::general_purpose::STANDARD.decode(sig_b64) else {
        return false;
    };
    let Ok(sig_bytes): Result<[u8; 64], _> = raw.as_slice().try_into() else {
        return false;
    };
    let sig = Signature::from_bytes(&sig_bytes);
    verifying.verify_strict(bytes, &sig).is_ok()
}

/// Status of a registered key. Keys are immutable once admitted; revocation
/// is a status transition, never a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Active,
    Revoked,
}

/// A registered signing key (§3 `Key`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Key {
    pub key_id: String,
    pub algorithm: String,
    pub public_key_b64: String,
    pub status: KeyStatus,
    pub roles: Vec<String>,
    pub scopes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at_utc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_event_id: Option<String>,
}

impl Key {
    pub fn from_verifying_key(verifying: &VerifyingKey, roles: Vec<String>, scopes: Vec<String>) -> Self {
        use base64::Engine;
        Key {
            key_id: key_id_from_public_bytes(verifying.as_bytes()),
            algorithm: "Ed25519".to_string(),
            public_key_b64: base64::engine::general_purpose::STANDARD.encode(verifying.as_bytes()),
            status: KeyStatus::Active,
            roles,
            scopes,
            revoked_at_utc: None,
            revocation_event_id: None,
            promotion_event_id: None,
        }
    }

    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        use base64::Engine;
        let raw = base64::engine::general_purpose::STANDARD
            .decode(&self.public_key_b64)
            .ok()?;
        let bytes: [u8; 32] = raw.as_slice().try_into().ok()?;
        VerifyingKey::from_bytes(&bytes).ok()
    }
}

/// A revocation record appended to `identity/keys.json`'s `revocations` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revocation {
    pub revoked_key_id: String,
    pub revoked_at_utc: String,
    pub reason: String,
    pub revocation_event_id: String,
}

/// `{keys, revocations}`, as persisted at `identity/keys.json` — an immutable
/// snapshot threaded through verifiers; rotation produces a new snapshot
/// rather than mutating one in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyRegistry {
    pub keys: Vec<Key>,
    pub revocations: Vec<Revocation>,
}

impl KeyRegistry {
    /// Returns the registered public key for `key_id` regardless of status:
    /// revoked keys must remain verifiable for historical audit.
    pub fn resolve_public_key(&self, key_id: &str) -> Option<VerifyingKey> {
        self.keys
            .iter()
            .find(|k| k.key_id == key_id)
            .and_then(|k| k.verifying_key())
    }

    pub fn entry(&self, key_id: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.key_id == key_id)
    }

    pub fn is_active(&self, key_id: &str) -> bool {
        matches!(self.entry(key_id).map(|k| k.status), Some(KeyStatus::Active))
    }
}

/// `sign_manifest`'s output record (§4.3); the signed payload is the
/// canonical JSON of this record minus `sig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestSignature {
    pub manifest_sha256: String,
    pub merkle_root: String,
    pub key_id: String,
    pub signed_at_utc: String,
    pub spec_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

/// Hashes `manifest_path`, reads `merkle_path`'s content, and signs the
/// combined record with the caller's key.
pub fn sign_manifest(
    manifest_path: &Path,
    merkle_path: &Path,
    signing: &SigningKey,
    key_id: &str,
) -> Result<ManifestSignature, CryptoError> {
    let manifest_sha256 = sha256_file(manifest_path)?;
    let merkle_root = fs::read_to_string(merkle_path)?.trim().to_string();

    let mut record = ManifestSignature {
        manifest_sha256,
        merkle_root,
        key_id: key_id.to_string(),
        signed_at_utc: chrono::Utc::now().to_rfc3339(),
        spec_version: "1.0".to_string(),
        sig: None,
    };
    let bytes = canon::to_canonical_bytes(&record)?;
    record.sig = Some(sign_bytes(signing, &bytes));
    Ok(record)
}

/// Verifies a `ManifestSignature` record against `registry`.
pub fn verify_manifest_signature(record: &ManifestSignature, registry: &KeyRegistry) -> bool {
    let Some(sig) = &record.sig else { return false };
    let mut unsigned = record.clone();
    unsigned.sig = None;
    let Ok(bytes) = canon::to_canonical_bytes(&unsigned) else {
        return false;
    };
    let Some(verifying) = registry.resolve_public_key(&record.key_id) else {
        return false;
    };
    verify_bytes(&verifying, &bytes, sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_id_is_stable_for_same_public_key() {
        let kp = Keypair::generate();
        assert_eq!(kp.key_id(), key_id_from_public_bytes(kp.verifying.as_bytes()));
        assert!(kp.key_id().starts_with("bp1_"));
        assert_eq!(kp.key_id().len(), 4 + 16);
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let kp = Keypair::generate();
        let sig = sign_bytes(&kp.signing, b"hello world");
        assert!(verify_bytes(&kp.verifying, b"hello world", &sig));
        assert!(!verify_bytes(&kp.verifying, b"tampered", &sig));
    }

    #[test]
    fn verify_is_total_on_malformed_signature() {
        let kp = Keypair::generate();
        assert!(!verify_bytes(&kp.verifying, b"hello", "not-valid-base64!!"));
        assert!(!verify_bytes(&kp.verifying, b"hello", ""));
    }

    #[test]
    fn resolve_public_key_returns_key_regardless_of_status() {
        let kp = Keypair::generate();
        let mut key = Key::from_verifying_key(&kp.verifying, vec!["root".into()], vec![]);
        key.status = KeyStatus::Revoked;
        let registry = KeyRegistry {
            keys: vec![key],
            revocations: vec![],
        };
        assert!(registry.resolve_public_key(&kp.key_id()).is_some());
        assert!(!registry.is_active(&kp.key_id()));
    }
}
