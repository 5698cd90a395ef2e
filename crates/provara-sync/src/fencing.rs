//! Fencing tokens: a short-lived signed claim that a caller has seen a
//! specific log head, invalidated by any intervening append.

use ed25519_dalek::SigningKey;
use provara_core::{crypto, Event, KeyRegistry};
use serde::{Deserialize, Serialize};

/// `FT` (§3). `sig` is Ed25519 over the UTF-8 bytes of `token_hash`, not over
/// the whole canonical record — the token must stay verifiable even by a
/// party that only received `token_hash` out of band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FencingToken {
    pub token_hash: String,
    pub latest_event_id: String,
    pub timestamp: String,
    pub nonce: String,
    pub key_id: String,
    pub sig: String,
}

fn derive_token_hash(latest_event_id: &str, timestamp: &str, nonce: &str) -> String {
    let material = format!("{}:{}:{}", latest_event_id, timestamp, nonce);
    provara_core::sha256_hex(material.as_bytes())
}

/// Mints a token claiming `latest_event_id` as the head the caller observed.
pub fn create_fencing_token(
    latest_event_id: &str,
    nonce: &str,
    signing: &SigningKey,
    key_id: &str,
) -> FencingToken {
    let timestamp = chrono::Utc::now().to_rfc3339();
    let token_hash = derive_token_hash(latest_event_id, &timestamp, nonce);
    let sig = crypto::sign_bytes(signing, token_hash.as_bytes());
    FencingToken {
        token_hash,
        latest_event_id: latest_event_id.to_string(),
        timestamp,
        nonce: nonce.to_string(),
        key_id: key_id.to_string(),
        sig,
    }
}

/// Validates `token` against `registry` and the vault's current event log:
/// the derivation must match, the signer must be registered, the signature
/// must verify, and `latest_event_id` must still be present in `events` —
/// a token surviving an intervening append is rejected as stale.
pub fn validate_fencing_token(token: &FencingToken, registry: &KeyRegistry, events: &[Event]) -> bool {
    let expected_hash = derive_token_hash(&token.latest_event_id, &token.timestamp, &token.nonce);
    if expected_hash != token.token_hash {
        return false;
    }
    let Some(verifying) = registry.resolve_public_key(&token.key_id) else {
        return false;
    };
    if !crypto::verify_bytes(&verifying, token.token_hash.as_bytes(), &token.sig) {
        return false;
    }
    events.iter().any(|e| e.event_id == token.latest_event_id)
}
