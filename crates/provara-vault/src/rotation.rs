//! Key rotation (C9, scenario S4): a `KEY_REVOCATION` event for the
//! compromised key followed by a `KEY_PROMOTION` event for its replacement.

use ed25519_dalek::SigningKey;
use serde_json::json;

use provara_core::{crypto, event, Event, EventKind, Keypair, Namespace};

use crate::error::VaultError;
use crate::layout::VaultPaths;
use crate::{keys, log};

pub struct RotationResult {
    pub revocation_event: Event,
    pub promotion_event: Event,
    pub new_keypair: Keypair,
}

/// Rotates `compromised_key_id` out in favor of a freshly generated (or
/// caller-supplied) replacement, signed by `signing_key_id`/`signing_key`.
///
/// The hard invariant (§3, §9 S4): a compromised key may never sign its own
/// replacement. This is checked before any file is touched.
pub fn rotate_key(
    paths: &VaultPaths,
    compromised_key_id: &str,
    signing_key_id: &str,
    signing_key: &SigningKey,
    reason: &str,
    new_keypair: Option<Keypair>,
) -> Result<RotationResult, VaultError> {
    if signing_key_id == compromised_key_id {
        return Err(VaultError::SecurityConstraint(format!(
            "compromised key {} may not sign its own replacement",
            compromised_key_id
        )));
    }

    let mut registry = keys::load_key_registry(&paths.keys_json())?;
    if !registry.is_active(signing_key_id) {
        return Err(VaultError::KeyNotFound(format!(
            "signing key {} is not an active registry key",
            signing_key_id
        )));
    }
    if registry.entry(compromised_key_id).is_none() {
        return Err(VaultError::KeyNotFound(compromised_key_id.to_string()));
    }

    let events = log::load_events(&paths.events_ndjson())?;
    let prev_event_hash = events
        .iter()
        .rev()
        .find(|e| e.actor == signing_key_id)
        .map(|e| e.event_id.clone());

    let mut revocation_event = Event::new_unsigned(
        EventKind::KeyRevocation,
        Namespace::Canonical,
        signing_key_id,
        prev_event_hash,
        json!({ "revoked_key_id": compromised_key_id, "reason": reason }),
    );
    revocation_event.event_id = event::compute_event_id(&revocation_event)?;
    event::sign_event(&mut revocation_event, signing_key, signing_key_id)?;
    log::append_event(&paths.events_ndjson(), &revocation_event)?;

    let new_keypair = new_keypair.unwrap_or_else(Keypair::generate);
    let new_key_id = new_keypair.key_id();

    let mut promotion_event = Event::new_unsigned(
        EventKind::KeyPromotion,
        Namespace::Canonical,
        signing_key_id,
        Some(revocation_event.event_id.clone()),
        json!({
            "new_key_id": new_key_id,
            "replaces_key_id": compromised_key_id,
            "public_key_b64": base64_of(&new_keypair),
        }),
    );
    promotion_event.event_id = event::compute_event_id(&promotion_event)?;
    event::sign_event(&mut promotion_event, signing_key, signing_key_id)?;
    log::append_event(&paths.events_ndjson(), &promotion_event)?;

    let revoked_at = chrono::Utc::now().to_rfc3339();
    if let Some(entry) = registry.keys.iter_mut().find(|k| k.key_id == compromised_key_id) {
        entry.status = crypto::KeyStatus::Revoked;
        entry.revoked_at_utc = Some(revoked_at.clone());
        entry.revocation_event_id = Some(revocation_event.event_id.clone());
    }
    registry.revocations.push(crypto::Revocation {
        revoked_key_id: compromised_key_id.to_string(),
        revoked_at_utc: revoked_at,
        reason: reason.to_string(),
        revocation_event_id: revocation_event.event_id.clone(),
    });
    let mut new_entry = crypto::Key::from_verifying_key(&new_keypair.verifying, vec!["root".to_string()], vec!["*".to_string()]);
    new_entry.promotion_event_id = Some(promotion_event.event_id.clone());
    registry.keys.push(new_entry);
    keys::write_key_registry(&paths.keys_json(), &registry)?;

    tracing::info!(compromised_key_id, new_key_id = %new_key_id, "rotated key");

    Ok(RotationResult {
        revocation_event,
        promotion_event,
        new_keypair,
    })
}

fn base64_of(kp: &Keypair) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(kp.verifying.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use provara_core::KeyRegistry;

    fn setup() -> (tempfile::TempDir, VaultPaths, Keypair, Keypair) {
        let dir = tempfile::tempdir().unwrap();
        let paths = VaultPaths::new(dir.path());
        paths.ensure_directories().unwrap();
        let compromised = Keypair::generate();
        let trusted = Keypair::generate();
        let registry = KeyRegistry {
            keys: vec![
                crypto::Key::from_verifying_key(&compromised.verifying, vec!["root".into()], vec!["*".into()]),
                crypto::Key::from_verifying_key(&trusted.verifying, vec!["root".into()], vec!["*".into()]),
            ],
            revocations: vec![],
        };
        keys::write_key_registry(&paths.keys_json(), &registry).unwrap();
        (dir, paths, compromised, trusted)
    }

    #[test]
    fn compromised_key_cannot_sign_its_own_replacement() {
        let (_dir, paths, compromised, _trusted) = setup();
        let result = rotate_key(&paths, &compromised.key_id(), &compromised.key_id(), &compromised.signing, "leak", None);
        assert!(result.is_err());
    }

    #[test]
    fn rotation_produces_revocation_then_promotion() {
        let (_dir, paths, compromised, trusted) = setup();
        let result = rotate_key(&paths, &compromised.key_id(), &trusted.key_id(), &trusted.signing, "leak", None).unwrap();
        assert_eq!(result.revocation_event.kind.as_str(), "KEY_REVOCATION");
        assert_eq!(result.promotion_event.kind.as_str(), "KEY_PROMOTION");
        assert_eq!(
            result.promotion_event.prev_event_hash.as_deref(),
            Some(result.revocation_event.event_id.as_str())
        );

        let registry = keys::load_key_registry(&paths.keys_json()).unwrap();
        assert!(!registry.is_active(&compromised.key_id()));
        assert!(registry.is_active(&result.new_keypair.key_id()));
    }
}
