//! `shred_event`/`shred_actor` (§4.10): wraps a target's payload in place and
//! records a `com.provara.crypto_shred` event describing what happened.

use ed25519_dalek::SigningKey;
use provara_core::{event, Event, EventKind, Namespace};
use provara_vault::layout::VaultPaths;
use provara_vault::log;
use serde_json::json;

use crate::error::ShredError;
use crate::store::PrivacyKeyStore;
use crate::wrap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShredScope {
    Event,
    Actor,
}

impl ShredScope {
    fn as_str(self) -> &'static str {
        match self {
            ShredScope::Event => "event",
            ShredScope::Actor => "actor",
        }
    }
}

pub struct ShredResult {
    pub shred_event: Event,
    pub events_affected: usize,
}

/// Encrypts `target_event_id`'s payload under a fresh DEK and destroys it
/// immediately — a one-shot "wrap and shred" used when the caller never
/// wants the plaintext retrievable at all, as opposed to [`wrap_event`]
/// followed later by a separate shred.
pub fn shred_event(
    paths: &VaultPaths,
    store: &PrivacyKeyStore,
    target_event_id: &str,
    reason: &str,
    authority: &str,
    signing: &SigningKey,
    signing_key_id: &str,
) -> Result<ShredResult, ShredError> {
    let mut events = log::load_events(&paths.events_ndjson())?;
    let Some(idx) = events.iter().position(|e| e.event_id == target_event_id) else {
        return Err(ShredError::DekNotFound(format!("event {} not found", target_event_id)));
    };

    let dek = wrap::generate_dek();
    let plaintext = provara_core::to_canonical_bytes(&events[idx].payload)?;
    let kid = store.store_new_dek(&dek, None)?;
    let wrapper = wrap::encrypt_payload(&plaintext, &dek, &kid)?;
    events[idx].payload = serde_json::to_value(&wrapper)?;
    store.destroy_dek(&kid)?;

    let shred_event = append_shred_record(
        &mut events,
        target_event_id,
        reason,
        authority,
        ShredScope::Event,
        signing,
        signing_key_id,
    )?;
    log::write_events(&paths.events_ndjson(), &events)?;

    Ok(ShredResult {
        shred_event,
        events_affected: 1,
    })
}

/// Wraps and shreds every event authored by `actor`, reusing one DEK across
/// all of them (per-actor mode), then destroys every DEK tagged with that
/// actor.
pub fn shred_actor(
    paths: &VaultPaths,
    store: &PrivacyKeyStore,
    actor: &str,
    reason: &str,
    authority: &str,
    signing: &SigningKey,
    signing_key_id: &str,
) -> Result<ShredResult, ShredError> {
    let mut events = log::load_events(&paths.events_ndjson())?;
    let dek = wrap::generate_dek();
    let kid = store.store_new_dek(&dek, Some(actor))?;

    let mut affected = 0;
    for event in events.iter_mut() {
        if event.actor != actor || wrap::is_wrapped(&event.payload) {
            continue;
        }
        let plaintext = provara_core::to_canonical_bytes(&event.payload)?;
        let wrapper = wrap::encrypt_payload(&plaintext, &dek, &kid)?;
        event.payload = serde_json::to_value(&wrapper)?;
        affected += 1;
    }
    store.destroy_actor_deks(actor)?;

    let shred_event = append_shred_record(&mut events, actor, reason, authority, ShredScope::Actor, signing, signing_key_id)?;
    log::write_events(&paths.events_ndjson(), &events)?;

    Ok(ShredResult {
        shred_event,
        events_affected: affected,
    })
}

fn append_shred_record(
    events: &mut Vec<Event>,
    target: &str,
    reason: &str,
    authority: &str,
    scope: ShredScope,
    signing: &SigningKey,
    signing_key_id: &str,
) -> Result<Event, ShredError> {
    let prev_event_hash = events
        .iter()
        .rev()
        .find(|e| e.actor == authority)
        .map(|e| e.event_id.clone());
    let mut shred_event = Event::new_unsigned(
        EventKind::Custom("com.provara.crypto_shred".to_string()),
        Namespace::Canonical,
        authority,
        prev_event_hash,
        json!({
            "target": target,
            "scope": scope.as_str(),
            "reason": reason,
            "authority": authority,
        }),
    );
    shred_event.event_id = event::compute_event_id(&shred_event)?;
    event::sign_event(&mut shred_event, signing, signing_key_id)?;
    events.push(shred_event.clone());
    tracing::info!(target, scope = scope.as_str(), "shredded payload");
    Ok(shred_event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use provara_vault::genesis;

    #[test]
    fn shred_event_wraps_payload_and_destroys_dek() {
        let dir = tempfile::tempdir().unwrap();
        let paths = VaultPaths::new(dir.path());
        let result = genesis::bootstrap(&paths, "root_actor").unwrap();
        let store = PrivacyKeyStore::open_in_memory().unwrap();

        let events = log::load_events(&paths.events_ndjson()).unwrap();
        let target_id = events[1].event_id.clone();

        shred_event(
            &paths,
            &store,
            &target_id,
            "GDPR erasure request",
            "root_actor",
            &result.root_keypair.signing,
            &result.genesis.root_key_id,
        )
        .unwrap();

        let events = log::load_events(&paths.events_ndjson()).unwrap();
        let shredded = events.iter().find(|e| e.event_id == target_id).unwrap();
        assert!(wrap::is_wrapped(&shredded.payload));
        let wrapper: wrap::PrivacyWrapper = serde_json::from_value(shredded.payload.clone()).unwrap();
        assert!(store.get_dek(&wrapper.kid).unwrap().is_none());

        let decrypted = wrap::decrypt_payload(&wrapper, store.get_dek(&wrapper.kid).unwrap().as_ref()).unwrap();
        assert!(decrypted.is_none());
    }

    #[test]
    fn shred_actor_wraps_every_event_for_that_actor() {
        let dir = tempfile::tempdir().unwrap();
        let paths = VaultPaths::new(dir.path());
        let result = genesis::bootstrap(&paths, "root_actor").unwrap();
        let store = PrivacyKeyStore::open_in_memory().unwrap();

        let vault = provara_vault::Vault::open(dir.path());
        vault
            .append(
                provara_core::EventKind::Observation,
                provara_core::Namespace::Local,
                "root_actor",
                json!({"subject": "x", "predicate": "y", "value": 1}),
                &result.root_keypair.signing,
                &result.genesis.root_key_id,
            )
            .unwrap();

        let shred_result = shred_actor(
            &paths,
            &store,
            "root_actor",
            "account closure",
            "root_actor",
            &result.root_keypair.signing,
            &result.genesis.root_key_id,
        )
        .unwrap();
        assert!(shred_result.events_affected >= 2);

        let events = log::load_events(&paths.events_ndjson()).unwrap();
        let still_plain = events
            .iter()
            .filter(|e| e.actor == "root_actor" && e.kind.as_str() != "com.provara.crypto_shred")
            .any(|e| !wrap::is_wrapped(&e.payload));
        assert!(!still_plain);
    }
}
