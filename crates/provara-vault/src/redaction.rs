//! Redaction (C9): the sole permitted mutation of an already-signed event —
//! rewriting its payload to a tombstone, recorded by a new signed event that
//! references what was removed and why.

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use serde_json::json;

use provara_core::{canon, event, Event, EventKind, Namespace};

use crate::error::VaultError;
use crate::layout::VaultPaths;
use crate::log;

/// The shape a redacted event's `payload` is rewritten to. `event_id` and
/// `sig` on the target event are left untouched — only `payload` changes —
/// so the event still occupies its original position in the causal chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tombstone {
    pub redacted: bool,
    pub redaction_event_id: String,
    pub original_payload_hash: String,
    pub redaction_reason: String,
}

pub struct RedactionResult {
    pub redaction_event: Event,
}

/// Redacts `target_event_id`'s payload. Errors if the target does not exist;
/// redacting an already-redacted event is idempotent and only emits a new
/// `com.provara.redaction` event (it does not re-tombstone the target).
pub fn redact_event(
    paths: &VaultPaths,
    target_event_id: &str,
    reason: &str,
    authority: &str,
    redaction_method: &str,
    signing: &SigningKey,
    signing_key_id: &str,
) -> Result<RedactionResult, VaultError> {
    let mut events = log::load_events(&paths.events_ndjson())?;
    let Some(target_index) = events.iter().position(|e| e.event_id == target_event_id) else {
        return Err(VaultError::MissingFile(format!("event {} not found", target_event_id)));
    };

    let already_redacted = serde_json::from_value::<Tombstone>(events[target_index].payload.clone())
        .map(|t| t.redacted)
        .unwrap_or(false);
    if already_redacted {
        tracing::warn!(target_event_id, "event already redacted; emitting redaction record only");
    }

    let original_payload_hash = canon::canonical_hash(&events[target_index].payload)?;

    let prev_event_hash = events
        .iter()
        .rev()
        .find(|e| e.actor == authority)
        .map(|e| e.event_id.clone());
    let mut redaction_event = Event::new_unsigned(
        EventKind::Custom("com.provara.redaction".to_string()),
        Namespace::Canonical,
        authority,
        prev_event_hash,
        json!({
            "target_event_id": target_event_id,
            "reason": reason,
            "redaction_method": redaction_method,
            "original_payload_hash": original_payload_hash,
        }),
    );
    redaction_event.event_id = event::compute_event_id(&redaction_event)?;
    event::sign_event(&mut redaction_event, signing, signing_key_id)?;

    if !already_redacted {
        let tombstone = Tombstone {
            redacted: true,
            redaction_event_id: redaction_event.event_id.clone(),
            original_payload_hash,
            redaction_reason: reason.to_string(),
        };
        events[target_index].payload = serde_json::to_value(&tombstone)?;
    }
    events.push(redaction_event.clone());

    log::write_events(&paths.events_ndjson(), &events)?;
    tracing::info!(target_event_id, redaction_event_id = %redaction_event.event_id, "redacted event");

    Ok(RedactionResult { redaction_event })
}
