//! Signed state snapshots and accelerated replay from them (C6).

use std::fs;

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use provara_core::{crypto, event, reducer, Event, KeyRegistry, ReducerConfig, ReducerState};

use crate::error::VaultError;
use crate::layout::VaultPaths;
use crate::log;

/// `identity/checkpoints/{event_count:010}.chk` (§3 `Checkpoint`). Signing is
/// optional: an unsigned checkpoint is still useful as a local replay
/// accelerator, but only a signed one is trusted across vaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub merkle_root: String,
    pub last_event_id: Option<String>,
    pub event_count: u64,
    pub state: ReducerState,
    pub key_id: String,
    pub signed_at_utc: String,
    pub spec_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

fn unsigned_bytes(checkpoint: &Checkpoint) -> Result<Vec<u8>, VaultError> {
    let mut unsigned = checkpoint.clone();
    unsigned.sig = None;
    Ok(provara_core::to_canonical_bytes(&unsigned)?)
}

/// Builds a checkpoint from the replayed state as of `events`, and signs it
/// with `signing`/`key_id` unless `signing` is `None`.
pub fn create_checkpoint(
    events: &[Event],
    merkle_root: &str,
    signing: Option<(&SigningKey, &str)>,
) -> Result<Checkpoint, VaultError> {
    let state = reducer::replay(events);
    let mut checkpoint = Checkpoint {
        merkle_root: merkle_root.to_string(),
        last_event_id: state.metadata.last_event_id.clone(),
        event_count: state.metadata.event_count,
        state,
        key_id: signing.map(|(_, id)| id.to_string()).unwrap_or_default(),
        signed_at_utc: chrono::Utc::now().to_rfc3339(),
        spec_version: "1.0".to_string(),
        sig: None,
    };
    if let Some((signing_key, _)) = signing {
        let bytes = unsigned_bytes(&checkpoint)?;
        checkpoint.sig = Some(crypto::sign_bytes(signing_key, &bytes));
    }
    Ok(checkpoint)
}

/// Verifies a checkpoint's signature against `registry`. An unsigned
/// checkpoint (`sig: None`) always reports `false` — it may accelerate a
/// local replay but is never trusted as an anchor.
pub fn verify_checkpoint(checkpoint: &Checkpoint, registry: &KeyRegistry) -> bool {
    let Some(sig) = &checkpoint.sig else { return false };
    let Ok(bytes) = unsigned_bytes(checkpoint) else { return false };
    let Some(verifying) = registry.resolve_public_key(&checkpoint.key_id) else {
        return false;
    };
    crypto::verify_bytes(&verifying, &bytes, sig)
}

fn checkpoint_filename(event_count: u64) -> String {
    format!("{:010}.chk", event_count)
}

pub fn save_checkpoint(paths: &VaultPaths, checkpoint: &Checkpoint) -> Result<(), VaultError> {
    fs::create_dir_all(paths.checkpoints_dir())?;
    let path = paths.checkpoints_dir().join(checkpoint_filename(checkpoint.event_count));
    let bytes = provara_core::to_canonical_bytes(checkpoint)?;
    let tmp = path.with_extension("chk.tmp");
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

/// Loads the checkpoint with the highest `event_count`, or `None` if the
/// vault has never taken one.
pub fn load_latest_checkpoint(paths: &VaultPaths) -> Result<Option<Checkpoint>, VaultError> {
    let dir = paths.checkpoints_dir();
    if !dir.exists() {
        return Ok(None);
    }
    let mut names: Vec<String> = fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| n.ends_with(".chk"))
        .collect();
    names.sort();
    let Some(latest) = names.pop() else { return Ok(None) };
    let raw = fs::read_to_string(dir.join(latest))?;
    Ok(Some(serde_json::from_str(&raw)?))
}

/// Replays only the events strictly after `checkpoint.last_event_id`, folding
/// them onto the checkpoint's already-materialized state (§4.11's
/// accelerated-replay path).
pub fn replay_from_checkpoint(
    checkpoint: &Checkpoint,
    all_events: &[Event],
    config: &ReducerConfig,
) -> ReducerState {
    let tail_start = match &checkpoint.last_event_id {
        None => 0,
        Some(id) => all_events
            .iter()
            .position(|e| &e.event_id == id)
            .map(|i| i + 1)
            .unwrap_or(0),
    };
    reducer::replay_from(checkpoint.state.clone(), &all_events[tail_start..], config)
}

/// Convenience: loads the log and the latest checkpoint (if any) and returns
/// the replayed state, accelerated when a checkpoint exists.
pub fn load_state(paths: &VaultPaths) -> Result<ReducerState, VaultError> {
    let events = log::load_events(&paths.events_ndjson())?;
    match load_latest_checkpoint(paths)? {
        Some(checkpoint) => Ok(replay_from_checkpoint(&checkpoint, &events, &ReducerConfig::default())),
        None => Ok(reducer::replay(&events)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provara_core::{crypto::Key, Keypair};
    use serde_json::json;

    fn belief(actor: &str, id: &str, value: &str) -> Event {
        let mut e = event::Event::new_unsigned(
            provara_core::EventKind::Observation,
            provara_core::Namespace::Local,
            actor,
            None,
            json!({"subject": "x", "predicate": "y", "value": value, "confidence": 0.9}),
        );
        e.event_id = id.to_string();
        e
    }

    #[test]
    fn checkpoint_round_trips_and_verifies() {
        let kp = Keypair::generate();
        let events = vec![belief("a", "evt_1", "hello")];
        let checkpoint = create_checkpoint(&events, "deadbeef", Some((&kp.signing, &kp.key_id()))).unwrap();

        let registry = KeyRegistry {
            keys: vec![Key::from_verifying_key(&kp.verifying, vec![], vec![])],
            revocations: vec![],
        };
        assert!(verify_checkpoint(&checkpoint, &registry));
    }

    #[test]
    fn unsigned_checkpoint_never_verifies() {
        let events = vec![belief("a", "evt_1", "hello")];
        let checkpoint = create_checkpoint(&events, "deadbeef", None).unwrap();
        let registry = KeyRegistry::default();
        assert!(!verify_checkpoint(&checkpoint, &registry));
    }

    #[test]
    fn replay_from_checkpoint_matches_full_replay() {
        let events = vec![belief("a", "evt_1", "one"), belief("a", "evt_2", "two")];
        let checkpoint = create_checkpoint(&events[..1], "root", None).unwrap();
        let accelerated = replay_from_checkpoint(&checkpoint, &events, &ReducerConfig::default());
        let full = reducer::replay(&events);
        assert_eq!(accelerated.local, full.local);
    }

    #[test]
    fn latest_checkpoint_picks_highest_event_count() {
        let dir = tempfile::tempdir().unwrap();
        let paths = VaultPaths::new(dir.path());
        let c1 = create_checkpoint(&[belief("a", "evt_1", "one")], "r1", None).unwrap();
        let c2 = create_checkpoint(&[belief("a", "evt_1", "one"), belief("a", "evt_2", "two")], "r2", None).unwrap();
        save_checkpoint(&paths, &c1).unwrap();
        save_checkpoint(&paths, &c2).unwrap();
        let latest = load_latest_checkpoint(&paths).unwrap().unwrap();
        assert_eq!(latest.event_count, 2);
    }
}
