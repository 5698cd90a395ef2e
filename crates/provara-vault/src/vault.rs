//! The `Vault` façade: single-writer-per-process coordination over the
//! on-disk layout, log, reducer, manifest, and checkpoint subsystems.

use std::sync::Mutex;

use ed25519_dalek::SigningKey;
use serde_json::Value;

use provara_core::{event, Event, EventKind, KeyRegistry, Namespace, ReducerConfig, ReducerState};

use crate::checkpoint::{self, Checkpoint};
use crate::error::VaultError;
use crate::layout::VaultPaths;
use crate::manifest;
use crate::verify::{self, VerifyReport};
use crate::{keys, log};

/// A handle to one vault directory. Concurrent writers within the same
/// process serialize on `write_lock`; there is no cross-process lock — two
/// OS processes opening the same vault path is outside this crate's
/// concurrency model (see DESIGN.md).
pub struct Vault {
    paths: VaultPaths,
    write_lock: Mutex<()>,
}

impl Vault {
    pub fn open(root: impl Into<std::path::PathBuf>) -> Self {
        Vault {
            paths: VaultPaths::new(root),
            write_lock: Mutex::new(()),
        }
    }

    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    pub fn key_registry(&self) -> Result<KeyRegistry, VaultError> {
        keys::load_key_registry(&self.paths.keys_json())
    }

    /// Appends a new event for `actor`, chaining it from the actor's current
    /// head. Holds `write_lock` across the read-prev/compute/sign/fsync
    /// sequence so two in-process writers can never interleave on the same
    /// actor's chain.
    pub fn append(
        &self,
        kind: EventKind,
        namespace: Namespace,
        actor: &str,
        payload: Value,
        signing: &SigningKey,
        signing_key_id: &str,
    ) -> Result<Event, VaultError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let registry = self.key_registry()?;
        if !registry.is_active(signing_key_id) {
            return Err(VaultError::KeyNotFound(signing_key_id.to_string()));
        }

        let events = log::load_events(&self.paths.events_ndjson())?;
        let prev_event_hash = events
            .iter()
            .rev()
            .find(|e| e.actor == actor)
            .map(|e| e.event_id.clone());

        let mut new_event = Event::new_unsigned(kind, namespace, actor, prev_event_hash, payload);
        new_event.event_id = event::compute_event_id(&new_event)?;
        event::sign_event(&mut new_event, signing, signing_key_id)?;

        log::append_event(&self.paths.events_ndjson(), &new_event)?;
        Ok(new_event)
    }

    pub fn load_events(&self) -> Result<Vec<Event>, VaultError> {
        log::load_events(&self.paths.events_ndjson())
    }

    pub fn replay(&self) -> Result<ReducerState, VaultError> {
        checkpoint::load_state(&self.paths)
    }

    pub fn replay_with_config(&self, config: &ReducerConfig) -> Result<ReducerState, VaultError> {
        let events = self.load_events()?;
        match checkpoint::load_latest_checkpoint(&self.paths)? {
            Some(cp) => Ok(checkpoint::replay_from_checkpoint(&cp, &events, config)),
            None => Ok(provara_core::reducer::replay_with_config(&events, config)),
        }
    }

    pub fn verify(&self) -> Result<VerifyReport, VaultError> {
        verify::verify_vault(&self.paths)
    }

    pub fn regenerate_manifest(&self, signing: &SigningKey, key_id: &str) -> Result<(), VaultError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        manifest::regenerate(&self.paths, signing, key_id)
    }

    /// Snapshots current replay state and signs it if a signer is given.
    pub fn create_checkpoint(&self, signing: Option<(&SigningKey, &str)>) -> Result<Checkpoint, VaultError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let events = self.load_events()?;
        let merkle_root = std::fs::read_to_string(self.paths.merkle_root_txt())
            .unwrap_or_default()
            .trim()
            .to_string();
        let cp = checkpoint::create_checkpoint(&events, &merkle_root, signing)?;
        checkpoint::save_checkpoint(&self.paths, &cp)?;
        Ok(cp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis;
    use serde_json::json;

    #[test]
    fn append_chains_from_actors_prior_event() {
        let dir = tempfile::tempdir().unwrap();
        let result = genesis::bootstrap(&VaultPaths::new(dir.path()), "root_actor").unwrap();
        let vault = Vault::open(dir.path());

        let e1 = vault
            .append(
                EventKind::Observation,
                Namespace::Local,
                "root_actor",
                json!({"subject": "a", "predicate": "b", "value": 1}),
                &result.root_keypair.signing,
                &result.genesis.root_key_id,
            )
            .unwrap();
        let e2 = vault
            .append(
                EventKind::Observation,
                Namespace::Local,
                "root_actor",
                json!({"subject": "a", "predicate": "b", "value": 2}),
                &result.root_keypair.signing,
                &result.genesis.root_key_id,
            )
            .unwrap();

        assert_eq!(e2.prev_event_hash.as_deref(), Some(e1.event_id.as_str()));
        let report = vault.verify().unwrap();
        assert!(report.chain_violations.is_empty());
        assert!(report.invalid_signatures.is_empty());
    }

    #[test]
    fn checkpoint_then_replay_matches_full_replay() {
        let dir = tempfile::tempdir().unwrap();
        let result = genesis::bootstrap(&VaultPaths::new(dir.path()), "root_actor").unwrap();
        let vault = Vault::open(dir.path());
        vault.create_checkpoint(Some((&result.root_keypair.signing, &result.genesis.root_key_id))).unwrap();

        vault
            .append(
                EventKind::Observation,
                Namespace::Local,
                "root_actor",
                json!({"subject": "a", "predicate": "b", "value": 1}),
                &result.root_keypair.signing,
                &result.genesis.root_key_id,
            )
            .unwrap();

        let accelerated = vault.replay().unwrap();
        let full = provara_core::reducer::replay(&vault.load_events().unwrap());
        assert_eq!(accelerated.local, full.local);
    }
}
