//! First-boot bootstrap (§9 scenario S1): mint the root key, write
//! `identity/genesis.json`, and seed the log with `GENESIS` + an initial
//! `OBSERVATION`.

use serde::{Deserialize, Serialize};
use serde_json::json;

use provara_core::{crypto, event, BeliefPayload, EventKind, Keypair, Namespace};

use crate::error::VaultError;
use crate::layout::VaultPaths;
use crate::{keys, log, manifest};

/// `identity/genesis.json` (§3 `Genesis`). Everything but `uid`,
/// `birth_timestamp`, and `root_key_id` is optional scaffolding a vault owner
/// may fill in later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genesis {
    pub uid: String,
    pub birth_timestamp: String,
    pub root_key_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub governance_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_ontology_versions: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predecessor_vault: Option<String>,
    pub spec_version: String,
}

pub struct BootstrapResult {
    pub genesis: Genesis,
    /// The freshly generated root keypair. The vault never persists the
    /// private half — it is the caller's responsibility to store it outside
    /// the vault (a wallet, an HSM, a password manager).
    pub root_keypair: Keypair,
}

/// Initializes an empty directory as a vault. Errors if `identity/genesis.json`
/// already exists, since a vault is born exactly once.
pub fn bootstrap(paths: &VaultPaths, actor: &str) -> Result<BootstrapResult, VaultError> {
    if paths.genesis_json().exists() {
        return Err(VaultError::SecurityConstraint(
            "vault already initialized: identity/genesis.json exists".to_string(),
        ));
    }
    paths.ensure_directories()?;

    let root_keypair = Keypair::generate();
    let root_key_id = root_keypair.key_id();

    let registry_key = crypto::Key::from_verifying_key(
        &root_keypair.verifying,
        vec!["root".to_string()],
        vec!["*".to_string()],
    );
    let registry = provara_core::KeyRegistry {
        keys: vec![registry_key],
        revocations: vec![],
    };
    keys::write_key_registry(&paths.keys_json(), &registry)?;

    let genesis = Genesis {
        uid: format!("vault_{}", &root_key_id[4..]),
        birth_timestamp: chrono::Utc::now().to_rfc3339(),
        root_key_id: root_key_id.clone(),
        governance_model: None,
        initial_ontology_versions: None,
        predecessor_vault: None,
        spec_version: "1.0".to_string(),
    };
    let genesis_bytes = provara_core::to_canonical_bytes(&genesis)?;
    std::fs::write(paths.genesis_json(), genesis_bytes)?;

    let mut genesis_event = event::Event::new_unsigned(
        EventKind::Genesis,
        Namespace::Canonical,
        actor,
        None,
        json!({ "uid": genesis.uid, "root_key_id": root_key_id }),
    );
    genesis_event.event_id = event::compute_event_id(&genesis_event)?;
    event::sign_event(&mut genesis_event, &root_keypair.signing, &root_key_id)?;
    log::append_event(&paths.events_ndjson(), &genesis_event)?;

    let observation_payload = BeliefPayload {
        subject: "system".to_string(),
        predicate: "status".to_string(),
        value: json!("initialized"),
        confidence: Some(1.0),
    };
    let mut observation = event::Event::new_unsigned(
        EventKind::Observation,
        Namespace::Canonical,
        actor,
        Some(genesis_event.event_id.clone()),
        serde_json::to_value(&observation_payload)?,
    );
    observation.event_id = event::compute_event_id(&observation)?;
    event::sign_event(&mut observation, &root_keypair.signing, &root_key_id)?;
    log::append_event(&paths.events_ndjson(), &observation)?;

    manifest::regenerate(paths, &root_keypair.signing, &root_key_id)?;

    tracing::info!(uid = %genesis.uid, root_key_id = %root_key_id, "vault bootstrapped");

    Ok(BootstrapResult { genesis, root_keypair })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_seeds_genesis_and_observation() {
        let dir = tempfile::tempdir().unwrap();
        let paths = VaultPaths::new(dir.path());
        let result = bootstrap(&paths, "root_actor").unwrap();

        assert!(paths.genesis_json().exists());
        assert!(paths.keys_json().exists());
        assert!(paths.manifest_json().exists());

        let events = log::load_events(&paths.events_ndjson()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind.as_str(), "GENESIS");
        assert_eq!(events[1].kind.as_str(), "OBSERVATION");
        assert_eq!(events[1].prev_event_hash.as_deref(), Some(events[0].event_id.as_str()));

        let registry = keys::load_key_registry(&paths.keys_json()).unwrap();
        assert!(registry.is_active(&result.genesis.root_key_id));
    }

    #[test]
    fn bootstrap_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let paths = VaultPaths::new(dir.path());
        bootstrap(&paths, "root_actor").unwrap();
        let second = bootstrap(&paths, "root_actor");
        assert!(second.is_err());
    }
}
