//! Total, whole-vault verification: signatures, causal chain, forks,
//! duplicate ids, and the manifest anchor.

use serde::{Deserialize, Serialize};

use provara_core::{crypto, event, Event, KeyRegistry};

use crate::error::VaultError;
use crate::keys;
use crate::layout::VaultPaths;
use crate::log;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyReport {
    pub event_count: usize,
    pub invalid_signatures: Vec<String>,
    pub chain_violations: Vec<String>,
    pub forks: Vec<String>,
    pub duplicate_event_ids: Vec<String>,
    pub manifest_ok: bool,
    pub warnings: Vec<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.invalid_signatures.is_empty()
            && self.chain_violations.is_empty()
            && self.forks.is_empty()
            && self.duplicate_event_ids.is_empty()
            && self.manifest_ok
    }
}

/// Runs every check spec.md requires of a vault verifier, never stopping
/// early on the first failure — the report aggregates everything found.
pub fn verify_vault(paths: &VaultPaths) -> Result<VerifyReport, VaultError> {
    let events = log::load_events(&paths.events_ndjson())?;
    let registry = keys::load_key_registry(&paths.keys_json())?;

    let invalid_signatures = invalid_signatures(&events, &registry);
    let chain_violations = event::verify_causal_chain(&events)
        .into_iter()
        .map(|v| v.detail)
        .collect();
    let forks = event::detect_forks(&events)
        .into_iter()
        .map(|f| format!("actor {} has {} events with prev_event_hash {:?}", f.actor, f.event_ids.len(), f.prev_event_hash))
        .collect();
    let duplicate_event_ids = event::find_duplicate_event_ids(&events);

    let mut warnings = Vec::new();
    let missing = paths.missing_required_paths();
    if !missing.is_empty() {
        warnings.push(format!("missing required vault files: {}", missing.join(", ")));
    }
    let manifest_ok = verify_manifest(paths, &registry, &mut warnings);

    Ok(VerifyReport {
        event_count: events.len(),
        invalid_signatures,
        chain_violations,
        forks,
        duplicate_event_ids,
        manifest_ok,
        warnings,
    })
}

fn invalid_signatures(events: &[Event], registry: &KeyRegistry) -> Vec<String> {
    events
        .iter()
        .filter(|e| !event::verify_event_signature(e, registry))
        .map(|e| e.event_id.clone())
        .collect()
}

fn verify_manifest(paths: &VaultPaths, registry: &KeyRegistry, warnings: &mut Vec<String>) -> bool {
    if !paths.manifest_sig().exists() {
        warnings.push("manifest.sig missing".to_string());
        return false;
    }
    let Ok(raw) = std::fs::read_to_string(paths.manifest_sig()) else {
        warnings.push("manifest.sig unreadable".to_string());
        return false;
    };
    let Ok(record) = serde_json::from_str::<crypto::ManifestSignature>(&raw) else {
        warnings.push("manifest.sig malformed".to_string());
        return false;
    };
    if !crypto::verify_manifest_signature(&record, registry) {
        warnings.push("manifest signature invalid".to_string());
        return false;
    }
    match provara_core::sha256_file(&paths.manifest_json()) {
        Ok(hash) if hash == record.manifest_sha256 => true,
        Ok(_) => {
            warnings.push("manifest.json hash does not match manifest.sig".to_string());
            false
        }
        Err(_) => {
            warnings.push("manifest.json unreadable".to_string());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis;

    #[test]
    fn freshly_bootstrapped_vault_verifies_clean() {
        let dir = tempfile::tempdir().unwrap();
        let paths = VaultPaths::new(dir.path());
        genesis::bootstrap(&paths, "root_actor").unwrap();

        let report = verify_vault(&paths).unwrap();
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(report.event_count, 2);
    }

    #[test]
    fn tampered_payload_is_caught_by_signature_check() {
        let dir = tempfile::tempdir().unwrap();
        let paths = VaultPaths::new(dir.path());
        genesis::bootstrap(&paths, "root_actor").unwrap();

        let mut events = log::load_events(&paths.events_ndjson()).unwrap();
        events[1].payload = serde_json::json!({"tampered": true});
        log::write_events(&paths.events_ndjson(), &events).unwrap();

        let report = verify_vault(&paths).unwrap();
        assert!(!report.invalid_signatures.is_empty());
        assert!(!report.is_clean());
    }
}
