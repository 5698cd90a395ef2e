//! `identity/keys.json` persistence.

use std::fs;
use std::path::Path;

use provara_core::KeyRegistry;

use crate::error::VaultError;

pub fn load_key_registry(path: &Path) -> Result<KeyRegistry, VaultError> {
    if !path.exists() {
        return Ok(KeyRegistry::default());
    }
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Writes via temp-file + atomic rename (§5).
pub fn write_key_registry(path: &Path, registry: &KeyRegistry) -> Result<(), VaultError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = provara_core::to_canonical_bytes(registry)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
