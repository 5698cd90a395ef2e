//! The sync engine (C8): union merge, fencing tokens, and delta
//! export/import, layered on [`provara_vault`]'s log and manifest
//! subsystems.

pub mod delta;
pub mod error;
pub mod fencing;
pub mod union;

pub use delta::{export_delta, import_delta, DeltaHeader, ImportResult};
pub use error::SyncError;
pub use fencing::{create_fencing_token, validate_fencing_token, FencingToken};
pub use union::{merge_and_check, union_merge, MergeReport};

use ed25519_dalek::SigningKey;
use provara_vault::{keys, layout::VaultPaths, log, manifest};

/// Merges `remote_events` into the vault at `paths`: union merge, rewrite
/// the log, regenerate manifest + Merkle root. Does not re-sign the merged
/// events — sync never alters an event's signature, only the set and order
/// of events on disk.
pub fn sync_vault(
    paths: &VaultPaths,
    remote_events: &[provara_core::Event],
    signing: &SigningKey,
    signing_key_id: &str,
) -> Result<MergeReport, SyncError> {
    let local_events = log::load_events(&paths.events_ndjson())?;
    let report = merge_and_check(&local_events, remote_events);
    log::write_events(&paths.events_ndjson(), &report.merged)?;
    manifest::regenerate(paths, signing, signing_key_id)?;
    Ok(report)
}

/// Imports a delta byte stream into the vault at `paths`.
pub fn sync_from_delta(
    paths: &VaultPaths,
    delta_bytes: &[u8],
    signing: &SigningKey,
    signing_key_id: &str,
) -> Result<ImportResult, SyncError> {
    let local_events = log::load_events(&paths.events_ndjson())?;
    let local_registry = keys::load_key_registry(&paths.keys_json())?;
    let result = import_delta(delta_bytes, &local_events, &local_registry)?;
    log::write_events(&paths.events_ndjson(), &result.merged)?;
    manifest::regenerate(paths, signing, signing_key_id)?;
    Ok(result)
}
