//! Delta export/import (§4.8, §3 `D`): a portable NDJSON subset of a vault's
//! log, used for partial sync between two vaults that are not directly
//! networked.

use provara_core::{crypto::Key, Event, KeyRegistry};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::union;

pub const DELTA_TYPE: &str = "provara_delta_v1";

/// The delta's first NDJSON line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaHeader {
    #[serde(rename = "type")]
    pub kind: String,
    pub since_hash: Option<String>,
    pub event_count: usize,
    pub exported_at: String,
    pub keys: Vec<Key>,
}

/// Result of [`import_delta`]: the merged log plus a count of events whose
/// signature failed verification and were therefore rejected.
pub struct ImportResult {
    pub merged: Vec<Event>,
    pub rejected_count: usize,
}

/// Emits the header line followed by one line per event strictly after
/// `since_hash` (or every event if `since_hash` is `None` or not found).
pub fn export_delta(events: &[Event], keys: &KeyRegistry, since_hash: Option<&str>) -> Result<Vec<u8>, SyncError> {
    let start = match since_hash {
        Some(hash) => events.iter().position(|e| e.event_id == hash).map(|i| i + 1).unwrap_or(0),
        None => 0,
    };
    let tail = &events[start..];

    let header = DeltaHeader {
        kind: DELTA_TYPE.to_string(),
        since_hash: since_hash.map(str::to_string),
        event_count: tail.len(),
        exported_at: chrono::Utc::now().to_rfc3339(),
        keys: keys.keys.clone(),
    };

    let mut out = serde_json::to_vec(&header)?;
    out.push(b'\n');
    for event in tail {
        out.extend(serde_json::to_vec(event)?);
        out.push(b'\n');
    }
    Ok(out)
}

/// Parses a delta stream, verifies every signed event against a registry
/// built from the delta's own header keys plus `local_registry`, and
/// union-merges the accepted events with `local_events`. Events with an
/// invalid signature are dropped and counted in `rejected_count`, never
/// aborting the whole import.
pub fn import_delta(bytes: &[u8], local_events: &[Event], local_registry: &KeyRegistry) -> Result<ImportResult, SyncError> {
    let text = std::str::from_utf8(bytes).map_err(|e| SyncError::BadDeltaHeader(e.to_string()))?;
    let mut lines = text.lines();

    let header_line = lines.next().ok_or_else(|| SyncError::BadDeltaHeader("empty delta".to_string()))?;
    let header: DeltaHeader = serde_json::from_str(header_line)?;
    if header.kind != DELTA_TYPE {
        return Err(SyncError::BadDeltaHeader(format!("unexpected type {}", header.kind)));
    }

    let mut combined_registry = local_registry.clone();
    for key in header.keys {
        if combined_registry.entry(&key.key_id).is_none() {
            combined_registry.keys.push(key);
        }
    }

    let mut accepted = Vec::new();
    let mut rejected_count = 0;
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event: Event = match serde_json::from_str(trimmed) {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed delta event line");
                rejected_count += 1;
                continue;
            }
        };
        if provara_core::event::verify_event_signature(&event, &combined_registry) {
            accepted.push(event);
        } else {
            rejected_count += 1;
        }
    }

    let merged = union::union_merge(local_events, &accepted);
    Ok(ImportResult { merged, rejected_count })
}
