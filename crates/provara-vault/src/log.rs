//! `events/events.ndjson` I/O: append under lock, tolerant read, atomic
//! rewrite.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use provara_core::Event;

use crate::error::VaultError;

/// Loads every event in file order. Blank lines are ignored; a malformed
/// line is logged as a warning and skipped rather than aborting the read —
/// readers tolerate concurrent appenders and partial corruption the same
/// way (§5, §7).
pub fn load_events(path: &Path) -> Result<Vec<Event>, VaultError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut events = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Event>(trimmed) {
            Ok(event) => events.push(event),
            Err(err) => {
                tracing::warn!(line = lineno + 1, error = %err, "skipping malformed NDJSON line");
            }
        }
    }
    Ok(events)
}

/// Appends one canonical-JSON line and fsyncs before returning.
pub fn append_event(path: &Path, event: &Event) -> Result<(), VaultError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = provara_core::to_canonical_bytes(event)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&bytes)?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    Ok(())
}

/// Rewrites the whole log via temp-file + atomic rename (used by sync,
/// rotation, and redaction, which replace the event sequence wholesale).
pub fn write_events(path: &Path, events: &[Event]) -> Result<(), VaultError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("ndjson.tmp");
    {
        let mut file = File::create(&tmp)?;
        for event in events {
            let bytes = provara_core::to_canonical_bytes(event)?;
            file.write_all(&bytes)?;
            file.write_all(b"\n")?;
        }
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}
