//! Event model, identity, and causal chain verification (C4).

use std::collections::HashMap;

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canon::{self, CanonError};
use crate::crypto::{self, CryptoError, KeyRegistry};
use crate::error::ErrorCode;
use crate::integrity::sha256_hex;

/// The event's `type` tag. Core types are modeled as variants; any other
/// reverse-DNS string (`com.provara.redaction`, `com.provara.migration`, a
/// plugin's own namespace, …) is accepted as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Genesis,
    Observation,
    Assertion,
    Attestation,
    Retraction,
    ReducerEpoch,
    KeyRevocation,
    KeyPromotion,
    Custom(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Genesis => "GENESIS",
            EventKind::Observation => "OBSERVATION",
            EventKind::Assertion => "ASSERTION",
            EventKind::Attestation => "ATTESTATION",
            EventKind::Retraction => "RETRACTION",
            EventKind::ReducerEpoch => "REDUCER_EPOCH",
            EventKind::KeyRevocation => "KEY_REVOCATION",
            EventKind::KeyPromotion => "KEY_PROMOTION",
            EventKind::Custom(s) => s,
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "GENESIS" => EventKind::Genesis,
            "OBSERVATION" => EventKind::Observation,
            "ASSERTION" => EventKind::Assertion,
            "ATTESTATION" => EventKind::Attestation,
            "RETRACTION" => EventKind::Retraction,
            "REDUCER_EPOCH" => EventKind::ReducerEpoch,
            "KEY_REVOCATION" => EventKind::KeyRevocation,
            "KEY_PROMOTION" => EventKind::KeyPromotion,
            _ => EventKind::Custom(s),
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(EventKind::from(String::deserialize(d)?))
    }
}

/// One of the reducer's four state buckets. Unknown values normalize to
/// `Local`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Canonical,
    Local,
    Contested,
    Archived,
}

impl Namespace {
    fn as_str(self) -> &'static str {
        match self {
            Namespace::Canonical => "canonical",
            Namespace::Local => "local",
            Namespace::Contested => "contested",
            Namespace::Archived => "archived",
        }
    }
}

impl From<Namespace> for String {
    fn from(n: Namespace) -> Self {
        n.as_str().to_string()
    }
}

impl From<String> for Namespace {
    fn from(s: String) -> Self {
        match s.as_str() {
            "canonical" => Namespace::Canonical,
            "contested" => Namespace::Contested,
            "archived" => Namespace::Archived,
            _ => Namespace::Local,
        }
    }
}

impl Serialize for Namespace {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Namespace {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(Namespace::from(String::deserialize(d)?))
    }
}

/// `{subject, predicate, value, confidence}` — the shape of `payload` for
/// belief-bearing events (`OBSERVATION`/`ASSERTION`). `value` stays a
/// JSON-tree variant so canonical semantics (and arbitrary belief shapes)
/// are preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeliefPayload {
    pub subject: String,
    pub predicate: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl BeliefPayload {
    pub fn key(&self) -> String {
        format!("{}:{}", self.subject, self.predicate)
    }
}

/// An append-only log entry (§3 `Event`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub namespace: Namespace,
    pub actor: String,
    #[serde(default)]
    pub actor_key_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts_logical: Option<u64>,
    pub timestamp_utc: String,
    pub prev_event_hash: Option<String>,
    pub payload: Value,
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub sig: String,
}

impl Event {
    /// Builds an unsigned event with `event_id`/`sig` left blank; the caller
    /// fills `prev_event_hash` by looking up the actor's chain head, then
    /// calls [`compute_event_id`] and [`sign_event`] to finish it, mirroring
    /// the append rule in spec §4.4.
    pub fn new_unsigned(
        kind: EventKind,
        namespace: Namespace,
        actor: impl Into<String>,
        prev_event_hash: Option<String>,
        payload: Value,
    ) -> Self {
        Event {
            kind,
            namespace,
            actor: actor.into(),
            actor_key_id: String::new(),
            ts_logical: None,
            timestamp_utc: chrono::Utc::now().to_rfc3339(),
            prev_event_hash,
            payload,
            event_id: String::new(),
            sig: String::new(),
        }
    }
}

fn value_excluding(event: &Event, exclude: &[&str]) -> Result<Value, CanonError> {
    let mut v = serde_json::to_value(event)?;
    if let Value::Object(map) = &mut v {
        for key in exclude {
            map.remove(*key);
        }
    }
    Ok(v)
}

/// `event_id = "evt_" + hex(SHA-256(canonical_bytes(event \ {event_id, sig})))[:24]`.
pub fn compute_event_id(event: &Event) -> Result<String, CanonError> {
    let v = value_excluding(event, &["event_id", "sig"])?;
    let bytes = canon::to_canonical_bytes(&v)?;
    let digest = sha256_hex(&bytes);
    Ok(format!("evt_{}", &digest[..24]))
}

fn bytes_excluding_sig(event: &Event) -> Result<Vec<u8>, CanonError> {
    let v = value_excluding(event, &["sig"])?;
    canon::to_canonical_bytes(&v)
}

/// Sets `actor_key_id`, then `sig = base64(Ed25519-sign(priv, canonical_bytes(e \ sig)))`.
/// `event.event_id` must already be set (see [`compute_event_id`]).
pub fn sign_event(event: &mut Event, signing: &SigningKey, key_id: &str) -> Result<(), CryptoError> {
    event.actor_key_id = key_id.to_string();
    let bytes = bytes_excluding_sig(event)?;
    event.sig = crypto::sign_bytes(signing, &bytes);
    Ok(())
}

/// Total: returns `false` on any missing field, malformed base64, unknown
/// key, or failed verification. Never panics, never propagates an error.
pub fn verify_event_signature(event: &Event, registry: &KeyRegistry) -> bool {
    if event.actor_key_id.is_empty() || event.sig.is_empty() {
        return false;
    }
    let Some(verifying) = registry.resolve_public_key(&event.actor_key_id) else {
        return false;
    };
    let Ok(bytes) = bytes_excluding_sig(event) else {
        return false;
    };
    crypto::verify_bytes(&verifying, &bytes, &event.sig)
}

/// A single causal-chain invariant violation (§3 invariants 3/4).
#[derive(Debug, Clone)]
pub struct ChainViolation {
    pub actor: String,
    pub event_id: String,
    pub code: ErrorCode,
    pub detail: String,
}

/// For each actor, asserts that `prev_event_hash` chains to the previous
/// event's `event_id` in file order, and that the first event for an actor
/// has `prev_event_hash = None`. Total: returns findings, never panics.
pub fn verify_causal_chain(events: &[Event]) -> Vec<ChainViolation> {
    let mut last_for_actor: HashMap<&str, &str> = HashMap::new();
    let mut violations = Vec::new();
    for event in events {
        let expected_prev = last_for_actor.get(event.actor.as_str()).copied();
        let ok = match (&event.prev_event_hash, expected_prev) {
            (None, None) => true,
            (Some(h), Some(prev)) => h == prev,
            _ => false,
        };
        if !ok {
            violations.push(ChainViolation {
                actor: event.actor.clone(),
                event_id: event.event_id.clone(),
                code: ErrorCode::E002BrokenCausalChain,
                detail: format!(
                    "event {} for actor {} does not chain from the actor's previous event",
                    event.event_id, event.actor
                ),
            });
        }
        last_for_actor.insert(event.actor.as_str(), event.event_id.as_str());
    }
    violations
}

/// A set of events sharing `(actor, prev_event_hash)` — a fork. Reported as
/// one entry per colliding group, listing every event_id in the group.
#[derive(Debug, Clone)]
pub struct Fork {
    pub actor: String,
    pub prev_event_hash: Option<String>,
    pub event_ids: Vec<String>,
}

/// Groups events by `(actor, prev_event_hash)`; any group of size >= 2 is a
/// fork.
pub fn detect_forks(events: &[Event]) -> Vec<Fork> {
    let mut groups: HashMap<(String, Option<String>), Vec<String>> = HashMap::new();
    for event in events {
        groups
            .entry((event.actor.clone(), event.prev_event_hash.clone()))
            .or_default()
            .push(event.event_id.clone());
    }
    groups
        .into_iter()
        .filter(|(_, ids)| ids.len() >= 2)
        .map(|((actor, prev_event_hash), event_ids)| Fork {
            actor,
            prev_event_hash,
            event_ids,
        })
        .collect()
}

/// Returns any `event_id` appearing more than once in `events` (§3 invariant 5).
pub fn find_duplicate_event_ids(events: &[Event]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut dupes = Vec::new();
    for event in events {
        if !seen.insert(event.event_id.clone()) && !dupes.contains(&event.event_id) {
            dupes.push(event.event_id.clone());
        }
    }
    dupes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn belief(subject: &str, predicate: &str, value: &str, confidence: f64) -> Value {
        serde_json::to_value(BeliefPayload {
            subject: subject.into(),
            predicate: predicate.into(),
            value: json!(value),
            confidence: Some(confidence),
        })
        .unwrap()
    }

    #[test]
    fn event_id_matches_declared_derivation() {
        let event = Event::new_unsigned(
            EventKind::Observation,
            Namespace::Local,
            "robot_a",
            None,
            belief("door_01", "opens", "inward", 0.9),
        );
        let id = compute_event_id(&event).unwrap();
        assert!(id.starts_with("evt_"));
        assert_eq!(id.len(), 4 + 24);
    }

    #[test]
    fn sign_then_verify_round_trip() {
        let kp = crypto::Keypair::generate();
        let mut event = Event::new_unsigned(
            EventKind::Observation,
            Namespace::Local,
            "robot_a",
            None,
            belief("door_01", "opens", "inward", 0.9),
        );
        event.event_id = compute_event_id(&event).unwrap();
        sign_event(&mut event, &kp.signing, &kp.key_id()).unwrap();

        let key = crypto::Key::from_verifying_key(&kp.verifying, vec![], vec![]);
        let registry = KeyRegistry {
            keys: vec![key],
            revocations: vec![],
        };
        assert!(verify_event_signature(&event, &registry));
    }

    #[test]
    fn avalanche_single_field_mutation_breaks_signature() {
        let kp = crypto::Keypair::generate();
        let mut event = Event::new_unsigned(
            EventKind::Observation,
            Namespace::Local,
            "robot_a",
            None,
            belief("door_01", "opens", "inward", 0.9),
        );
        event.event_id = compute_event_id(&event).unwrap();
        sign_event(&mut event, &kp.signing, &kp.key_id()).unwrap();
        let registry = KeyRegistry {
            keys: vec![crypto::Key::from_verifying_key(&kp.verifying, vec![], vec![])],
            revocations: vec![],
        };
        event.payload = belief("door_01", "opens", "outward", 0.9);
        assert!(!verify_event_signature(&event, &registry));
    }

    #[test]
    fn chain_verification_detects_break() {
        let e1 = Event::new_unsigned(EventKind::Observation, Namespace::Local, "a", None, json!({}));
        let mut e2 = Event::new_unsigned(EventKind::Observation, Namespace::Local, "a", Some("evt_bogus".into()), json!({}));
        let mut first = e1.clone();
        first.event_id = "evt_first".into();
        e2.event_id = "evt_second".into();
        let violations = verify_causal_chain(&[first, e2]);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn fork_detection_groups_by_actor_and_prev() {
        let mut a = Event::new_unsigned(EventKind::Observation, Namespace::Local, "a", None, json!({}));
        a.event_id = "evt_a".into();
        let mut b = Event::new_unsigned(EventKind::Observation, Namespace::Local, "a", None, json!({}));
        b.event_id = "evt_b".into();
        let forks = detect_forks(&[a, b]);
        assert_eq!(forks.len(), 1);
        assert_eq!(forks[0].event_ids.len(), 2);
    }

    #[test]
    fn unknown_namespace_normalizes_to_local() {
        let ns: Namespace = Namespace::from("weird".to_string());
        assert_eq!(ns, Namespace::Local);
    }
}
