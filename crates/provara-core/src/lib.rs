//! Core vault integrity engine: canonical JSON, integrity primitives,
//! Ed25519 key registry and signing, the event model, and the deterministic
//! reducer. Synchronous throughout — no async runtime, no network I/O.

pub mod canon;
pub mod crypto;
pub mod error;
pub mod event;
pub mod integrity;
pub mod reducer;

pub use canon::{canonical_hash, to_canonical_bytes, CanonError};
pub use crypto::{Key, KeyRegistry, KeyStatus, Keypair, ManifestSignature, Revocation};
pub use error::ErrorCode;
pub use event::{BeliefPayload, ChainViolation, Event, EventKind, Fork, Namespace};
pub use integrity::{is_safe_relative_path, merkle_root_hex, sha256_file, sha256_hex, Digest32};
pub use reducer::{MerkleFrontier, ReducerConfig, ReducerState, StreamingReducer, StreamingSnapshot};
