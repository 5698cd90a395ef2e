//! The on-disk vault: layout, append-only log, key registry, genesis
//! bootstrap, manifest anchoring, checkpoints, key rotation, redaction, and
//! whole-vault verification, built on [`provara_core`]'s pure primitives.

pub mod checkpoint;
pub mod error;
pub mod genesis;
pub mod keys;
pub mod layout;
pub mod log;
pub mod manifest;
pub mod redaction;
pub mod rotation;
pub mod vault;
pub mod verify;

pub use checkpoint::{Checkpoint, create_checkpoint, load_latest_checkpoint, replay_from_checkpoint, save_checkpoint};
pub use error::VaultError;
pub use genesis::{bootstrap, BootstrapResult, Genesis};
pub use layout::VaultPaths;
pub use manifest::{FileEntry, Manifest};
pub use redaction::{redact_event, RedactionResult, Tombstone};
pub use rotation::{rotate_key, RotationResult};
pub use vault::Vault;
pub use verify::{verify_vault, VerifyReport};
