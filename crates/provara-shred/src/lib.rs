//! Crypto-shredding (C10): AES-256-GCM payload wrapping plus a `rusqlite`
//! sidecar holding destroyable per-event/per-actor DEKs.

pub mod error;
pub mod shred;
pub mod store;
pub mod wrap;

pub use error::ShredError;
pub use shred::{shred_actor, shred_event, ShredResult, ShredScope};
pub use store::PrivacyKeyStore;
pub use wrap::{decrypt_payload, encrypt_payload, generate_dek, is_wrapped, PrivacyWrapper};
