//! Stable error codes shared across every Provara crate.
//!
//! `ErrorCode` is independent of message text: two errors with the same code
//! are the same class of failure even if their `Display` strings differ.

use std::fmt;

/// One of the stable codes from the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Stored hash does not match the recomputed one.
    E001HashMismatch,
    /// `prev_event_hash` does not match the actor's previous `event_id`.
    E002BrokenCausalChain,
    /// Ed25519 verification failed.
    E003InvalidSignature,
    /// A hash string is not 64 lowercase hex characters.
    E100HashFormat,
    /// `actor_key_id` is absent from the key registry.
    E204KeyNotFound,
    /// Event schema violation: a required field is missing.
    E300RequiredFieldMissing,
    /// A required vault file or directory is missing.
    E302VaultStructureInvalid,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::E001HashMismatch => "PROVARA_E001",
            ErrorCode::E002BrokenCausalChain => "PROVARA_E002",
            ErrorCode::E003InvalidSignature => "PROVARA_E003",
            ErrorCode::E100HashFormat => "PROVARA_E100",
            ErrorCode::E204KeyNotFound => "PROVARA_E204",
            ErrorCode::E300RequiredFieldMissing => "PROVARA_E300",
            ErrorCode::E302VaultStructureInvalid => "PROVARA_E302",
        }
    }

    /// Where a caller can read the full write-up for this code.
    pub fn doc_url(self) -> String {
        format!("https://provara.dev/errors/{}", self.as_str())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
