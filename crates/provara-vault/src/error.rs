use provara_core::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("{code}: {0}", code = ErrorCode::E302VaultStructureInvalid)]
    Io(#[from] std::io::Error),

    #[error("{code}: {0}", code = ErrorCode::E300RequiredFieldMissing)]
    Serialize(#[from] serde_json::Error),

    #[error("{code}: {0}", code = ErrorCode::E300RequiredFieldMissing)]
    Canon(#[from] provara_core::CanonError),

    #[error("{code}: {0}", code = ErrorCode::E003InvalidSignature)]
    Crypto(#[from] provara_core::crypto::CryptoError),

    #[error("{code}: {0}", code = ErrorCode::E302VaultStructureInvalid)]
    MissingFile(String),

    #[error("{code}: {0}", code = ErrorCode::E204KeyNotFound)]
    KeyNotFound(String),

    #[error("{code}: {0}", code = ErrorCode::E003InvalidSignature)]
    InvalidSignature(String),

    #[error("{code}: {0}", code = ErrorCode::E002BrokenCausalChain)]
    BrokenChain(String),

    #[error("{code}: security constraint violated: {0}", code = ErrorCode::E300RequiredFieldMissing)]
    SecurityConstraint(String),
}
