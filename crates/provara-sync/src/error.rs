use provara_core::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{code}: {0}", code = ErrorCode::E302VaultStructureInvalid)]
    Io(#[from] std::io::Error),

    #[error("{code}: {0}", code = ErrorCode::E300RequiredFieldMissing)]
    Serialize(#[from] serde_json::Error),

    #[error("{code}: {0}", code = ErrorCode::E300RequiredFieldMissing)]
    Vault(#[from] provara_vault::VaultError),

    #[error("{code}: {0}", code = ErrorCode::E300RequiredFieldMissing)]
    Canon(#[from] provara_core::CanonError),

    #[error("{code}: malformed delta header: {0}", code = ErrorCode::E300RequiredFieldMissing)]
    BadDeltaHeader(String),

    #[error("{code}: {0}", code = ErrorCode::E003InvalidSignature)]
    InvalidFencingToken(String),
}
