use provara_core::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShredError {
    #[error("{code}: {0}", code = ErrorCode::E302VaultStructureInvalid)]
    Io(#[from] std::io::Error),

    #[error("{code}: {0}", code = ErrorCode::E300RequiredFieldMissing)]
    Serialize(#[from] serde_json::Error),

    #[error("{code}: {0}", code = ErrorCode::E300RequiredFieldMissing)]
    Vault(#[from] provara_vault::VaultError),

    #[error("{code}: {0}", code = ErrorCode::E300RequiredFieldMissing)]
    Canon(#[from] provara_core::CanonError),

    #[error("{code}: sidecar database error: {0}", code = ErrorCode::E302VaultStructureInvalid)]
    Sidecar(#[from] rusqlite::Error),

    #[error("{code}: encryption failure: {0}", code = ErrorCode::E300RequiredFieldMissing)]
    Crypto(String),

    #[error("{code}: {0}", code = ErrorCode::E204KeyNotFound)]
    DekNotFound(String),
}
