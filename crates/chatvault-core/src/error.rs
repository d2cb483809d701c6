use thiserror::Error;

use crate::types::PayloadKind;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    /// No text codec is reachable. The bundled base64 engine never produces
    /// this; it exists for callers that match on the full taxonomy.
    #[error("no base64 codec available")]
    EncodingUnavailable,

    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Unknown or missing envelope version. Raised before any AEAD call.
    #[error("Unsupported encrypted {kind} payload")]
    UnsupportedPayload { kind: PayloadKind },

    /// AEAD authentication failed: wrong key, wrong context, or corrupted
    /// data. Deliberately does not say which layer failed.
    #[error("decryption failed")]
    DecryptionFailed,

    #[error("key store unavailable: {0}")]
    StoreUnavailable(String),

    /// A master key record exists but cannot be parsed or imported.
    #[error("stored master key record is unreadable: {reason}")]
    UnreadableKeyRecord { reason: String },

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKey { expected: usize, actual: usize },

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VaultError {
    pub fn unsupported(kind: PayloadKind) -> Self {
        Self::UnsupportedPayload { kind }
    }
}
