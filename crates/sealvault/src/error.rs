//! Errors raised by the store and the vaults
//!
//! Only structural problems end up here. Expected outcomes such as a
//! missing secret or a wrong key are reported through [`crate::Outcome`].

use std::path::PathBuf;
use thiserror::Error;

/// Vault-specific errors
#[derive(Error, Debug)]
pub enum SecretsError {
    #[error("Invalid secret name \"{0}\": only \"word\" characters are allowed")]
    InvalidName(String),

    #[error("Parameter {0} cannot be empty")]
    InvalidInput(&'static str),

    #[error("Unable to create the secrets directory ({})", .0.display())]
    StorageUnavailable(PathBuf),

    #[error("Corrupt secrets file {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("A sealing backend is required to deal with secrets, but none is available in this build")]
    CryptoUnavailable,

    #[error("Encryption key not found in \"{}\"", .0.display())]
    EncryptionKeyMissing(PathBuf),

    #[error("Invalid key material: {0}")]
    Crypto(String),

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SecretsError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SecretsError>;
