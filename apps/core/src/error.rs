//! Error taxonomy for keepsync.
//!
//! Each variant maps to a stage of the run so the CLI can tell the operator
//! what to fix: a path, the credential setup, the account, or the disk.

use std::path::PathBuf;

/// Result type used across the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures from the credential vault.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Blob or key file does not exist
    #[error("Encrypted credential file not found: {0}")]
    MissingFile(PathBuf),

    /// Wrong key, or the ciphertext was modified
    #[error("Cannot decrypt credentials: wrong key or corrupted file")]
    Authentication,

    /// Header or length does not match the blob format
    #[error("Malformed encrypted blob: {0}")]
    Malformed(String),

    /// KDF rejected its parameters
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Key file holds the wrong number of bytes
    #[error("Invalid key length: expected 32 bytes, found {0}")]
    InvalidKeyLength(usize),

    /// Key would be written next to (or over) the data it protects
    #[error("Key file must not share a path with encrypted data: {0}")]
    CoLocatedKey(PathBuf),

    #[error("Cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level keepsync errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or unreadable vars/auth/run config
    #[error("Config error in {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    /// Credential decryption or key handling failed
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Full login failed after the resume fallback
    #[error("Remote login failed: {0}")]
    RemoteLogin(String),

    /// Any other remote call (fetch, sync, mutate)
    #[error("Remote service error: {0}")]
    Remote(String),

    /// Secret store backend failure (keyring unavailable, unreadable token file)
    #[error("Secret store error: {0}")]
    Store(String),

    /// No password could be obtained for a full login
    #[error("No password available for {0}; run keepsync-auth first")]
    PasswordUnavailable(String),

    /// Requested note does not exist remotely
    #[error("Note not found: {0}")]
    NoteNotFound(String),

    /// Export destination could not be written
    #[error("Cannot write export {path}: {source}")]
    ExportIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Local state (mirror state, watermark) could not be written
    #[error("Cannot write state file {path}: {source}")]
    StateIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn config(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Config {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 3,
            Self::Crypto(_) => 4,
            Self::RemoteLogin(_) | Self::PasswordUnavailable(_) => 5,
            Self::ExportIo { .. } => 6,
            _ => 1,
        }
    }
}
