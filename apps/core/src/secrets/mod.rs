//! SecretStore - Where session tokens and passwords are kept.
//!
//! Two backends share one contract:
//! - OS keyring (`keyring` crate)
//! - Plain file fallback for systems without a usable keyring
//!
//! The backend is chosen once at startup via [`SecretBackend`].

pub mod file;
pub mod os_keyring;

pub use self::file::FileSecretStore;
pub use self::os_keyring::KeyringSecretStore;

use crate::error::Result;
use std::fmt;
use std::path::PathBuf;
use zeroize::Zeroizing;

/// Keyring/file service name for cached session tokens.
pub const TOKEN_SERVICE: &str = "keepsync-token";

/// Keyring service name for the account password saved by `keepsync-auth`.
pub const AUTH_SERVICE: &str = "keepsync-auth";

/// Result of a secret lookup. `Absent` is the normal first-run signal.
pub enum Lookup {
    Found(Zeroizing<String>),
    Absent,
}

impl Lookup {
    pub fn found(secret: impl Into<String>) -> Self {
        Self::Found(Zeroizing::new(secret.into()))
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn into_option(self) -> Option<Zeroizing<String>> {
        match self {
            Self::Found(secret) => Some(secret),
            Self::Absent => None,
        }
    }
}

impl fmt::Debug for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found(_) => f.write_str("Found(<redacted>)"),
            Self::Absent => f.write_str("Absent"),
        }
    }
}

/// Trait for all secret backends.
pub trait SecretStore {
    /// Backend name for log lines (keyring, file)
    fn backend(&self) -> &'static str;

    /// Look up the secret for `account`.
    fn get(&self, account: &str) -> Result<Lookup>;

    /// Store `secret` for `account`, replacing any previous entry.
    fn set(&mut self, account: &str, secret: &str) -> Result<()>;
}

/// Which backend to construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretBackend {
    /// OS keyring
    Keyring,
    /// Owner-only file at the given path
    File(PathBuf),
}

impl SecretBackend {
    /// Build the store for `service`.
    pub fn open(&self, service: &str) -> Box<dyn SecretStore> {
        match self {
            Self::Keyring => Box::new(KeyringSecretStore::new(service)),
            Self::File(path) => Box::new(FileSecretStore::new(path.clone(), service)),
        }
    }

    pub fn is_keyring(&self) -> bool {
        matches!(self, Self::Keyring)
    }
}
