//! Key derivation from a passphrase.
//!
//! PBKDF2-HMAC-SHA256 is the default profile. Argon2id is available for
//! setups that can afford its memory cost. Either way the output is a 32-byte
//! key for AES-256.

use crate::error::CryptoError;
use argon2::{Argon2, Params};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use std::fmt;
use std::path::Path;
use zeroize::Zeroizing;

/// Salt length (bytes)
pub const SALT_LEN: usize = 16;

/// Key length (bytes) - 256 bits for AES-256
pub const KEY_LEN: usize = 32;

/// Default PBKDF2 rounds
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;

/// Lowest accepted PBKDF2 round count
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;

/// Argon2id defaults
/// - Memory: 64 MiB
/// - Iterations: 3
/// - Parallelism: 4
const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 4;

/// Derivation profile, recorded in every blob header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfParams {
    Pbkdf2 {
        iterations: u32,
    },
    Argon2id {
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    },
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::Pbkdf2 {
            iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

impl KdfParams {
    pub fn argon2id() -> Self {
        Self::Argon2id {
            memory_kib: ARGON2_MEMORY_KIB,
            iterations: ARGON2_ITERATIONS,
            parallelism: ARGON2_PARALLELISM,
        }
    }

    /// Encode as `id || p1 || p2 || p3` (little endian).
    pub(crate) fn encode(&self) -> [u8; 13] {
        let (id, p1, p2, p3) = match *self {
            Self::Pbkdf2 { iterations } => (1u8, iterations, 0, 0),
            Self::Argon2id {
                memory_kib,
                iterations,
                parallelism,
            } => (2u8, memory_kib, iterations, parallelism),
        };
        let mut out = [0u8; 13];
        out[0] = id;
        out[1..5].copy_from_slice(&p1.to_le_bytes());
        out[5..9].copy_from_slice(&p2.to_le_bytes());
        out[9..13].copy_from_slice(&p3.to_le_bytes());
        out
    }

    pub(crate) fn decode(bytes: &[u8; 13]) -> Result<Self, CryptoError> {
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        match bytes[0] {
            1 => Ok(Self::Pbkdf2 {
                iterations: word(1),
            }),
            2 => Ok(Self::Argon2id {
                memory_kib: word(1),
                iterations: word(5),
                parallelism: word(9),
            }),
            other => Err(CryptoError::Malformed(format!("unknown KDF id {}", other))),
        }
    }
}

/// Raw key bytes. Kept apart from [`super::EncryptedBlob`] so a key can never
/// be handed to code that writes ciphertext files.
#[derive(Clone)]
pub struct RawSecretBytes(Zeroizing<[u8; KEY_LEN]>);

impl RawSecretBytes {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Read a key file written by [`RawSecretBytes::write_key_file`].
    pub fn read_key_file(path: &Path) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CryptoError::MissingFile(path.to_path_buf())
            } else {
                CryptoError::Io {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?);
        Self::from_bytes(&bytes)
    }

    /// Write the raw key to `path` (mode 0600).
    ///
    /// `protected` lists the ciphertext files this key guards; the key is
    /// refused if it would land on any of them or in the same file.
    pub fn write_key_file(&self, path: &Path, protected: &[&Path]) -> Result<(), CryptoError> {
        for blob in protected {
            if same_file(path, blob) {
                return Err(CryptoError::CoLocatedKey(path.to_path_buf()));
            }
        }
        crate::fs::write_atomic(path, self.as_bytes(), true).map_err(|e| CryptoError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

impl fmt::Debug for RawSecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawSecretBytes(<redacted>)")
    }
}

impl PartialEq for RawSecretBytes {
    fn eq(&self, other: &Self) -> bool {
        self.0[..] == other.0[..]
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// A key together with the parameters that produced it.
#[derive(Debug, Clone)]
pub struct DerivedKey {
    pub key: RawSecretBytes,
    pub salt: [u8; SALT_LEN],
    pub params: KdfParams,
}

/// Derive a 32-byte key from `passphrase` and `salt`.
///
/// Deterministic for identical inputs.
pub fn derive_key(
    passphrase: &str,
    salt: &[u8; SALT_LEN],
    params: KdfParams,
) -> Result<RawSecretBytes, CryptoError> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);

    match params {
        KdfParams::Pbkdf2 { iterations } => {
            if iterations < MIN_PBKDF2_ITERATIONS {
                return Err(CryptoError::KeyDerivation(format!(
                    "PBKDF2 needs at least {} iterations, got {}",
                    MIN_PBKDF2_ITERATIONS, iterations
                )));
            }
            pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut *key);
        }
        KdfParams::Argon2id {
            memory_kib,
            iterations,
            parallelism,
        } => {
            let params = Params::new(memory_kib, iterations, parallelism, Some(KEY_LEN))
                .map_err(|e| CryptoError::KeyDerivation(format!("Invalid Argon2 parameters: {}", e)))?;
            let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
            argon2
                .hash_password_into(passphrase.as_bytes(), salt, &mut *key)
                .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        }
    }

    Ok(RawSecretBytes(key))
}

/// Generate random salt for key derivation
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a key with a fresh salt (credential setup).
pub fn derive_key_new(passphrase: &str, params: KdfParams) -> Result<DerivedKey, CryptoError> {
    let salt = generate_salt();
    let key = derive_key(passphrase, &salt, params)?;
    Ok(DerivedKey { key, salt, params })
}
