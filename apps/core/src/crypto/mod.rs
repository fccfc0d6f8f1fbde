//! Crypto module - Protects stored credentials at rest.
//!
//! This module contains:
//! - AES-256-GCM encryption/decryption of credential blobs
//! - PBKDF2 / Argon2id key derivation from a passphrase
//! - Key file handling, kept separate from the ciphertext it protects

pub mod encryption;
pub mod key_derivation;

pub use encryption::{EncryptedBlob, Encryptor};
pub use key_derivation::{
    derive_key, derive_key_new, DerivedKey, KdfParams, RawSecretBytes, KEY_LEN, SALT_LEN,
};
