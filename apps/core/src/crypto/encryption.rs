//! AES-256-GCM encryption of short credential secrets.
//!
//! Blob file layout:
//!
//! ```text
//! KSYNCV01 (8) | kdf params (13) | salt (16) | nonce (12) | ciphertext + tag (16)
//! ```
//!
//! The nonce is random per encryption. Everything after the magic header is
//! bound to the ciphertext as associated data, so flipping any byte of the
//! header, salt, nonce or ciphertext fails authentication.

use super::key_derivation::{DerivedKey, KdfParams, RawSecretBytes, SALT_LEN};
use crate::error::CryptoError;
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use std::path::Path;
use zeroize::Zeroizing;

/// Nonce length (bytes) - 96 bits
pub const NONCE_LEN: usize = 12;

/// Authentication tag length (bytes) - 128 bits
pub const TAG_LEN: usize = 16;

const MAGIC_HEADER: &[u8; 8] = b"KSYNCV01";
const PARAMS_LEN: usize = 13;

/// Offset where associated data starts (after magic) and where the nonce ends.
const AAD_START: usize = MAGIC_HEADER.len();
const NONCE_END: usize = AAD_START + PARAMS_LEN + SALT_LEN + NONCE_LEN;

/// An encrypted secret plus everything needed to decrypt it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub params: KdfParams,
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl EncryptedBlob {
    /// Serialize to the on-disk layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_END + self.ciphertext.len());
        out.extend_from_slice(MAGIC_HEADER);
        out.extend_from_slice(&self.header_tail());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < NONCE_END + TAG_LEN {
            return Err(CryptoError::Malformed("blob too short".to_string()));
        }
        if &bytes[..AAD_START] != MAGIC_HEADER {
            return Err(CryptoError::Malformed("wrong magic header".to_string()));
        }

        let mut params = [0u8; PARAMS_LEN];
        params.copy_from_slice(&bytes[AAD_START..AAD_START + PARAMS_LEN]);
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[AAD_START + PARAMS_LEN..AAD_START + PARAMS_LEN + SALT_LEN]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[NONCE_END - NONCE_LEN..NONCE_END]);

        Ok(Self {
            params: KdfParams::decode(&params)?,
            salt,
            nonce,
            ciphertext: bytes[NONCE_END..].to_vec(),
        })
    }

    /// Read a blob file.
    pub fn read_file(path: &Path) -> Result<Self, CryptoError> {
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CryptoError::MissingFile(path.to_path_buf())
            } else {
                CryptoError::Io {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;
        Self::from_bytes(&bytes)
    }

    /// Write a blob file (mode 0600).
    pub fn write_file(&self, path: &Path) -> Result<(), CryptoError> {
        crate::fs::write_atomic(path, &self.to_bytes(), true).map_err(|e| CryptoError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// params || salt || nonce, used as associated data.
    fn header_tail(&self) -> Vec<u8> {
        let mut aad = Vec::with_capacity(PARAMS_LEN + SALT_LEN + NONCE_LEN);
        aad.extend_from_slice(&self.params.encode());
        aad.extend_from_slice(&self.salt);
        aad.extend_from_slice(&self.nonce);
        aad
    }
}

/// Encrypts and decrypts credentials with a derived key.
pub struct Encryptor {
    cipher: Aes256Gcm,
}

impl Encryptor {
    pub fn new(key: &RawSecretBytes) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes())),
        }
    }

    /// Encrypt with a fresh random nonce. The derivation parameters of `key`
    /// are recorded in the blob.
    pub fn encrypt(key: &DerivedKey, plaintext: &[u8]) -> Result<EncryptedBlob, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let mut blob = EncryptedBlob {
            params: key.params,
            salt: key.salt,
            nonce,
            ciphertext: Vec::new(),
        };
        let aad = blob.header_tail();

        blob.ciphertext = Self::new(&key.key)
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| CryptoError::Malformed("encryption failed".to_string()))?;

        Ok(blob)
    }

    /// Decrypt a blob. Wrong key or any modification yields
    /// [`CryptoError::Authentication`].
    pub fn decrypt(&self, blob: &EncryptedBlob) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let aad = blob.header_tail();
        self.cipher
            .decrypt(
                Nonce::from_slice(&blob.nonce),
                Payload {
                    msg: &blob.ciphertext,
                    aad: &aad,
                },
            )
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::Authentication)
    }

    /// Decrypt a blob file into a UTF-8 string.
    pub fn decrypt_file_to_string(&self, path: &Path) -> Result<Zeroizing<String>, CryptoError> {
        let blob = EncryptedBlob::read_file(path)?;
        let plaintext = self.decrypt(&blob)?;
        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| CryptoError::Malformed(format!("{} is not UTF-8", path.display())))?;
        Ok(Zeroizing::new(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_derivation::{derive_key, derive_key_new, MIN_PBKDF2_ITERATIONS};
    use tempfile::TempDir;

    fn test_key() -> DerivedKey {
        let key: Vec<u8> = (0u8..32).collect();
        DerivedKey {
            key: RawSecretBytes::from_bytes(&key).unwrap(),
            salt: [9u8; SALT_LEN],
            params: KdfParams::default(),
        }
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() -> Result<(), CryptoError> {
        let key = test_key();
        let plaintext = b"hunter2-app-password";

        let blob = Encryptor::encrypt(&key, plaintext)?;
        let decrypted = Encryptor::new(&key.key).decrypt(&blob)?;

        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
        Ok(())
    }

    #[test]
    fn test_roundtrip_from_passphrase() -> Result<(), CryptoError> {
        let params = KdfParams::Pbkdf2 {
            iterations: MIN_PBKDF2_ITERATIONS,
        };
        let derived = derive_key_new("correct horse", params)?;
        let blob = Encryptor::encrypt(&derived, b"me@example.com")?;

        // The header carries everything needed to re-derive the key.
        let key = derive_key("correct horse", &blob.salt, blob.params)?;
        let plain = Encryptor::new(&key).decrypt(&blob)?;
        assert_eq!(plain.as_slice(), b"me@example.com");

        let wrong_key = derive_key("wrong horse", &blob.salt, blob.params)?;
        let wrong = Encryptor::new(&wrong_key).decrypt(&blob);
        assert!(matches!(wrong, Err(CryptoError::Authentication)));
        Ok(())
    }

    #[test]
    fn test_encrypted_size() -> Result<(), CryptoError> {
        let blob = Encryptor::encrypt(&test_key(), b"test")?;

        assert_eq!(blob.ciphertext.len(), 4 + TAG_LEN);
        assert_eq!(blob.to_bytes().len(), NONCE_END + 4 + TAG_LEN);
        Ok(())
    }

    #[test]
    fn test_different_nonce_each_time() -> Result<(), CryptoError> {
        let key = test_key();

        let first = Encryptor::encrypt(&key, b"same message")?;
        let second = Encryptor::encrypt(&key, b"same message")?;

        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.ciphertext, second.ciphertext);
        Ok(())
    }

    #[test]
    fn test_wrong_key_fails() -> Result<(), CryptoError> {
        let blob = Encryptor::encrypt(&test_key(), b"secret message")?;
        let other = RawSecretBytes::from_bytes(&[1u8; 32])?;

        let result = Encryptor::new(&other).decrypt(&blob);
        assert!(matches!(result, Err(CryptoError::Authentication)));
        Ok(())
    }

    #[test]
    fn test_any_flipped_byte_fails() -> Result<(), CryptoError> {
        let key = test_key();
        let encryptor = Encryptor::new(&key.key);
        let bytes = Encryptor::encrypt(&key, b"secret message")?.to_bytes();

        for i in 0..bytes.len() {
            let mut tampered = bytes.clone();
            tampered[i] ^= 0x01;
            let outcome = EncryptedBlob::from_bytes(&tampered).and_then(|b| encryptor.decrypt(&b));
            assert!(outcome.is_err(), "flip at byte {} went undetected", i);
        }
        Ok(())
    }

    #[test]
    fn test_truncated_blob_is_malformed() {
        let result = EncryptedBlob::from_bytes(b"KSYNCV01short");
        assert!(matches!(result, Err(CryptoError::Malformed(_))));
    }

    #[test]
    fn test_file_roundtrip_and_missing_file() -> Result<(), CryptoError> {
        let temp = TempDir::new().map_err(|e| CryptoError::Io {
            path: std::env::temp_dir(),
            source: e,
        })?;
        let path = temp.path().join("email.enc");
        let key = test_key();

        Encryptor::encrypt(&key, "me@example.com".as_bytes())?.write_file(&path)?;
        let text = Encryptor::new(&key.key).decrypt_file_to_string(&path)?;
        assert_eq!(text.as_str(), "me@example.com");

        let missing = Encryptor::new(&key.key).decrypt_file_to_string(&temp.path().join("gone.enc"));
        assert!(matches!(missing, Err(CryptoError::MissingFile(_))));
        Ok(())
    }
}
