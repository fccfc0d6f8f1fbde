//! Config module - keepsync configuration files.
//!
//! All files live in one config directory (default `~/.config/keepsync/`):
//! - `vars.toml`: account email, export destinations, API base
//! - `auth.toml`: credential references written by `keepsync-auth`
//! - `config.toml`: run config holding the watermark
//! - `keep_state.json`: local mirror state
//! - `tokens.toml`: file-fallback secret store

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default API base for the remote note service.
pub const DEFAULT_API_BASE: &str = "https://notes.example.com/api";

/// Locations of every file keepsync reads or writes.
#[derive(Debug, Clone)]
pub struct Paths {
    pub config_dir: PathBuf,
}

/// Get default config directory (~/.config/keepsync/).
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("keepsync"))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Paths {
    pub fn new(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    pub fn vars(&self) -> PathBuf {
        self.config_dir.join("vars.toml")
    }

    pub fn auth(&self) -> PathBuf {
        self.config_dir.join("auth.toml")
    }

    pub fn run_config(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn mirror_state(&self) -> PathBuf {
        self.config_dir.join("keep_state.json")
    }

    pub fn token_store(&self) -> PathBuf {
        self.config_dir.join("tokens.toml")
    }

    /// Default key location, in its own subdirectory away from the blobs.
    pub fn key_file(&self) -> PathBuf {
        self.config_dir.join("keys").join("keepsync.key")
    }

    pub fn email_blob(&self) -> PathBuf {
        self.config_dir.join("secrets").join("email.enc")
    }

    pub fn password_blob(&self) -> PathBuf {
        self.config_dir.join("secrets").join("password.enc")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new(default_config_dir())
    }
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::config(path, format!("cannot read file: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::config(path, format!("cannot parse: {}", e)))
}

fn write_toml<T: Serialize>(path: &Path, value: &T, private: bool) -> Result<()> {
    let content =
        toml::to_string_pretty(value).map_err(|e| Error::config(path, format!("cannot serialize: {}", e)))?;
    crate::fs::write_atomic(path, content.as_bytes(), private).map_err(|e| Error::StateIo {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Account and destination settings (`vars.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vars {
    /// Account email (may instead come from `auth.toml`)
    #[serde(default)]
    pub email: Option<String>,

    /// Plaintext password, legacy non-encrypted mode only
    #[serde(default)]
    pub password: Option<String>,

    pub keep_notes_json: PathBuf,
    pub keep_notes_csv: PathBuf,

    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

impl Vars {
    /// Load vars; a missing file is a config error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::config(path, "cannot find vars file"));
        }
        read_toml(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_toml(path, self, true)
    }
}

/// Reference to an encrypted blob file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedRef {
    pub encrypted: PathBuf,
}

/// Email entry: plain string or encrypted blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmailEntry {
    Plain(String),
    Encrypted(EncryptedRef),
}

/// Credential references (`auth.toml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub email: EmailEntry,

    /// Encrypted password blob (encryption mode)
    #[serde(default)]
    pub password: Option<EncryptedRef>,

    /// Raw key file for the blobs
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

impl AuthConfig {
    /// Load `auth.toml` if it exists.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let auth: Self = read_toml(path)?;
        auth.validate(path)?;
        Ok(Some(auth))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate(path)?;
        write_toml(path, self, true)
    }

    /// Blob paths this config points at.
    pub fn blob_paths(&self) -> Vec<&Path> {
        let mut paths = Vec::new();
        if let EmailEntry::Encrypted(r) = &self.email {
            paths.push(r.encrypted.as_path());
        }
        if let Some(r) = &self.password {
            paths.push(r.encrypted.as_path());
        }
        paths
    }

    pub fn is_encrypted(&self) -> bool {
        !self.blob_paths().is_empty()
    }

    /// Encrypted entries need a key file, and the key must not be one of the blobs.
    fn validate(&self, path: &Path) -> Result<()> {
        if !self.is_encrypted() {
            return Ok(());
        }
        let key_file = self
            .key_file
            .as_deref()
            .ok_or_else(|| Error::config(path, "encrypted entries require key_file"))?;
        if self.blob_paths().iter().any(|blob| *blob == key_file) {
            return Err(crate::error::CryptoError::CoLocatedKey(key_file.to_path_buf()).into());
        }
        Ok(())
    }
}

/// Run config (`config.toml`). Holds the watermark between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Start time of the last completed run
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,

    /// Notes created before this are never exported
    #[serde(default)]
    pub epoch_floor: Option<DateTime<Utc>>,

    /// Freshness window for the incremental filter
    #[serde(default)]
    pub freshness_window_secs: Option<u64>,
}

impl RunConfig {
    /// Load run config; missing file means first run.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        read_toml(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_toml(path, self, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_vars_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vars.toml");

        match Vars::load(&path) {
            Err(Error::Config { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_vars_defaults() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vars.toml");
        std::fs::write(
            &path,
            "email = \"me@example.com\"\nkeep_notes_json = \"notes.json\"\nkeep_notes_csv = \"notes.csv\"\n",
        )
        .unwrap();

        let vars = Vars::load(&path)?;
        assert_eq!(vars.email.as_deref(), Some("me@example.com"));
        assert!(vars.password.is_none());
        assert_eq!(vars.api_base, DEFAULT_API_BASE);
        Ok(())
    }

    #[test]
    fn test_auth_email_forms() -> Result<()> {
        let plain: AuthConfig = toml::from_str("email = \"me@example.com\"").unwrap();
        assert_eq!(plain.email, EmailEntry::Plain("me@example.com".to_string()));
        assert!(!plain.is_encrypted());

        let encrypted: AuthConfig = toml::from_str(
            "email = { encrypted = \"/s/email.enc\" }\npassword = { encrypted = \"/s/password.enc\" }\nkey_file = \"/k/keepsync.key\"",
        )
        .unwrap();
        assert!(encrypted.is_encrypted());
        assert_eq!(encrypted.blob_paths().len(), 2);
        Ok(())
    }

    #[test]
    fn test_auth_rejects_key_on_blob_path() {
        let auth = AuthConfig {
            email: EmailEntry::Plain("me@example.com".to_string()),
            password: Some(EncryptedRef {
                encrypted: PathBuf::from("/s/password.enc"),
            }),
            key_file: Some(PathBuf::from("/s/password.enc")),
        };
        let temp = TempDir::new().unwrap();

        let err = auth.save(&temp.path().join("auth.toml")).unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_auth_requires_key_file_when_encrypted() {
        let auth = AuthConfig {
            email: EmailEntry::Plain("me@example.com".to_string()),
            password: Some(EncryptedRef {
                encrypted: PathBuf::from("/s/password.enc"),
            }),
            key_file: None,
        };
        let temp = TempDir::new().unwrap();

        let err = auth.save(&temp.path().join("auth.toml")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_run_config_roundtrip() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        assert_eq!(RunConfig::load_or_default(&path)?, RunConfig::default());

        let config = RunConfig {
            last_run: Some("2024-03-01T12:00:00Z".parse().unwrap()),
            epoch_floor: None,
            freshness_window_secs: Some(7200),
        };
        config.save(&path)?;
        assert_eq!(RunConfig::load_or_default(&path)?, config);
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_auth_save_permissions() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("auth.toml");

        AuthConfig {
            email: EmailEntry::Plain("me@example.com".to_string()),
            password: None,
            key_file: None,
        }
        .save(&path)?;

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600, "auth file should have 0600 permissions");
        Ok(())
    }
}
