//! OS keyring backend.

use super::{Lookup, SecretStore};
use crate::error::{Error, Result};
use tracing::debug;

/// Secrets kept by the platform credential facility.
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, account: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, account)
            .map_err(|e| Error::Store(format!("Keyring entry failed: {}", e)))
    }
}

impl SecretStore for KeyringSecretStore {
    fn backend(&self) -> &'static str {
        "keyring"
    }

    fn get(&self, account: &str) -> Result<Lookup> {
        match self.entry(account)?.get_password() {
            Ok(secret) => Ok(Lookup::found(secret)),
            Err(keyring::Error::NoEntry) => {
                debug!("No keyring entry for service {}", self.service);
                Ok(Lookup::Absent)
            }
            Err(e) => Err(Error::Store(format!("Keyring read failed: {}", e))),
        }
    }

    fn set(&mut self, account: &str, secret: &str) -> Result<()> {
        self.entry(account)?
            .set_password(secret)
            .map_err(|e| Error::Store(format!("Keyring write failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyring_features() -> Vec<String> {
        let manifest = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
        let content = std::fs::read_to_string(manifest).unwrap();
        let table: toml::Table = toml::from_str(&content).unwrap();
        table["dependencies"]["keyring"]["features"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|f| f.as_str().map(str::to_string))
            .collect()
    }

    // Entries must outlive a reboot; without a native store keyring falls
    // back to its in-memory mock.
    #[test]
    fn test_persistent_store_enabled_for_each_platform() {
        let features = keyring_features();
        for required in ["apple-native", "windows-native"] {
            assert!(features.iter().any(|f| f == required), "missing {}", required);
        }
        assert!(features
            .iter()
            .any(|f| f == "linux-native-sync-persistent" || f == "sync-secret-service"));
    }

    #[test]
    fn test_backend_name() {
        assert_eq!(KeyringSecretStore::new(crate::secrets::AUTH_SERVICE).backend(), "keyring");
    }
}
