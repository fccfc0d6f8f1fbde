//! File fallback backend.
//!
//! One TOML table per service, each mapping `account = "secret"`. The file
//! is readable only by the owner and replaced atomically on every write.

use super::{Lookup, SecretStore};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

type Tables = BTreeMap<String, BTreeMap<String, String>>;

pub struct FileSecretStore {
    path: PathBuf,
    service: String,
}

impl FileSecretStore {
    pub fn new(path: PathBuf, service: impl Into<String>) -> Self {
        Self {
            path,
            service: service.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Tables> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::Store(format!("Cannot read {}: {}", self.path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Store(format!("Cannot parse {}: {}", self.path.display(), e)))
    }
}

fn wipe(tables: &mut Tables) {
    for secret in tables.values_mut().flat_map(|t| t.values_mut()) {
        secret.zeroize();
    }
}

impl SecretStore for FileSecretStore {
    fn backend(&self) -> &'static str {
        "file"
    }

    fn get(&self, account: &str) -> Result<Lookup> {
        let mut tables = self.load()?;
        let found = tables
            .get_mut(&self.service)
            .and_then(|table| table.remove(account));
        wipe(&mut tables);
        Ok(found.map(Lookup::found).unwrap_or(Lookup::Absent))
    }

    fn set(&mut self, account: &str, secret: &str) -> Result<()> {
        let mut tables = self.load()?;
        tables
            .entry(self.service.clone())
            .or_default()
            .insert(account.to_string(), secret.to_string());

        let mut content = toml::to_string(&tables)
            .map_err(|e| Error::Store(format!("Cannot serialize secrets: {}", e)))?;
        let written = crate::fs::write_atomic(&self.path, content.as_bytes(), true);
        content.zeroize();
        wipe(&mut tables);

        written.map_err(|e| Error::Store(format!("Cannot write {}: {}", self.path.display(), e)))
    }
}
