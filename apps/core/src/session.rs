//! Session manager - Login/resume against the note service and the local
//! mirror state.
//!
//! Flow: resume with a cached token if one exists; on any resume failure fall
//! back to a full login. A token obtained by full login is only persisted by
//! [`SessionManager::commit`], which runs after the export succeeded.

use crate::crypto::{Encryptor, RawSecretBytes};
use crate::error::{Error, Result};
use crate::remote::NoteService;
use crate::secrets::{Lookup, SecretStore};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Outcome of a token resume. Failure is an expected branch, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    Resumed,
    Failed(String),
}

/// Prompt callback: receives the account email, returns the password.
pub type PasswordPrompt = Box<dyn Fn(&str) -> Result<String>>;

/// Where the password for a full login comes from.
pub enum PasswordSource {
    /// Encrypted blob plus the key file that opens it
    Encrypted { blob: PathBuf, key_file: PathBuf },
    /// Plaintext from `vars.toml` (legacy)
    Plain(Zeroizing<String>),
    /// Password saved by `keepsync-auth` in a secret store
    Stored(Box<dyn SecretStore>),
    /// Ask the operator
    Interactive(PasswordPrompt),
    /// Nothing configured; full login is impossible
    Unavailable,
}

impl PasswordSource {
    pub fn resolve(&self, email: &str) -> Result<Zeroizing<String>> {
        match self {
            Self::Encrypted { blob, key_file } => {
                let key = RawSecretBytes::read_key_file(key_file)?;
                Ok(Encryptor::new(&key).decrypt_file_to_string(blob)?)
            }
            Self::Plain(password) => Ok(password.clone()),
            Self::Stored(store) => store
                .get(email)?
                .into_option()
                .ok_or_else(|| Error::PasswordUnavailable(email.to_string())),
            Self::Interactive(prompt) => {
                let password = Zeroizing::new(prompt(email)?);
                if password.is_empty() {
                    return Err(Error::PasswordUnavailable(email.to_string()));
                }
                Ok(password)
            }
            Self::Unavailable => Err(Error::PasswordUnavailable(email.to_string())),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Encrypted { .. } => "encrypted",
            Self::Plain(_) => "plaintext",
            Self::Stored(_) => "secret store",
            Self::Interactive(_) => "prompt",
            Self::Unavailable => "none",
        }
    }
}

impl fmt::Debug for PasswordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PasswordSource({})", self.kind())
    }
}

/// Owns the remote session and the local mirror state for one run.
pub struct SessionManager<S: NoteService> {
    service: S,
    tokens: Box<dyn SecretStore>,
    state_path: PathBuf,
    state: Option<Value>,
    email: Option<String>,
    pending_token: Option<Zeroizing<String>>,
}

impl<S: NoteService> SessionManager<S> {
    pub fn new(service: S, tokens: Box<dyn SecretStore>, state_path: PathBuf) -> Self {
        Self {
            service,
            tokens,
            state_path,
            state: None,
            email: None,
            pending_token: None,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    pub fn is_active(&self) -> bool {
        self.email.is_some()
    }

    /// Load the mirror state into the service. No-op on first run.
    pub fn load_local_state(&mut self) -> Result<bool> {
        if !self.state_path.exists() {
            debug!("No local state at {}", self.state_path.display());
            return Ok(false);
        }
        let content = std::fs::read(&self.state_path)
            .map_err(|e| Error::config(&self.state_path, format!("cannot read state: {}", e)))?;
        let state: Value = serde_json::from_slice(&content)
            .map_err(|e| Error::config(&self.state_path, format!("corrupted state: {}", e)))?;
        self.service.restore(&state)?;
        self.state = Some(state);
        info!("Restored local state from {}", self.state_path.display());
        Ok(true)
    }

    /// Try the cached token for `email`.
    pub fn resume_session(&mut self, email: &str) -> ResumeOutcome {
        let token = match self.tokens.get(email) {
            Ok(Lookup::Found(token)) => token,
            Ok(Lookup::Absent) => {
                return ResumeOutcome::Failed("no cached token".to_string());
            }
            Err(e) => {
                warn!("Cannot read cached token ({}): {}", self.tokens.backend(), e);
                return ResumeOutcome::Failed(e.to_string());
            }
        };

        info!("Restoring session");
        match self.service.resume(email, &token, self.state.as_ref()) {
            Ok(()) => ResumeOutcome::Resumed,
            Err(e) => {
                warn!("Failed to restore session: {}", e);
                ResumeOutcome::Failed(e.to_string())
            }
        }
    }

    /// Resume, or fall back to a full login with a password from `password`.
    pub fn login(&mut self, email: &str, password: &PasswordSource) -> Result<()> {
        match self.resume_session(email) {
            ResumeOutcome::Resumed => {
                info!("Session restored");
            }
            ResumeOutcome::Failed(reason) => {
                debug!("Resume failed ({}), using full login", reason);
                info!("Creating new session (password from {})", password.kind());
                let secret = password.resolve(email)?;
                let token = self
                    .service
                    .login(email, &secret, self.state.as_ref())
                    .map_err(|e| Error::RemoteLogin(e.to_string()))?;
                self.pending_token = Some(Zeroizing::new(token));
            }
        }
        self.email = Some(email.to_string());
        Ok(())
    }

    /// Whether a new token is waiting for [`SessionManager::commit`].
    pub fn has_pending_token(&self) -> bool {
        self.pending_token.is_some()
    }

    /// Write the service's mirror state (temp file + rename).
    pub fn store_local_state(&mut self) -> Result<()> {
        let state = self.service.dump()?;
        let bytes = serde_json::to_vec(&state)
            .map_err(|e| Error::Remote(format!("Cannot serialize state: {}", e)))?;
        crate::fs::write_atomic(&self.state_path, &bytes, true).map_err(|e| Error::StateIo {
            path: self.state_path.clone(),
            source: e,
        })?;
        self.state = Some(state);
        info!("Cached local state to {}", self.state_path.display());
        Ok(())
    }

    /// End of a successful run: persist a newly issued token, then the state.
    pub fn commit(&mut self) -> Result<()> {
        if let (Some(email), Some(token)) = (&self.email, &self.pending_token) {
            self.tokens.set(email, token)?;
            info!("Saved session token ({})", self.tokens.backend());
        }
        self.pending_token = None;
        self.store_local_state()
    }
}
