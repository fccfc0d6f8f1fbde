//! One export run, start to finish.
//!
//! Order: load watermark -> load mirror state -> login -> sync -> select
//! notes -> export -> (reset) -> commit token + state -> advance watermark.
//! Nothing is persisted before the export has been written, so a failed run
//! leaves the previous state, token and watermark untouched.

use crate::config::{AuthConfig, EmailEntry, Paths, RunConfig, Vars};
use crate::crypto::{Encryptor, RawSecretBytes};
use crate::error::{CryptoError, Error, Result};
use crate::export::{ExportPaths, ExportReport, ExportWriter};
use crate::remote::{Note, NoteService};
use crate::secrets::{KeyringSecretStore, SecretBackend, AUTH_SERVICE};
use crate::session::{PasswordPrompt, PasswordSource, SessionManager};
use crate::watermark::{IncrementalFilter, SyncWatermark};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::info;
use zeroize::Zeroizing;

/// Per-invocation options from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Export this note only, bypassing the filter
    pub note_id: Option<String>,
    /// Clear the note's body after export (needs `note_id`)
    pub reset: bool,
    /// Also write timestamped copies of the exports
    pub preserve_history: bool,
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub export: ExportReport,
    pub reset_note: Option<String>,
    pub watermark: DateTime<Utc>,
}

/// Account email and where its password comes from.
#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: PasswordSource,
}

impl Credentials {
    /// Resolve from `auth.toml` and `vars.toml`.
    ///
    /// Password precedence: encrypted blob, plaintext in vars, keyring entry
    /// saved by `keepsync-auth` (keyring backend only), interactive prompt.
    pub fn resolve(
        paths: &Paths,
        vars: &Vars,
        backend: &SecretBackend,
        prompt: Option<PasswordPrompt>,
    ) -> Result<Self> {
        let auth = AuthConfig::load_optional(&paths.auth())?;

        let email = match auth.as_ref().map(|a| &a.email) {
            Some(EmailEntry::Plain(email)) => email.clone(),
            Some(EmailEntry::Encrypted(r)) => {
                let key_file = auth
                    .as_ref()
                    .and_then(|a| a.key_file.as_deref())
                    .ok_or_else(|| Error::config(paths.auth(), "missing key_file"))?;
                decrypt_string(&r.encrypted, key_file)?.to_string()
            }
            None => vars
                .email
                .clone()
                .ok_or_else(|| Error::config(paths.vars(), "no email configured"))?,
        };

        let encrypted_password = auth
            .as_ref()
            .and_then(|a| Some((a.password.as_ref()?, a.key_file.as_ref()?)));

        let password = if let Some((blob, key_file)) = encrypted_password {
            PasswordSource::Encrypted {
                blob: blob.encrypted.clone(),
                key_file: key_file.clone(),
            }
        } else if let Some(password) = &vars.password {
            PasswordSource::Plain(Zeroizing::new(password.clone()))
        } else if backend.is_keyring() {
            PasswordSource::Stored(Box::new(KeyringSecretStore::new(AUTH_SERVICE)))
        } else if let Some(prompt) = prompt {
            PasswordSource::Interactive(prompt)
        } else {
            PasswordSource::Unavailable
        };

        Ok(Self { email, password })
    }
}

fn decrypt_string(blob: &Path, key_file: &Path) -> std::result::Result<Zeroizing<String>, CryptoError> {
    let key = RawSecretBytes::read_key_file(key_file)?;
    Encryptor::new(&key).decrypt_file_to_string(blob)
}

/// Execute one run against an already constructed session.
pub fn run<S: NoteService>(
    session: &mut SessionManager<S>,
    paths: &Paths,
    vars: &Vars,
    credentials: &Credentials,
    options: &RunOptions,
    now: DateTime<Utc>,
) -> Result<RunSummary> {
    let run_config = RunConfig::load_or_default(&paths.run_config())?;
    let filter = IncrementalFilter::from_run_config(&run_config, now);
    let watermark = filter.watermark();
    info!(
        "Watermark: last run {}, epoch floor {}",
        watermark.last_run.to_rfc3339(),
        watermark.epoch_floor.to_rfc3339()
    );

    session.load_local_state()?;
    session.login(&credentials.email, &credentials.password)?;
    info!("Login successful");

    session.service_mut().sync()?;

    let notes: Vec<Note> = match &options.note_id {
        Some(id) => vec![session
            .service()
            .get(id)?
            .ok_or_else(|| Error::NoteNotFound(id.clone()))?],
        None => session.service().find(&|note: &Note| filter.includes(note)),
    };
    info!("Selected {} notes", notes.len());

    let export_paths = ExportPaths {
        json: vars.keep_notes_json.clone(),
        csv: vars.keep_notes_csv.clone(),
    };
    let export = ExportWriter::dump(&notes, &export_paths, options.preserve_history, now)?;

    let reset_note = match (&options.note_id, options.reset) {
        (Some(id), true) => {
            session.service_mut().set_text(id, "")?;
            session.service_mut().sync()?;
            info!("Reset note {}", id);
            Some(id.clone())
        }
        _ => None,
    };

    info!("Run completed - caching state");
    session.commit()?;
    SyncWatermark::persist(&paths.run_config(), now)?;

    Ok(RunSummary {
        export,
        reset_note,
        watermark: now,
    })
}
