//! keepsync Core Library
//!
//! Periodic export of notes from a remote note service into local JSON/CSV
//! archives. Provides the following capabilities:
//! - Encrypt stored credentials with a key kept apart from the ciphertext
//! - Keep session tokens in the OS keyring or a fallback file
//! - Resume sessions from cached tokens, falling back to a full login
//! - Select notes created since the last run (watermark + freshness window)
//! - Write JSON/CSV exports, optionally keeping timestamped history
//!
//! Pipeline: Login (resume/fallback) -> Load mirror -> Sync -> Filter -> Export -> Persist

pub mod config;
pub mod crypto;
pub mod error;
pub mod export;
pub mod fs;
pub mod pipeline;
pub mod remote;
pub mod secrets;
pub mod session;
pub mod watermark;

// Re-export main types
pub use config::{AuthConfig, Paths, RunConfig, Vars};
pub use error::{CryptoError, Error, Result};
pub use export::{ExportPaths, ExportWriter};
pub use pipeline::{Credentials, RunOptions, RunSummary};
pub use remote::{HttpNoteService, Note, NoteService};
pub use secrets::{Lookup, SecretBackend, SecretStore};
pub use session::{PasswordSource, ResumeOutcome, SessionManager};
pub use watermark::{IncrementalFilter, SyncWatermark};
