//! Remote note service boundary.
//!
//! This module contains:
//! - `Note`, the export-facing projection of a remote note
//! - `NoteService` trait consumed by the session manager
//! - HTTP adapter, plus an in-memory implementation behind `test-support`

pub mod http;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use http::HttpNoteService;
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryNoteService;

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

/// A remote note. `raw` keeps the service's object shape for the JSON export;
/// the other fields are read from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub created: DateTime<Utc>,
    pub archived: bool,
    /// Label names in source order
    pub labels: Vec<String>,
    pub text: String,
    pub raw: Value,
}

impl Note {
    /// Project a remote note object.
    ///
    /// Expected shape: `id`, `title`, `text`, `timestamps.created` (RFC 3339),
    /// `isArchived`, and `labels` as names or `{ "name": .. }` objects.
    pub fn from_value(raw: Value) -> Result<Self> {
        let id = raw
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Remote("Note without id".to_string()))?
            .to_string();

        let created_str = raw
            .pointer("/timestamps/created")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Remote(format!("Note {} has no created timestamp", id)))?;
        let created = DateTime::parse_from_rfc3339(created_str)
            .map_err(|e| Error::Remote(format!("Note {} has bad created timestamp: {}", id, e)))?
            .with_timezone(&Utc);

        let labels = raw
            .get("labels")
            .and_then(Value::as_array)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|l| {
                        l.as_str()
                            .or_else(|| l.get("name").and_then(Value::as_str))
                            .map(str::to_string)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            title: str_field(&raw, "title"),
            text: str_field(&raw, "text"),
            archived: raw.get("isArchived").and_then(Value::as_bool).unwrap_or(false),
            id,
            created,
            labels,
            raw,
        })
    }

    /// Raw object with `text` injected, as written to the JSON export.
    pub fn to_export_value(&self) -> Value {
        let mut value = self.raw.clone();
        if let Value::Object(map) = &mut value {
            map.insert("text".to_string(), Value::String(self.text.clone()));
        }
        value
    }

    /// Replace the body text locally (raw shape included).
    pub fn set_text(&mut self, text: &str) {
        self.text = text.to_string();
        if let Value::Object(map) = &mut self.raw {
            map.insert("text".to_string(), Value::String(text.to_string()));
        }
    }
}

/// Project a mirrored object for a bulk scan. Objects that do not parse are
/// logged and skipped.
pub(crate) fn project_or_skip(raw: &Value) -> Option<Note> {
    match Note::from_value(raw.clone()) {
        Ok(note) => Some(note),
        Err(e) => {
            let id = raw.get("id").and_then(Value::as_str).unwrap_or("<no id>");
            warn!("Skipping mirrored note {}: {}", id, e);
            None
        }
    }
}

fn str_field(raw: &Value, key: &str) -> String {
    raw.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Contract of the remote note service.
///
/// `login` and `resume` receive the previously restored mirror state, if any.
pub trait NoteService {
    /// Full login. Returns a session token that can be used with `resume`.
    fn login(&mut self, email: &str, password: &str, state: Option<&Value>) -> Result<String>;

    /// Re-establish a session from a cached token.
    fn resume(&mut self, email: &str, token: &str, state: Option<&Value>) -> Result<()>;

    /// Snapshot of the local mirror.
    fn dump(&self) -> Result<Value>;

    /// Load a snapshot produced by `dump`.
    fn restore(&mut self, state: &Value) -> Result<()>;

    /// All mirrored notes matching `predicate`.
    fn find(&self, predicate: &dyn Fn(&Note) -> bool) -> Vec<Note>;

    /// One note by id. A mirrored object that does not parse is an error,
    /// not a miss.
    fn get(&self, id: &str) -> Result<Option<Note>>;

    /// Queue a body change, pushed on the next `sync`.
    fn set_text(&mut self, id: &str, text: &str) -> Result<()>;

    /// Push queued changes and pull remote ones into the mirror.
    fn sync(&mut self) -> Result<()>;
}
