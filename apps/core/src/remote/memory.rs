//! In-memory note service.
//!
//! Holds a scripted account (email, password, valid tokens) and a note set.
//! Used by tests to drive the session and pipeline without a network.

use super::{Note, NoteService};
use crate::error::{Error, Result};
use serde_json::{json, Value};
use std::collections::BTreeSet;

#[derive(Debug, Default)]
pub struct MemoryNoteService {
    email: String,
    password: String,
    tokens: BTreeSet<String>,
    /// Notes held by the "server"
    remote: Vec<Value>,
    /// Local mirror, filled by `restore` or `sync`
    mirror: Vec<Value>,
    pending: Vec<(String, String)>,
    authenticated: bool,
    fail_sync: bool,
    pub login_calls: usize,
    pub resume_calls: usize,
    pub sync_calls: usize,
    /// Bodies pushed by `sync`, in order
    pub pushed: Vec<(String, String)>,
}

impl MemoryNoteService {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
            ..Self::default()
        }
    }

    /// Accept `token` on resume.
    pub fn with_token(mut self, token: &str) -> Self {
        self.tokens.insert(token.to_string());
        self
    }

    /// Add a note on the server side.
    pub fn with_note(mut self, note: Value) -> Self {
        self.remote.push(note);
        self
    }

    /// Make every `sync` fail.
    pub fn failing_sync(mut self) -> Self {
        self.fail_sync = true;
        self
    }

    fn notes(&self) -> impl Iterator<Item = Note> + '_ {
        self.mirror
            .iter()
            .filter_map(super::project_or_skip)
    }
}

impl NoteService for MemoryNoteService {
    fn login(&mut self, email: &str, password: &str, _state: Option<&Value>) -> Result<String> {
        self.login_calls += 1;
        if email != self.email || password != self.password {
            return Err(Error::Remote("BadAuthentication".to_string()));
        }
        let token = format!("token-{}", self.login_calls);
        self.tokens.insert(token.clone());
        self.authenticated = true;
        Ok(token)
    }

    fn resume(&mut self, email: &str, token: &str, _state: Option<&Value>) -> Result<()> {
        self.resume_calls += 1;
        if email != self.email || !self.tokens.contains(token) {
            return Err(Error::Remote("token expired".to_string()));
        }
        self.authenticated = true;
        Ok(())
    }

    fn dump(&self) -> Result<Value> {
        Ok(json!({ "notes": self.mirror }))
    }

    fn restore(&mut self, state: &Value) -> Result<()> {
        self.mirror = state
            .get("notes")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| Error::Remote("State has no notes".to_string()))?;
        Ok(())
    }

    fn find(&self, predicate: &dyn Fn(&Note) -> bool) -> Vec<Note> {
        self.notes().filter(|n| predicate(n)).collect()
    }

    fn get(&self, id: &str) -> Result<Option<Note>> {
        self.mirror
            .iter()
            .find(|raw| raw.get("id").and_then(Value::as_str) == Some(id))
            .map(|raw| Note::from_value(raw.clone()))
            .transpose()
    }

    fn set_text(&mut self, id: &str, text: &str) -> Result<()> {
        let raw = self
            .mirror
            .iter_mut()
            .find(|raw| raw.get("id").and_then(Value::as_str) == Some(id))
            .ok_or_else(|| Error::NoteNotFound(id.to_string()))?;
        raw["text"] = Value::String(text.to_string());
        self.pending.push((id.to_string(), text.to_string()));
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.sync_calls += 1;
        if !self.authenticated {
            return Err(Error::Remote("Not logged in".to_string()));
        }
        if self.fail_sync {
            return Err(Error::Remote("sync failed".to_string()));
        }
        for (id, text) in self.pending.drain(..) {
            if let Some(raw) = self
                .remote
                .iter_mut()
                .find(|raw| raw.get("id").and_then(Value::as_str) == Some(id.as_str()))
            {
                raw["text"] = Value::String(text.clone());
            }
            self.pushed.push((id, text));
        }
        self.mirror = self.remote.clone();
        Ok(())
    }
}
