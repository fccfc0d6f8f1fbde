//! HTTP adapter for a JSON note API.
//!
//! Assumed endpoints, relative to `api_base`:
//! - `POST /auth/login`   `{email, password}` -> `{token}`
//! - `POST /auth/resume`  `{email, token}` -> 2xx when the token is valid
//! - `GET  /notes/changes?since=<cursor>` -> `{notes: [..], cursor}`
//! - `PATCH /notes/{id}`  `{text}`
//!
//! The mirror keeps every note object seen so far plus the change cursor.

use super::{Note, NoteService};
use crate::error::{Error, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Mirror {
    #[serde(default)]
    notes: BTreeMap<String, Value>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Deserialize)]
struct ChangesResponse {
    #[serde(default)]
    notes: Vec<Value>,
    cursor: Option<String>,
}

pub struct HttpNoteService {
    client: Client,
    api_base: String,
    token: Option<String>,
    mirror: Mirror,
    pending: BTreeMap<String, String>,
}

impl HttpNoteService {
    pub fn new(api_base: &str) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token: None,
            mirror: Mirror::default(),
            pending: BTreeMap::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| Error::Remote("Not logged in".to_string()))?;
        Ok(request
            .header("Authorization", format!("Bearer {}", token))
            .header("User-Agent", "keepsync"))
    }
}

fn check(response: reqwest::Result<Response>, what: &str) -> Result<Response> {
    let response = response.map_err(|e| Error::Remote(format!("{}: {}", what, e)))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(Error::Remote(format!("{}: HTTP {} {}", what, status, body)));
    }
    Ok(response)
}

impl NoteService for HttpNoteService {
    fn login(&mut self, email: &str, password: &str, _state: Option<&Value>) -> Result<String> {
        let response = check(
            self.client
                .post(self.url("/auth/login"))
                .header("User-Agent", "keepsync")
                .json(&serde_json::json!({ "email": email, "password": password }))
                .send(),
            "Login",
        )?;
        let body: LoginResponse = response
            .json()
            .map_err(|e| Error::Remote(format!("Login response: {}", e)))?;
        self.token = Some(body.token.clone());
        Ok(body.token)
    }

    fn resume(&mut self, email: &str, token: &str, _state: Option<&Value>) -> Result<()> {
        check(
            self.client
                .post(self.url("/auth/resume"))
                .header("User-Agent", "keepsync")
                .json(&serde_json::json!({ "email": email, "token": token }))
                .send(),
            "Resume",
        )?;
        self.token = Some(token.to_string());
        Ok(())
    }

    fn dump(&self) -> Result<Value> {
        serde_json::to_value(&self.mirror).map_err(|e| Error::Remote(e.to_string()))
    }

    fn restore(&mut self, state: &Value) -> Result<()> {
        self.mirror = serde_json::from_value(state.clone())
            .map_err(|e| Error::Remote(format!("Cannot restore mirror state: {}", e)))?;
        Ok(())
    }

    fn find(&self, predicate: &dyn Fn(&Note) -> bool) -> Vec<Note> {
        self.mirror
            .notes
            .values()
            .filter_map(super::project_or_skip)
            .filter(|n| predicate(n))
            .collect()
    }

    fn get(&self, id: &str) -> Result<Option<Note>> {
        self.mirror
            .notes
            .get(id)
            .map(|raw| Note::from_value(raw.clone()))
            .transpose()
    }

    fn set_text(&mut self, id: &str, text: &str) -> Result<()> {
        let raw = self
            .mirror
            .notes
            .get_mut(id)
            .ok_or_else(|| Error::NoteNotFound(id.to_string()))?;
        raw["text"] = Value::String(text.to_string());
        self.pending.insert(id.to_string(), text.to_string());
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        for (id, text) in &self.pending {
            let request = self
                .client
                .patch(self.url(&format!("/notes/{}", id)))
                .json(&serde_json::json!({ "text": text }));
            check(self.authorized(request)?.send(), "Push note")?;
        }
        self.pending.clear();

        let mut request = self.client.get(self.url("/notes/changes"));
        if let Some(cursor) = &self.mirror.cursor {
            request = request.query(&[("since", cursor)]);
        }
        let changes: ChangesResponse = check(self.authorized(request)?.send(), "Fetch changes")?
            .json()
            .map_err(|e| Error::Remote(format!("Changes response: {}", e)))?;

        debug!("Pulled {} changed notes", changes.notes.len());
        for note in changes.notes {
            if let Some(id) = note.get("id").and_then(Value::as_str).map(str::to_string) {
                self.mirror.notes.insert(id, note);
            }
        }
        if changes.cursor.is_some() {
            self.mirror.cursor = changes.cursor;
        }
        Ok(())
    }
}
