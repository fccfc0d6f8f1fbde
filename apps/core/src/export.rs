//! Export writer - Notes to JSON and CSV.
//!
//! Canonical files are replaced on every run. With history preservation a
//! timestamped copy of each file is also written; history files are created
//! exclusively and never overwritten.

use crate::error::{Error, Result};
use crate::remote::Note;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// CSV header, in column order.
pub const CSV_HEADER: [&str; 5] = ["id", "title", "created", "labels", "text"];

/// Canonical export destinations.
#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
}

/// Files written by one export.
#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub notes: usize,
    pub canonical: Vec<PathBuf>,
    pub history: Vec<PathBuf>,
}

fn export_err(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::ExportIo {
        path: path.to_path_buf(),
        source,
    }
}

/// JSON array of raw note objects with `text` injected.
pub fn render_json(notes: &[Note]) -> Result<Vec<u8>> {
    let values: Vec<_> = notes.iter().map(Note::to_export_value).collect();
    serde_json::to_vec_pretty(&values).map_err(|e| Error::ExportIo {
        path: PathBuf::from("<json>"),
        source: e.into(),
    })
}

/// CSV with a fixed header; labels joined in source order.
pub fn render_csv(notes: &[Note]) -> Result<Vec<u8>> {
    let to_err = |e: csv::Error| Error::ExportIo {
        path: PathBuf::from("<csv>"),
        source: std::io::Error::other(e.to_string()),
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER).map_err(to_err)?;
    for note in notes {
        let created = note.created.to_rfc3339_opts(SecondsFormat::Millis, true);
        let labels = note.labels.join(", ");
        writer
            .write_record([
                note.id.as_str(),
                note.title.as_str(),
                created.as_str(),
                labels.as_str(),
                note.text.as_str(),
            ])
            .map_err(to_err)?;
    }
    writer.into_inner().map_err(|e| Error::ExportIo {
        path: PathBuf::from("<csv>"),
        source: std::io::Error::other(e.to_string()),
    })
}

/// `notes.json` -> `notes-20240601T080000.000Z.json`; `-N` is appended until
/// the name is unused.
fn history_path(path: &Path, now: DateTime<Utc>, attempt: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "notes".to_string());
    let stamp = now.format("%Y%m%dT%H%M%S%.3fZ");
    let mut name = if attempt == 0 {
        format!("{}-{}", stem, stamp)
    } else {
        format!("{}-{}-{}", stem, stamp, attempt)
    };
    if let Some(ext) = path.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    path.with_file_name(name)
}

fn write_history(path: &Path, data: &[u8], now: DateTime<Utc>) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(export_err(path))?;
    }
    let mut attempt = 0;
    loop {
        let candidate = history_path(path, now, attempt);
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(mut file) => {
                file.write_all(data).map_err(export_err(&candidate))?;
                file.sync_all().map_err(export_err(&candidate))?;
                return Ok(candidate);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(export_err(&candidate)(e)),
        }
    }
}

pub struct ExportWriter;

impl ExportWriter {
    /// Write `notes` to the canonical JSON and CSV files, plus timestamped
    /// copies when `preserve_history` is set.
    pub fn dump(
        notes: &[Note],
        paths: &ExportPaths,
        preserve_history: bool,
        now: DateTime<Utc>,
    ) -> Result<ExportReport> {
        let json = render_json(notes)?;
        let csv = render_csv(notes)?;
        let mut report = ExportReport {
            notes: notes.len(),
            ..ExportReport::default()
        };

        for (path, data) in [(&paths.json, &json), (&paths.csv, &csv)] {
            crate::fs::write_atomic(path, data, false).map_err(export_err(path))?;
            report.canonical.push(path.clone());

            if preserve_history {
                report.history.push(write_history(path, data, now)?);
            }
        }

        info!(
            "Exported {} notes to {}",
            report.notes,
            paths.csv.display()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn note(id: &str, text: &str, labels: &[&str]) -> Note {
        Note::from_value(json!({
            "id": id,
            "title": format!("Title {}", id),
            "text": text,
            "timestamps": { "created": "2024-06-01T08:10:00Z" },
            "labels": labels,
            "color": "DEFAULT"
        }))
        .unwrap()
    }

    fn paths(dir: &Path) -> ExportPaths {
        ExportPaths {
            json: dir.join("notes.json"),
            csv: dir.join("notes.csv"),
        }
    }

    #[test]
    fn test_csv_columns_and_quoting() -> Result<()> {
        let notes = vec![note("n1", "line one\nline \"two\"", &["work", "ideas"])];

        let csv = String::from_utf8(render_csv(&notes)?).unwrap();
        let mut lines = csv.lines();

        assert_eq!(lines.next(), Some("id,title,created,labels,text"));
        assert!(csv.contains("\"work, ideas\""));
        assert!(csv.contains("\"line one\nline \"\"two\"\"\""));
        assert!(csv.contains("2024-06-01T08:10:00.000Z"));
        Ok(())
    }

    #[test]
    fn test_json_keeps_raw_shape() -> Result<()> {
        let notes = vec![note("n1", "body", &[])];

        let value: serde_json::Value = serde_json::from_slice(&render_json(&notes)?).unwrap();
        assert_eq!(value[0]["id"], "n1");
        assert_eq!(value[0]["text"], "body");
        assert_eq!(value[0]["color"], "DEFAULT");
        Ok(())
    }

    #[test]
    fn test_dump_overwrites_canonical() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let paths = paths(temp.path());

        ExportWriter::dump(&[note("a", "", &[])], &paths, false, Utc::now())?;
        let report = ExportWriter::dump(&[note("b", "", &[])], &paths, false, Utc::now())?;

        assert!(report.history.is_empty());
        let json = std::fs::read_to_string(&paths.json).unwrap();
        assert!(json.contains("\"b\""));
        assert!(!json.contains("\"a\""));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 2);
        Ok(())
    }

    #[test]
    fn test_history_twice_yields_two_files_per_format() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let paths = paths(temp.path());
        let now: DateTime<Utc> = "2024-06-01T08:00:00Z".parse().unwrap();

        let first = ExportWriter::dump(&[note("a", "1", &[])], &paths, true, now)?;
        let second = ExportWriter::dump(&[note("a", "2", &[])], &paths, true, now)?;

        assert_eq!(first.history.len(), 2);
        assert_eq!(second.history.len(), 2);
        for (a, b) in first.history.iter().zip(&second.history) {
            assert_ne!(a, b);
        }
        // 2 canonical + 4 history files
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 6);
        let old = std::fs::read_to_string(&first.history[0]).unwrap();
        assert!(old.contains("\"1\""));
        Ok(())
    }

    #[test]
    fn test_history_name() {
        let now: DateTime<Utc> = "2024-06-01T08:00:00Z".parse().unwrap();
        let path = history_path(Path::new("/out/notes.csv"), now, 0);
        assert_eq!(path, PathBuf::from("/out/notes-20240601T080000.000Z.csv"));
        let retry = history_path(Path::new("/out/notes.csv"), now, 2);
        assert_eq!(retry, PathBuf::from("/out/notes-20240601T080000.000Z-2.csv"));
    }

    #[test]
    fn test_unwritable_destination_is_export_error() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let paths = ExportPaths {
            json: blocker.join("notes.json"),
            csv: blocker.join("notes.csv"),
        };

        let err = ExportWriter::dump(&[], &paths, false, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::ExportIo { .. }));
    }
}
