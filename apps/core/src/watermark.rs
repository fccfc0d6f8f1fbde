//! Sync watermark and the incremental note filter.
//!
//! The watermark is read once at the start of a run and written once after
//! the run completes. The filter is a pure function of the note, the
//! watermark and the freshness window.

use crate::config::RunConfig;
use crate::error::Result;
use crate::remote::Note;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::path::Path;
use tracing::{debug, info};

/// Default freshness window (1 hour).
pub const DEFAULT_FRESHNESS_WINDOW_SECS: u64 = 60 * 60;

/// Notes created before 2022-10-22 predate the tool and are never exported.
pub fn default_epoch_floor() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(2022, 10, 22)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Boundary between already-processed and new notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWatermark {
    pub last_run: DateTime<Utc>,
    pub epoch_floor: DateTime<Utc>,
}

impl SyncWatermark {
    /// Watermark for a run starting at `now`. On the first run `last_run` is
    /// `now`.
    pub fn from_run_config(config: &RunConfig, now: DateTime<Utc>) -> Self {
        Self {
            last_run: config.last_run.unwrap_or(now),
            epoch_floor: config.epoch_floor.unwrap_or_else(default_epoch_floor),
        }
    }

    /// Record a completed run that started at `run_started`. Other run-config
    /// fields are preserved.
    pub fn persist(path: &Path, run_started: DateTime<Utc>) -> Result<()> {
        let mut config = RunConfig::load_or_default(path)?;
        config.last_run = Some(run_started);
        config.save(path)?;
        info!("Watermark advanced to {}", run_started.to_rfc3339());
        Ok(())
    }
}

/// Why a note was kept or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Include,
    BeforeEpoch,
    Archived,
    OutsideWindow,
}

/// Decides which notes are in scope for this run.
#[derive(Debug, Clone, Copy)]
pub struct IncrementalFilter {
    watermark: SyncWatermark,
    window: Duration,
}

impl IncrementalFilter {
    pub fn new(watermark: SyncWatermark, window: Duration) -> Self {
        Self { watermark, window }
    }

    pub fn from_run_config(config: &RunConfig, now: DateTime<Utc>) -> Self {
        let secs = config
            .freshness_window_secs
            .unwrap_or(DEFAULT_FRESHNESS_WINDOW_SECS)
            .min((i64::MAX / 1000) as u64);
        Self::new(
            SyncWatermark::from_run_config(config, now),
            Duration::seconds(secs as i64),
        )
    }

    pub fn watermark(&self) -> SyncWatermark {
        self.watermark
    }

    /// Rules, first match wins:
    /// 1. created before the epoch floor
    /// 2. archived
    /// 3. created more than `window` after `last_run`
    pub fn classify(&self, created: DateTime<Utc>, archived: bool) -> Verdict {
        if created < self.watermark.epoch_floor {
            Verdict::BeforeEpoch
        } else if archived {
            Verdict::Archived
        } else if created - self.watermark.last_run > self.window {
            Verdict::OutsideWindow
        } else {
            Verdict::Include
        }
    }

    pub fn includes(&self, note: &Note) -> bool {
        let verdict = self.classify(note.created, note.archived);
        if verdict != Verdict::Include {
            debug!("Skipping note {}: {:?}", note.id, verdict);
        }
        verdict == Verdict::Include
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn filter(last_run: &str) -> IncrementalFilter {
        IncrementalFilter::new(
            SyncWatermark {
                last_run: ts(last_run),
                epoch_floor: default_epoch_floor(),
            },
            Duration::seconds(3600),
        )
    }

    #[test]
    fn test_epoch_floor_constant() {
        assert_eq!(default_epoch_floor(), ts("2022-10-22T00:00:00Z"));
    }

    #[test]
    fn test_before_epoch_always_excluded() {
        let f = filter("2022-01-01T00:30:00Z");
        // Even inside the window and unarchived.
        assert_eq!(f.classify(ts("2022-01-01T00:40:00Z"), false), Verdict::BeforeEpoch);
        assert_eq!(f.classify(ts("2022-01-01T00:40:00Z"), true), Verdict::BeforeEpoch);
    }

    #[test]
    fn test_archived_excluded() {
        let f = filter("2024-01-01T00:00:00Z");
        assert_eq!(f.classify(ts("2024-01-01T00:10:00Z"), true), Verdict::Archived);
    }

    #[test]
    fn test_window_boundary() {
        let f = filter("2024-01-01T00:00:00Z");
        assert_eq!(f.classify(ts("2024-01-01T01:00:00Z"), false), Verdict::Include);
        assert_eq!(
            f.classify(ts("2024-01-01T01:00:01Z"), false),
            Verdict::OutsideWindow
        );
    }

    #[test]
    fn test_three_note_scenario() {
        let t0 = "2024-06-01T08:00:00Z";
        let f = filter(t0);

        let created = [
            ts("2024-06-01T08:10:00Z"),
            ts("2024-06-01T10:00:00Z"),
            ts("2022-01-01T00:00:00Z"),
        ];
        let kept: Vec<_> = created
            .iter()
            .filter(|c| f.classify(**c, false) == Verdict::Include)
            .collect();

        assert_eq!(kept, vec![&created[0]]);
    }

    #[test]
    fn test_first_run_uses_now() {
        let now = ts("2025-02-02T02:02:02Z");
        let watermark = SyncWatermark::from_run_config(&RunConfig::default(), now);
        assert_eq!(watermark.last_run, now);
        assert_eq!(watermark.epoch_floor, default_epoch_floor());
    }

    #[test]
    fn test_configured_window_and_floor() {
        let config = RunConfig {
            last_run: Some(ts("2025-01-01T00:00:00Z")),
            epoch_floor: Some(ts("2024-12-01T00:00:00Z")),
            freshness_window_secs: Some(60),
        };
        let f = IncrementalFilter::from_run_config(&config, Utc::now());

        assert_eq!(f.classify(ts("2024-11-30T00:00:00Z"), false), Verdict::BeforeEpoch);
        assert_eq!(f.classify(ts("2025-01-01T00:02:00Z"), false), Verdict::OutsideWindow);
        assert_eq!(f.classify(ts("2025-01-01T00:01:00Z"), false), Verdict::Include);
    }

    #[test]
    fn test_persist_keeps_other_fields() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        RunConfig {
            last_run: Some(ts("2025-01-01T00:00:00Z")),
            epoch_floor: None,
            freshness_window_secs: Some(120),
        }
        .save(&path)?;

        SyncWatermark::persist(&path, ts("2025-01-02T00:00:00Z"))?;

        let loaded = RunConfig::load_or_default(&path)?;
        assert_eq!(loaded.last_run, Some(ts("2025-01-02T00:00:00Z")));
        assert_eq!(loaded.freshness_window_secs, Some(120));
        Ok(())
    }
}
