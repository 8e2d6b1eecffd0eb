//! Durable publish schedule
//!
//! The schedule is a set of [`ScheduleEntry`] values persisted as a JSON
//! array. Set semantics make save/load a true round trip: duplicates
//! collapse, and entry identity is structural (minute-resolution timestamp
//! plus post). Writes go through a temp file in the same directory and an
//! atomic rename, so a crash mid-write never corrupts the schedule.

use crate::error::{Error, Result};
use crate::models::ScheduleEntry;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Persists the schedule set as JSON
#[derive(Debug, Clone)]
pub struct ScheduleStore {
    path: PathBuf,
}

impl ScheduleStore {
    /// Create a store backed by the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the schedule set
    ///
    /// A missing file yields an empty schedule (first run). A present but
    /// unreadable or malformed file is an error; the dispatcher treats it
    /// as fatal rather than silently dropping queued posts.
    pub fn load(&self) -> Result<HashSet<ScheduleEntry>> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "No schedule file, starting empty");
            return Ok(HashSet::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let entries: Vec<ScheduleEntry> = serde_json::from_str(&content).map_err(|e| {
            Error::persistence(&self.path, format!("cannot parse schedule: {e}"))
        })?;

        let loaded = entries.len();
        let set: HashSet<ScheduleEntry> = entries.into_iter().collect();
        if set.len() < loaded {
            tracing::warn!(
                duplicates = loaded - set.len(),
                "Collapsed duplicate schedule entries on load"
            );
        }
        tracing::info!(path = %self.path.display(), entries = set.len(), "Schedule loaded");
        Ok(set)
    }

    /// Persist the schedule set atomically
    ///
    /// Entries are written sorted by timestamp so the file stays readable
    /// and diffs stay stable.
    pub fn save(&self, entries: &HashSet<ScheduleEntry>) -> Result<()> {
        let mut sorted: Vec<&ScheduleEntry> = entries.iter().collect();
        sorted.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.post.media_urls.cmp(&b.post.media_urls))
        });

        let json = serde_json::to_string_pretty(&sorted)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Temp file in the same directory so the rename stays atomic
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            Error::persistence(&self.path, format!("cannot replace schedule file: {e}"))
        })?;

        tracing::debug!(path = %self.path.display(), entries = entries.len(), "Schedule saved");
        Ok(())
    }
}
