//! Feed cursor persistence
//!
//! Remembers the newest post id already seen so each pull only asks the
//! feed for posts above it. The sentinel `-1` means "never pulled".

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Position in the source feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCursor {
    /// Newest post id already processed, `-1` before the first pull
    pub last_post_id: i64,
}

impl Default for FeedCursor {
    fn default() -> Self {
        Self { last_post_id: -1 }
    }
}

impl FeedCursor {
    /// Advance the cursor if the given id is newer
    pub fn advance(&mut self, post_id: i64) {
        if post_id > self.last_post_id {
            self.last_post_id = post_id;
        }
    }
}

/// Persists the feed cursor as a small JSON file
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    /// Create a store backed by the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cursor, defaulting to "never pulled" when the file is
    /// missing
    pub fn load(&self) -> Result<FeedCursor> {
        if !self.path.exists() {
            return Ok(FeedCursor::default());
        }

        let content = fs::read_to_string(&self.path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::persistence(&self.path, format!("cannot parse cursor: {e}")))
    }

    /// Persist the cursor atomically
    pub fn save(&self, cursor: &FeedCursor) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string(cursor)?)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            Error::persistence(&self.path, format!("cannot replace cursor file: {e}"))
        })?;
        Ok(())
    }
}
