//! Source feed boundary
//!
//! The pipeline pulls new posts through the [`SourceFeed`] trait and never
//! depends on any concrete site. A feed returns raw [`FeedItem`]s above the
//! cursor; [`group_siblings`] then merges child posts that share a parent
//! into single multi-media posts before filtering and scheduling.
//!
//! [`JsonFeed`] is the shipped implementation: it reads pending items from
//! a JSON drop file, which keeps the binary usable end to end and gives the
//! integration tests a real feed to drive.

use crate::error::{Error, Result};
use crate::models::{merge_siblings, Post};
use crate::storage::FeedCursor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A raw item as delivered by a source feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Feed-assigned post id, strictly increasing over time
    pub id: i64,

    /// Parent post id when this item is a child of a multi-part upload
    #[serde(default)]
    pub parent_id: Option<i64>,

    /// The post payload
    pub post: Post,
}

impl FeedItem {
    /// Grouping key: the parent id for children, the own id otherwise
    pub fn family(&self) -> i64 {
        self.parent_id.unwrap_or(self.id)
    }
}

/// One pull's worth of feed items plus the advanced cursor
#[derive(Debug, Clone)]
pub struct FeedBatch {
    /// Items newer than the requested cursor, oldest first
    pub items: Vec<FeedItem>,

    /// Cursor to persist once the batch is processed
    pub cursor: FeedCursor,
}

impl FeedBatch {
    /// An empty batch that leaves the cursor where it was
    pub fn empty(cursor: FeedCursor) -> Self {
        Self {
            items: Vec::new(),
            cursor,
        }
    }
}

/// Capability to pull new posts from a content source
#[async_trait]
pub trait SourceFeed: Send + Sync {
    /// Fetch posts newer than the cursor
    ///
    /// Implementations return items oldest first and an advanced cursor.
    /// Errors here are per-pull: the dispatcher logs and retries at the
    /// next trigger instead of aborting.
    async fn fetch_new_posts(&self, cursor: &FeedCursor) -> Result<FeedBatch>;
}

/// Merge items that share a parent into single multi-media posts
///
/// Groups keep the arrival order of their first member; within a group the
/// merge follows [`merge_siblings`]. Merged posts with no media left are
/// dropped.
pub fn group_siblings(items: Vec<FeedItem>) -> Vec<Post> {
    let mut order: Vec<i64> = Vec::new();
    let mut groups: std::collections::HashMap<i64, Vec<Post>> = std::collections::HashMap::new();

    for item in items {
        let family = item.family();
        let group = groups.entry(family).or_default();
        if group.is_empty() {
            order.push(family);
        }
        group.push(item.post);
    }

    order
        .into_iter()
        .filter_map(|family| {
            let siblings = groups.remove(&family)?;
            merge_siblings(&siblings)
        })
        .filter(Post::has_media)
        .collect()
}

// ============================================================================
// JSON drop-file feed
// ============================================================================

/// Feed reading pending items from a local JSON file
///
/// The file holds a JSON array of [`FeedItem`]s. Each pull returns items
/// whose id is above the cursor, oldest first; the file itself is left
/// untouched, the cursor is what prevents reprocessing.
#[derive(Debug, Clone)]
pub struct JsonFeed {
    path: PathBuf,
}

impl JsonFeed {
    /// Create a feed backed by the given drop file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SourceFeed for JsonFeed {
    async fn fetch_new_posts(&self, cursor: &FeedCursor) -> Result<FeedBatch> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No feed drop file");
            return Ok(FeedBatch::empty(*cursor));
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        let mut items: Vec<FeedItem> = serde_json::from_str(&content)
            .map_err(|e| Error::persistence(&self.path, format!("cannot parse feed file: {e}")))?;

        items.retain(|item| item.id > cursor.last_post_id);
        items.sort_by_key(|item| item.id);

        let mut advanced = *cursor;
        for item in &items {
            advanced.advance(item.id);
        }

        tracing::info!(
            items = items.len(),
            last_post_id = advanced.last_post_id,
            "Feed pull complete"
        );
        Ok(FeedBatch {
            items,
            cursor: advanced,
        })
    }
}
