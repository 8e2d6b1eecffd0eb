//! Core data structures for the reposting pipeline
//!
//! This module defines the immutable [`Post`] value, the [`ScheduleEntry`]
//! pair stored in the durable schedule, caption formatting for the outbound
//! channel, and the sibling-post merge used when a source feed delivers
//! several child posts of one parent artwork.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Hard cap on media items per post (outbound channel limitation)
pub const MAX_MEDIA_PER_POST: usize = 10;

/// Timestamp format used in the persisted schedule (minute resolution)
pub const SCHEDULE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Characters that must be escaped in MarkdownV2 captions
const MD_SPECIAL_CHARS: &[char] = &['_', ')', '(', '-', '.', '=', '!'];

// ============================================================================
// Post
// ============================================================================

/// An immutable artwork post
///
/// Identity is structural: two posts with the same media URLs, author,
/// source and tags are the same post. The schedule store relies on this
/// for set-based deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Post {
    /// Ordered media URLs (1 to [`MAX_MEDIA_PER_POST`] items)
    pub media_urls: Vec<String>,

    /// Artist name, if the feed knows it
    pub author_name: Option<String>,

    /// Link to the original artwork page
    pub source_link: Option<String>,

    /// Tag set; membership only, order irrelevant
    pub tags: BTreeSet<String>,
}

impl Post {
    /// Create a new post
    pub fn new(
        media_urls: Vec<String>,
        author_name: Option<String>,
        source_link: Option<String>,
        tags: BTreeSet<String>,
    ) -> Self {
        Self {
            media_urls,
            author_name,
            source_link,
            tags,
        }
    }

    /// Copy of this post with a different media URL list
    ///
    /// Used by duplicate filtering, which narrows the media list while
    /// keeping author, source and tags unchanged.
    pub fn with_media(&self, media_urls: Vec<String>) -> Self {
        Self {
            media_urls,
            author_name: self.author_name.clone(),
            source_link: self.source_link.clone(),
            tags: self.tags.clone(),
        }
    }

    /// Check whether the post still carries any media
    pub fn has_media(&self) -> bool {
        !self.media_urls.is_empty()
    }

    /// Format the channel caption: artist line plus source line,
    /// escaped for MarkdownV2
    pub fn form_caption(&self) -> String {
        let artist = match &self.author_name {
            Some(name) => format!("Artist: {}", escape_markdown(name)),
            None => "Artist unknown".to_string(),
        };
        let source = match &self.source_link {
            Some(link) => format!("[Source]({link})"),
            None => "Source unknown".to_string(),
        };
        format!("{artist}\n{source}")
    }
}

impl fmt::Display for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}: {:?}]",
            self.author_name.as_deref().unwrap_or("?"),
            self.media_urls
        )
    }
}

/// Escape MarkdownV2 special characters in caption text
fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if MD_SPECIAL_CHARS.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

// ============================================================================
// Sibling merge
// ============================================================================

/// Merge sibling posts (children of one feed parent) into a single
/// multi-media post
///
/// The first [`MAX_MEDIA_PER_POST`] siblings contribute their first media
/// URL each, in order. Author and source come from the first sibling. The
/// merged tag set is the intersection across all kept siblings: a tag must
/// apply to every sibling to apply to the merged post.
///
/// Returns `None` for an empty sibling list.
pub fn merge_siblings(siblings: &[Post]) -> Option<Post> {
    let kept = &siblings[..siblings.len().min(MAX_MEDIA_PER_POST)];
    let first = kept.first()?;

    let media_urls: Vec<String> = kept
        .iter()
        .filter_map(|p| p.media_urls.first().cloned())
        .collect();

    let mut tags = first.tags.clone();
    for sibling in &kept[1..] {
        tags = tags.intersection(&sibling.tags).cloned().collect();
    }

    Some(Post {
        media_urls,
        author_name: first.author_name.clone(),
        source_link: first.source_link.clone(),
        tags,
    })
}

// ============================================================================
// Schedule entries
// ============================================================================

/// A `(publish timestamp, post)` pair in the durable schedule
///
/// The schedule is a set of these: identical timestamp and post collapse
/// to one entry. Timestamps are truncated to minute resolution on
/// construction so in-memory identity matches the persisted format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Local wall-clock publish time, minute resolution
    #[serde(with = "schedule_time")]
    pub timestamp: NaiveDateTime,

    /// The post to publish
    pub post: Post,
}

impl ScheduleEntry {
    /// Create an entry, truncating the timestamp to minute resolution
    pub fn new(timestamp: NaiveDateTime, post: Post) -> Self {
        Self {
            timestamp: truncate_to_minute(timestamp),
            post,
        }
    }

    /// Check whether the entry's publish time has passed
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        self.timestamp <= now
    }
}

/// Truncate a timestamp to minute resolution
pub fn truncate_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Serde adapter for the minute-resolution schedule timestamp format
mod schedule_time {
    use super::SCHEDULE_TIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&ts.format(SCHEDULE_TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, SCHEDULE_TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}
