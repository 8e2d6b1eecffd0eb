//! artcast - Scheduled artwork reposting pipeline
//!
//! Periodically pulls newly published tagged artwork posts from a source
//! feed, filters them through a tag blacklist and a perceptual-hash
//! deduplication index, assigns each survivor a randomized publish time
//! inside a bounded window (preserving feed order), and dispatches due
//! entries to an outbound channel. All pipeline state survives restarts.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration from environment variables and JSON files
//! - [`models`] - Core data structures (posts, schedule entries)
//! - [`fetcher`] - Rate-limited HTTP transport with bounded retry
//! - [`filter`] - Tag blacklist with per-rule exceptions
//! - [`dedup`] - Perceptual-hash duplicate detection over media
//! - [`scheduler`] - Pull triggers and randomized publish-time assignment
//! - [`storage`] - Durable schedule and feed-cursor state
//! - [`feed`] - Source feed boundary (`SourceFeed` trait)
//! - [`publish`] - Outbound channel boundary (`ChannelPublisher` trait)
//! - [`dispatcher`] - The control loop tying everything together
//!
//! # Example
//!
//! ```no_run
//! use artcast::config::Config;
//! use artcast::storage::ScheduleStore;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let schedule = ScheduleStore::new(config.paths.schedule_file()).load()?;
//!     println!("{} posts pending", schedule.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod feed;
pub mod fetcher;
pub mod filter;
pub mod models;
pub mod publish;
pub mod scheduler;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, ScheduleConfig};
    pub use crate::dedup::{DedupIndex, Fingerprint, HashStore};
    pub use crate::dispatcher::Dispatcher;
    pub use crate::error::{Error, Result};
    pub use crate::feed::{FeedBatch, FeedItem, JsonFeed, SourceFeed};
    pub use crate::fetcher::Fetcher;
    pub use crate::filter::{BlacklistFilter, BlacklistRule};
    pub use crate::models::{Post, ScheduleEntry};
    pub use crate::publish::{ChannelPublisher, DryRunPublisher};
    pub use crate::scheduler::{PostScheduler, UpdateScheduler};
    pub use crate::storage::{CursorStore, FeedCursor, ScheduleStore};
}
