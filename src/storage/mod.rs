//! Durable pipeline state
//!
//! Two JSON-backed stores: the publish schedule ([`ScheduleStore`], a set
//! of timestamp/post pairs) and the feed cursor ([`CursorStore`]). Both
//! write through a same-directory temp file and an atomic rename. The
//! fingerprint database lives in [`crate::dedup::store`], not here.

pub mod cursor;
pub mod schedule;

pub use cursor::{CursorStore, FeedCursor};
pub use schedule::ScheduleStore;
