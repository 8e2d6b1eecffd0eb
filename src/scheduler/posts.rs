//! Randomized publish-time assignment
//!
//! New posts get random timestamps inside a publish window, sorted so the
//! feed's arrival order is preserved while the gaps between publications
//! stay irregular. The window never crosses midnight: whatever the time
//! budget says, scheduling stops at 23:59 of the current day.

use crate::models::{Post, ScheduleEntry};
use chrono::{Duration, NaiveDateTime, NaiveTime};
use rand::Rng;

/// Assigns publish timestamps to freshly pulled posts
#[derive(Debug, Clone, Copy, Default)]
pub struct PostScheduler;

impl PostScheduler {
    /// Create a scheduler
    pub fn new() -> Self {
        Self
    }

    /// Clamp a time budget to the remainder of the current day
    ///
    /// Returns the smaller of the budget and the span until 23:59 today,
    /// never negative.
    pub fn publish_window(&self, budget: Duration, now: NaiveDateTime) -> Duration {
        let end_of_day = match NaiveTime::from_hms_opt(23, 59, 0) {
            Some(t) => now.date().and_time(t),
            None => now,
        };
        let until_midnight = (end_of_day - now).max(Duration::zero());
        budget.min(until_midnight).max(Duration::zero())
    }

    /// Draw `count` random offsets inside the window and sort them
    ///
    /// Offsets are whole seconds uniformly drawn from `[0, window]`.
    /// Sorting is what preserves arrival order once the timestamps are
    /// paired back with the posts.
    pub fn assign_timestamps(
        &self,
        count: usize,
        window: Duration,
        now: NaiveDateTime,
    ) -> Vec<NaiveDateTime> {
        let max_offset = window.num_seconds().max(0);
        let mut rng = rand::thread_rng();

        let mut offsets: Vec<i64> = (0..count)
            .map(|_| rng.gen_range(0..=max_offset))
            .collect();
        offsets.sort_unstable();

        offsets
            .into_iter()
            .map(|secs| now + Duration::seconds(secs))
            .collect()
    }

    /// Pair posts with sorted random timestamps inside the window
    ///
    /// The i-th post (in arrival order) receives the i-th smallest
    /// timestamp, so posts publish in the order they arrived. Entry
    /// construction truncates timestamps to minute resolution, so an
    /// entry can read up to 59 seconds before the drawn offset (and
    /// before `now`); it becomes due at most one tick sooner, never
    /// later than `now + window`.
    pub fn schedule_posts(
        &self,
        posts: Vec<Post>,
        budget: Duration,
        now: NaiveDateTime,
    ) -> Vec<ScheduleEntry> {
        let window = self.publish_window(budget, now);
        let timestamps = self.assign_timestamps(posts.len(), window, now);

        posts
            .into_iter()
            .zip(timestamps)
            .map(|(post, at)| ScheduleEntry::new(at, post))
            .collect()
    }
}
