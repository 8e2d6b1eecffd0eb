//! Dispatch loop
//!
//! Single-task control loop over the durable schedule. Each tick publishes
//! the entries whose time has come and, when an update trigger fires, pulls
//! the feed, filters and deduplicates the new posts, and schedules them
//! over the window until the next trigger.
//!
//! Failure policy: a failed publish is never retried in place; the post is
//! rescheduled with a fresh random timestamp in the current window.
//! Transient feed errors skip the pull until the next trigger; corrupt or
//! unwritable state files abort the loop.

use crate::dedup::DedupIndex;
use crate::error::Result;
use crate::feed::{group_siblings, SourceFeed};
use crate::filter::BlacklistFilter;
use crate::models::{Post, ScheduleEntry};
use crate::publish::ChannelPublisher;
use crate::scheduler::{PostScheduler, UpdateScheduler};
use crate::storage::{CursorStore, FeedCursor, ScheduleStore};
use chrono::{Local, NaiveDateTime};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The scheduling-and-publishing control loop
pub struct Dispatcher {
    feed: Box<dyn SourceFeed>,
    publisher: Box<dyn ChannelPublisher>,
    filter: BlacklistFilter,
    dedup: DedupIndex,
    update_scheduler: UpdateScheduler,
    post_scheduler: PostScheduler,
    schedule_store: ScheduleStore,
    cursor_store: CursorStore,

    /// In-memory schedule, mirrored to disk on every change
    schedule: HashSet<ScheduleEntry>,
    cursor: FeedCursor,

    check_interval: Duration,
    running: Arc<AtomicBool>,
}

impl Dispatcher {
    /// Assemble the loop, loading durable state
    ///
    /// # Errors
    ///
    /// Fails when the schedule or cursor file exists but cannot be parsed
    /// (fatal at startup, per the persistence policy).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        feed: Box<dyn SourceFeed>,
        publisher: Box<dyn ChannelPublisher>,
        filter: BlacklistFilter,
        dedup: DedupIndex,
        update_scheduler: UpdateScheduler,
        schedule_store: ScheduleStore,
        cursor_store: CursorStore,
        check_interval: Duration,
    ) -> Result<Self> {
        let schedule = schedule_store.load()?;
        let cursor = cursor_store.load()?;

        tracing::info!(
            pending = schedule.len(),
            last_post_id = cursor.last_post_id,
            "Dispatcher ready"
        );

        Ok(Self {
            feed,
            publisher,
            filter,
            dedup,
            update_scheduler,
            post_scheduler: PostScheduler::new(),
            schedule_store,
            cursor_store,
            schedule,
            cursor,
            check_interval,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Flag cleared by signal handlers to stop the loop cooperatively
    pub fn run_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Number of pending schedule entries
    pub fn pending(&self) -> usize {
        self.schedule.len()
    }

    /// Run until the run flag is cleared
    ///
    /// # Errors
    ///
    /// Returns the first persistence error; everything else is absorbed
    /// per the failure policy.
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(interval_secs = self.check_interval.as_secs(), "Dispatch loop started");

        while self.running.load(Ordering::Relaxed) {
            self.tick(Local::now().naive_local()).await?;
            tokio::time::sleep(self.check_interval).await;
        }

        tracing::info!("Dispatch loop stopped");
        Ok(())
    }

    /// One loop iteration at the given wall-clock time
    pub async fn tick(&mut self, now: NaiveDateTime) -> Result<()> {
        self.dispatch_due(now).await?;

        if self.update_scheduler.is_due(now) {
            tracing::info!("Update trigger fired");
            if let Err(e) = self.pull_updates(now).await {
                // Transient failure: the next trigger tries again. Corrupt
                // state or unwritable files abort the loop instead.
                if !e.is_recoverable() {
                    return Err(e);
                }
                tracing::error!(error = %e, "Feed pull failed, skipping until next trigger");
            }
        }
        Ok(())
    }

    /// Publish every due entry; reschedule the ones that fail
    async fn dispatch_due(&mut self, now: NaiveDateTime) -> Result<()> {
        let mut due: Vec<ScheduleEntry> = self
            .schedule
            .iter()
            .filter(|entry| entry.is_due(now))
            .cloned()
            .collect();
        if due.is_empty() {
            return Ok(());
        }
        due.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let mut failed: Vec<Post> = Vec::new();
        for entry in due {
            self.schedule.remove(&entry);
            match self.publisher.publish(&entry.post).await {
                Ok(()) => {
                    tracing::info!(scheduled_for = %entry.timestamp, post = %entry.post, "Published");
                }
                Err(e) => {
                    tracing::warn!(error = %e, post = %entry.post, "Publish failed, rescheduling");
                    failed.push(entry.post);
                }
            }
        }

        if !failed.is_empty() {
            let budget = self.update_scheduler.time_until_next(now);
            let rescheduled = self.post_scheduler.schedule_posts(failed, budget, now);
            for entry in rescheduled {
                self.schedule.insert(entry);
            }
        }

        self.schedule_store.save(&self.schedule)
    }

    /// Pull the feed and schedule the surviving posts
    async fn pull_updates(&mut self, now: NaiveDateTime) -> Result<()> {
        let batch = self.feed.fetch_new_posts(&self.cursor).await?;
        let new_cursor = batch.cursor;

        // Blacklist runs per item, before the merge: the merge intersects
        // tags across siblings, which would erase a blacklisted tag carried
        // by only one of them
        let mut items = batch.items;
        items.retain(|item| {
            if self.filter.is_blacklisted(&item.post) {
                tracing::info!(post = %item.post, "Blacklisted, dropped");
                false
            } else {
                true
            }
        });

        let posts = group_siblings(items);

        let mut survivors: Vec<Post> = Vec::with_capacity(posts.len());
        for post in posts {
            match self.dedup.filter_duplicates(&post).await {
                Ok(filtered) if filtered.has_media() => survivors.push(filtered),
                Ok(_) => {
                    tracing::info!(post = %post, "All media duplicated, dropped");
                }
                Err(e) => {
                    // Media unreachable or undecodable; drop from this batch
                    tracing::warn!(error = %e, post = %post, "Dedup check failed, post dropped");
                }
            }
        }

        let budget = self.update_scheduler.time_until_next(now);
        let entries = self.post_scheduler.schedule_posts(survivors, budget, now);

        let media_total: usize = entries.iter().map(|e| e.post.media_urls.len()).sum();
        tracing::info!(
            posts = entries.len(),
            media = media_total,
            window_secs = budget.num_seconds(),
            "Batch scheduled"
        );

        for entry in entries {
            self.schedule.insert(entry);
        }

        self.schedule_store.save(&self.schedule)?;
        self.cursor = new_cursor;
        self.cursor_store.save(&self.cursor)?;
        Ok(())
    }

    /// One-shot pull outside the loop (CLI `pull` command)
    pub async fn pull_once(&mut self) -> Result<usize> {
        let before = self.schedule.len();
        self.pull_updates(Local::now().naive_local()).await?;
        Ok(self.schedule.len() - before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dedup::HashStore;
    use crate::feed::{FeedBatch, FeedItem};
    use crate::fetcher::Fetcher;
    use crate::publish::DryRunPublisher;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;
    use std::sync::atomic::AtomicUsize;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn post(url: &str, tag_names: &[&str]) -> Post {
        Post::new(
            vec![url.to_string()],
            Some("artist".into()),
            None,
            tag_names.iter().map(|s| s.to_string()).collect(),
        )
    }

    /// Feed serving one fixed batch, then nothing
    struct StaticFeed {
        items: Vec<FeedItem>,
    }

    #[async_trait]
    impl SourceFeed for StaticFeed {
        async fn fetch_new_posts(&self, cursor: &FeedCursor) -> Result<FeedBatch> {
            let items: Vec<FeedItem> = self
                .items
                .iter()
                .filter(|i| i.id > cursor.last_post_id)
                .cloned()
                .collect();
            let mut advanced = *cursor;
            for item in &items {
                advanced.advance(item.id);
            }
            Ok(FeedBatch {
                items,
                cursor: advanced,
            })
        }
    }

    /// Publisher failing the first `failures` calls
    struct FlakyPublisher {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChannelPublisher for FlakyPublisher {
        async fn publish(&self, _post: &Post) -> Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(crate::error::Error::Publish(
                    crate::error::PublishError::Server("boom".into()),
                ))
            } else {
                Ok(())
            }
        }
    }

    fn dispatcher_with(
        dir: &tempfile::TempDir,
        feed: Box<dyn SourceFeed>,
        publisher: Box<dyn ChannelPublisher>,
        filter: BlacklistFilter,
        trigger: &str,
        now: NaiveDateTime,
    ) -> Dispatcher {
        let config = Config::default();
        let fetcher = Arc::new(Fetcher::new(&config.transport).unwrap());
        // No allowed formats: dedup passes every URL through untouched
        let dedup = DedupIndex::new(HashStore::in_memory().unwrap(), fetcher, Vec::new());

        Dispatcher::new(
            feed,
            publisher,
            filter,
            dedup,
            UpdateScheduler::from_strings(&[trigger.into()], now).unwrap(),
            ScheduleStore::new(dir.path().join("schedule.json")),
            CursorStore::new(dir.path().join("cursor.json")),
            Duration::from_secs(60),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_pull_schedules_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let now = at(6, 0);
        let feed = StaticFeed {
            items: vec![
                FeedItem { id: 1, parent_id: None, post: post("https://cdn.example/a.jpg", &[]) },
                FeedItem { id: 2, parent_id: None, post: post("https://cdn.example/b.jpg", &[]) },
            ],
        };
        let mut dispatcher = dispatcher_with(
            &dir,
            Box::new(feed),
            Box::new(DryRunPublisher::new()),
            BlacklistFilter::default(),
            "07:00",
            now,
        );

        // Trigger at 07:00 fires on the 07:01 tick
        dispatcher.tick(at(7, 1)).await.unwrap();
        assert_eq!(dispatcher.pending(), 2);

        // Durable state reflects the pull
        let schedule = ScheduleStore::new(dir.path().join("schedule.json")).load().unwrap();
        assert_eq!(schedule.len(), 2);
        let cursor = CursorStore::new(dir.path().join("cursor.json")).load().unwrap();
        assert_eq!(cursor.last_post_id, 2);
    }

    #[tokio::test]
    async fn test_blacklisted_posts_never_scheduled() {
        let dir = tempfile::tempdir().unwrap();
        let now = at(6, 0);
        let feed = StaticFeed {
            items: vec![
                FeedItem { id: 1, parent_id: None, post: post("https://cdn.example/a.jpg", &["shibari"]) },
                FeedItem { id: 2, parent_id: None, post: post("https://cdn.example/b.jpg", &["shibari", "yaoi"]) },
            ],
        };
        let filter = BlacklistFilter::new(vec![crate::filter::BlacklistRule::new("yaoi")]);
        let mut dispatcher = dispatcher_with(
            &dir,
            Box::new(feed),
            Box::new(DryRunPublisher::new()),
            filter,
            "07:00",
            now,
        );

        dispatcher.tick(at(7, 1)).await.unwrap();
        assert_eq!(dispatcher.pending(), 1);
        // Cursor still advances past the blacklisted post
        assert_eq!(dispatcher.cursor.last_post_id, 2);
    }

    #[tokio::test]
    async fn test_blacklisted_sibling_excluded_before_merge() {
        let dir = tempfile::tempdir().unwrap();
        let now = at(6, 0);
        // Siblings of one parent with heterogeneous tags: the merge would
        // intersect the blacklisted tag away if filtering ran after it
        let feed = StaticFeed {
            items: vec![
                FeedItem {
                    id: 1,
                    parent_id: Some(100),
                    post: post("https://cdn.example/clean.jpg", &["shibari"]),
                },
                FeedItem {
                    id: 2,
                    parent_id: Some(100),
                    post: post("https://cdn.example/blocked.jpg", &["shibari", "yaoi"]),
                },
            ],
        };
        let filter = BlacklistFilter::new(vec![crate::filter::BlacklistRule::new("yaoi")]);
        let mut dispatcher = dispatcher_with(
            &dir,
            Box::new(feed),
            Box::new(DryRunPublisher::new()),
            filter,
            "07:00",
            now,
        );

        dispatcher.tick(at(7, 1)).await.unwrap();

        assert_eq!(dispatcher.pending(), 1);
        let entry = dispatcher.schedule.iter().next().unwrap();
        assert_eq!(entry.post.media_urls, vec!["https://cdn.example/clean.jpg"]);
    }

    #[tokio::test]
    async fn test_failed_publish_rescheduled_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let now = at(6, 0);
        let feed = StaticFeed { items: Vec::new() };
        let publisher = FlakyPublisher {
            failures: 1,
            calls: AtomicUsize::new(0),
        };
        let mut dispatcher = dispatcher_with(
            &dir,
            Box::new(feed),
            Box::new(publisher),
            BlacklistFilter::default(),
            "23:00",
            now,
        );

        // Seed a due entry directly
        let entry = ScheduleEntry::new(at(5, 0), post("https://cdn.example/a.jpg", &[]));
        dispatcher.schedule.insert(entry);

        // First dispatch fails: the post stays pending with a new timestamp
        dispatcher.tick(at(6, 0)).await.unwrap();
        assert_eq!(dispatcher.pending(), 1);
        let rescheduled = dispatcher.schedule.iter().next().unwrap().clone();
        assert!(rescheduled.timestamp >= at(6, 0));

        // Once the new time passes, the retry succeeds and the entry clears
        dispatcher.tick(rescheduled.timestamp + chrono::Duration::minutes(1)).await.unwrap();
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_pull_only_once_per_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let now = at(6, 0);
        let feed = StaticFeed {
            items: vec![FeedItem { id: 1, parent_id: None, post: post("https://cdn.example/a.jpg", &[]) }],
        };
        let mut dispatcher = dispatcher_with(
            &dir,
            Box::new(feed),
            Box::new(DryRunPublisher::new()),
            BlacklistFilter::default(),
            "07:00",
            now,
        );

        dispatcher.tick(at(7, 1)).await.unwrap();
        assert_eq!(dispatcher.pending(), 1);

        // Later ticks the same day do not re-pull; the cursor would block
        // duplicates anyway, but the trigger itself stays consumed
        dispatcher.tick(at(7, 2)).await.unwrap();
        dispatcher.tick(at(12, 0)).await.unwrap();
        assert_eq!(dispatcher.pending(), 1);
    }

    /// Feed failing with a fixed error
    struct BrokenFeed {
        recoverable: bool,
    }

    #[async_trait]
    impl SourceFeed for BrokenFeed {
        async fn fetch_new_posts(&self, _cursor: &FeedCursor) -> Result<FeedBatch> {
            if self.recoverable {
                Err(crate::error::Error::Fetch(
                    crate::error::FetchError::Timeout,
                ))
            } else {
                Err(crate::error::Error::persistence(
                    "data/inbox.json",
                    "unexpected token",
                ))
            }
        }
    }

    #[tokio::test]
    async fn test_transient_pull_error_absorbed() {
        let dir = tempfile::tempdir().unwrap();
        let now = at(6, 0);
        let mut dispatcher = dispatcher_with(
            &dir,
            Box::new(BrokenFeed { recoverable: true }),
            Box::new(DryRunPublisher::new()),
            BlacklistFilter::default(),
            "07:00",
            now,
        );

        // Timeout during the pull: the tick survives, the trigger is
        // consumed and the next day retries
        dispatcher.tick(at(7, 1)).await.unwrap();
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_feed_state_aborts_tick() {
        let dir = tempfile::tempdir().unwrap();
        let now = at(6, 0);
        let mut dispatcher = dispatcher_with(
            &dir,
            Box::new(BrokenFeed { recoverable: false }),
            Box::new(DryRunPublisher::new()),
            BlacklistFilter::default(),
            "07:00",
            now,
        );

        let err = dispatcher.tick(at(7, 1)).await.unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_run_flag_stops_loop() {
        let dir = tempfile::tempdir().unwrap();
        let now = at(6, 0);
        let mut dispatcher = dispatcher_with(
            &dir,
            Box::new(StaticFeed { items: Vec::new() }),
            Box::new(DryRunPublisher::new()),
            BlacklistFilter::default(),
            "07:00",
            now,
        );

        dispatcher.run_flag().store(false, Ordering::Relaxed);
        // Flag already cleared: run returns without looping forever
        dispatcher.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_schedule_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let now = at(6, 0);
        let feed = StaticFeed {
            items: vec![FeedItem { id: 1, parent_id: None, post: post("https://cdn.example/a.jpg", &[]) }],
        };
        {
            let mut dispatcher = dispatcher_with(
                &dir,
                Box::new(feed),
                Box::new(DryRunPublisher::new()),
                BlacklistFilter::default(),
                "07:00",
                now,
            );
            dispatcher.tick(at(7, 1)).await.unwrap();
            assert_eq!(dispatcher.pending(), 1);
        }

        // Fresh dispatcher picks up the persisted entry and cursor
        let revived = dispatcher_with(
            &dir,
            Box::new(StaticFeed { items: Vec::new() }),
            Box::new(DryRunPublisher::new()),
            BlacklistFilter::default(),
            "07:00",
            now,
        );
        assert_eq!(revived.pending(), 1);
        assert_eq!(revived.cursor.last_post_id, 1);
    }
}
