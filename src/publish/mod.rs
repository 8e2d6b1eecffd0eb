//! Outbound channel boundary
//!
//! Due schedule entries leave the pipeline through the [`ChannelPublisher`]
//! trait. Every publish failure is treated as transient by the dispatcher
//! (the entry goes back into the schedule with a fresh timestamp), so
//! implementations report errors rather than retrying internally.
//!
//! [`DryRunPublisher`] logs the would-be publish and is what ships with the
//! binary; real channel clients live behind the trait.

use crate::error::Result;
use crate::fetcher::add_query_arg;
use crate::models::Post;
use async_trait::async_trait;
use rand::Rng;

/// Upper bound (inclusive) of the cache-buster value
const CACHE_BUSTER_MAX: u32 = 10_000;

/// Capability to publish a post to the outbound channel
#[async_trait]
pub trait ChannelPublisher: Send + Sync {
    /// Publish the post's media with its formatted caption
    ///
    /// Any error is retryable from the dispatcher's point of view.
    async fn publish(&self, post: &Post) -> Result<()>;
}

/// Append a random `random=<n>` query argument to a media URL
///
/// Some CDNs serve stale or truncated cached variants; a throwaway query
/// argument forces a fresh fetch on the channel side.
pub fn with_cache_buster(url: &str) -> String {
    let n = rand::thread_rng().gen_range(0..=CACHE_BUSTER_MAX);
    add_query_arg(url, "random", &n.to_string())
}

/// Publisher that only logs what it would send
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunPublisher;

impl DryRunPublisher {
    /// Create a dry-run publisher
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelPublisher for DryRunPublisher {
    async fn publish(&self, post: &Post) -> Result<()> {
        let media: Vec<String> = post.media_urls.iter().map(|u| with_cache_buster(u)).collect();
        tracing::info!(
            media = ?media,
            caption = %post.form_caption(),
            "Dry-run publish"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_cache_buster_appends_argument() {
        let url = with_cache_buster("https://cdn.example/a.jpg");
        assert!(url.starts_with("https://cdn.example/a.jpg?random="));

        let value: u32 = url.split("random=").nth(1).unwrap().parse().unwrap();
        assert!(value <= CACHE_BUSTER_MAX);
    }

    #[test]
    fn test_cache_buster_keeps_existing_args() {
        let url = with_cache_buster("https://cdn.example/a.jpg?width=400");
        assert!(url.contains("width=400"));
        assert!(url.contains("random="));
    }

    #[tokio::test]
    async fn test_dry_run_always_succeeds() {
        let publisher = DryRunPublisher::new();
        let post = Post::new(
            vec!["https://cdn.example/a.jpg".into()],
            Some("artist".into()),
            None,
            BTreeSet::new(),
        );
        assert!(publisher.publish(&post).await.is_ok());
    }
}
