//! Perceptual-hash deduplication index
//!
//! Combines the rate-limited fetcher with the persisted fingerprint store
//! into the deduplication oracle used by the scheduling pipeline: download
//! each media item, fingerprint it, drop items whose fingerprint was seen
//! before, and record the rest.

pub mod fingerprint;
pub mod store;

pub use fingerprint::Fingerprint;
pub use store::HashStore;

use crate::error::{Error, MediaError, Result};
use crate::fetcher::{strip_query_args, Fetcher};
use crate::models::Post;
use std::sync::Arc;

/// Deduplication index over downloaded media
pub struct DedupIndex {
    store: HashStore,
    fetcher: Arc<Fetcher>,
    allowed_formats: Vec<String>,
}

impl DedupIndex {
    /// Create a new index
    pub fn new(store: HashStore, fetcher: Arc<Fetcher>, allowed_formats: Vec<String>) -> Self {
        Self {
            store,
            fetcher,
            allowed_formats,
        }
    }

    /// Check whether a media URL's extension is in the allow-list
    ///
    /// Query arguments are stripped before the check.
    pub fn is_allowed_format(&self, media_url: &str) -> bool {
        let stripped = strip_query_args(media_url);
        self.allowed_formats
            .iter()
            .any(|ext| stripped.to_lowercase().ends_with(ext.as_str()))
    }

    /// Download a media item and compute its fingerprint
    ///
    /// # Errors
    ///
    /// - `Error::Media(UnsupportedFormat)` if the extension is not allowed
    ///   (never retried)
    /// - `Error::Fetch` if retrieval fails after the transport's retries
    /// - `Error::Media(Decode)` if the bytes are not a decodable image
    pub async fn fingerprint_of(&self, media_url: &str) -> Result<Fingerprint> {
        if !self.is_allowed_format(media_url) {
            return Err(Error::Media(MediaError::UnsupportedFormat {
                url: media_url.to_string(),
            }));
        }

        let bytes = self.fetcher.fetch_bytes(media_url).await?;
        Ok(Fingerprint::from_image_bytes(&bytes)?)
    }

    /// Check whether a fingerprint was already seen (increments the
    /// record's match counter on a hit)
    pub fn exists(&self, fingerprint: &Fingerprint) -> Result<bool> {
        self.store.contains(fingerprint)
    }

    /// Record a newly seen fingerprint (no-op when already present)
    pub fn record(&self, fingerprint: &Fingerprint, source_url: Option<&str>) -> Result<()> {
        self.store.insert(fingerprint, source_url)?;
        Ok(())
    }

    /// Remove already-seen media from a post and record the rest
    ///
    /// URLs with disallowed extensions are left in place untouched. For the
    /// remaining URLs the fingerprint decides: seen ones are dropped, new
    /// ones are kept and recorded. The returned post may end up with zero
    /// media; the caller must drop it in that case.
    ///
    /// Not transactional across URLs: a crash mid-batch may leave some
    /// fingerprints recorded for a post that never got scheduled.
    ///
    /// # Errors
    ///
    /// Propagates fetch and decode failures so the caller can drop the
    /// whole post from the current batch.
    pub async fn filter_duplicates(&self, post: &Post) -> Result<Post> {
        let mut kept: Vec<String> = Vec::with_capacity(post.media_urls.len());
        let mut new_hashes: Vec<(Fingerprint, String)> = Vec::new();

        for url in &post.media_urls {
            if !self.is_allowed_format(url) {
                kept.push(url.clone());
                continue;
            }

            let fingerprint = self.fingerprint_of(url).await?;
            if self.exists(&fingerprint)? {
                tracing::info!(fingerprint = %fingerprint, url = %url, "Duplicate media dropped");
            } else {
                tracing::debug!(fingerprint = %fingerprint, url = %url, "New media fingerprint");
                kept.push(url.clone());
                new_hashes.push((fingerprint, url.clone()));
            }
        }

        for (fingerprint, url) in &new_hashes {
            self.record(fingerprint, Some(url))?;
        }

        if kept.len() == post.media_urls.len() {
            Ok(post.clone())
        } else {
            Ok(post.with_media(kept))
        }
    }

    /// Number of recorded fingerprints
    pub fn recorded_count(&self) -> Result<usize> {
        self.store.len()
    }
}
