//! Common test utilities

use artcast::config::TransportConfig;
use artcast::models::Post;
use image::{GrayImage, Luma};
use std::collections::BTreeSet;
use std::io::Cursor;

/// Transport config tuned for tests: no throttling, no retry sleep
pub fn fast_transport() -> TransportConfig {
    TransportConfig {
        request_delay_secs: 0,
        max_retries: 5,
        retry_delay_secs: 0,
        request_timeout_secs: 5,
        proxy: None,
    }
}

/// Create a test post with default values
#[allow(dead_code)]
pub fn create_test_post(urls: &[&str]) -> Post {
    Post::new(
        urls.iter().map(|s| s.to_string()).collect(),
        Some("test_artist".to_string()),
        Some("https://example.com/posts/1".to_string()),
        BTreeSet::new(),
    )
}

/// Create a test post with specific tags
#[allow(dead_code)]
pub fn create_post_with_tags(urls: &[&str], tags: &[&str]) -> Post {
    Post::new(
        urls.iter().map(|s| s.to_string()).collect(),
        Some("test_artist".to_string()),
        None,
        tags.iter().map(|s| s.to_string()).collect(),
    )
}

/// Encode a synthetic grayscale gradient image as PNG bytes
///
/// `seed` shifts the gradient so different seeds produce images with
/// different perceptual fingerprints.
#[allow(dead_code)]
pub fn synthetic_png(seed: u32) -> Vec<u8> {
    let img = GrayImage::from_fn(64, 64, |x, y| {
        let band = (x + y * seed) % 64;
        if band < 32 {
            Luma([230u8])
        } else {
            Luma([20u8])
        }
    });

    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .expect("png encoding");
    buf.into_inner()
}
