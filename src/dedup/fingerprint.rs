//! Perceptual image fingerprinting
//!
//! The fingerprint is a 64-bit average hash: the image is downsampled to an
//! 8x8 grayscale grid and each cell contributes one bit, set when the cell
//! is brighter than the grid mean. Duplicate detection uses exact equality
//! of fingerprints only.

use crate::error::MediaError;
use image::imageops::FilterType;
use std::fmt;
use std::str::FromStr;

/// Side length of the downsampled grid
const HASH_GRID: u32 = 8;

/// A 64-bit perceptual hash of an image
///
/// Canonically serialized as 16 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Compute the fingerprint of an encoded image
    ///
    /// # Errors
    ///
    /// Returns `MediaError::Decode` if the bytes are not a decodable image.
    pub fn from_image_bytes(bytes: &[u8]) -> Result<Self, MediaError> {
        let img = image::load_from_memory(bytes).map_err(|e| MediaError::Decode(e.to_string()))?;

        let gray = img
            .resize_exact(HASH_GRID, HASH_GRID, FilterType::Triangle)
            .to_luma8();

        let pixels: Vec<u32> = gray.pixels().map(|p| u32::from(p.0[0])).collect();
        let mean = pixels.iter().sum::<u32>() / pixels.len() as u32;

        let mut bits = 0u64;
        for (i, &pixel) in pixels.iter().enumerate() {
            if pixel > mean {
                bits |= 1 << i;
            }
        }

        Ok(Self(bits))
    }

    /// Raw hash bits
    pub fn bits(&self) -> u64 {
        self.0
    }

    /// Canonical hex serialization
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }

    /// Parse the canonical hex serialization
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 16 {
            return None;
        }
        u64::from_str_radix(s, 16).ok().map(Self)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s).ok_or_else(|| MediaError::Decode(format!("invalid fingerprint: {s}")))
    }
}
