//! Image compression used before upload.
//!
//! `compress` never fails: decode or encode problems hand the original bytes
//! back with a [`CompressionOutcome::Fallback`].

mod pool;

pub use pool::{CompressionPool, PendingCompression, WorkerOutput};

use anyhow::{Context, Result};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};

const QUALITY_STEP: u8 = 10;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Deployment-wide size and quality limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CompressionPolicy {
    pub max_dimension: u32,
    pub max_size_mb: f64,
    pub quality: u8,
    pub min_quality: u8,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            max_dimension: 1920,
            max_size_mb: 1.0,
            quality: 80,
            min_quality: 40,
        }
    }
}

impl CompressionPolicy {
    fn max_bytes(&self) -> usize {
        (self.max_size_mb * BYTES_PER_MB) as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompressionOutcome {
    Compressed { original_bytes: usize },
    Fallback { reason: String },
}

#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub format: Option<ImageFormat>,
    pub outcome: CompressionOutcome,
}

impl CompressedImage {
    pub fn is_fallback(&self) -> bool {
        matches!(self.outcome, CompressionOutcome::Fallback { .. })
    }

    fn original(bytes: Vec<u8>, reason: impl Into<String>) -> Self {
        Self {
            format: image::guess_format(&bytes).ok(),
            bytes,
            outcome: CompressionOutcome::Fallback {
                reason: reason.into(),
            },
        }
    }
}

pub fn compress(name: &str, input: Vec<u8>, policy: &CompressionPolicy) -> CompressedImage {
    match encode_within_policy(&input, policy) {
        Ok(output) if output.len() < input.len() => CompressedImage {
            outcome: CompressionOutcome::Compressed {
                original_bytes: input.len(),
            },
            bytes: output,
            format: Some(ImageFormat::Jpeg),
        },
        Ok(output) => {
            log::warn!(
                "{name}: compressed size {} is not below original {}, uploading original",
                output.len(),
                input.len()
            );
            CompressedImage::original(input, "no size reduction")
        }
        Err(err) => {
            log::warn!("{name}: compression failed, uploading original: {err:#}");
            CompressedImage::original(input, format!("{err:#}"))
        }
    }
}

fn encode_within_policy(input: &[u8], policy: &CompressionPolicy) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(input).context("failed to decode image")?;

    let max = policy.max_dimension;
    let resized = if decoded.width() > max || decoded.height() > max {
        decoded.resize(max, max, FilterType::Triangle)
    } else {
        decoded
    };

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
    let max_bytes = policy.max_bytes();
    let mut quality = policy.quality;

    loop {
        let encoded = encode_jpeg(&rgb, quality)?;
        if encoded.len() <= max_bytes || quality <= policy.min_quality {
            return Ok(encoded);
        }
        quality = quality
            .saturating_sub(QUALITY_STEP)
            .max(policy.min_quality);
    }
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    image
        .write_with_encoder(encoder)
        .with_context(|| format!("failed to encode jpeg at quality {quality}"))?;
    Ok(buffer)
}
