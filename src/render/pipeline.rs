//! Image pipeline: decode, resize, encode.
//!
//! # Design Decisions
//!
//! - **Injected**: the thumbnail cache talks to an [`ImagePipeline`] trait so
//!   tests can count or fake renders.
//!
//! - **Format from extension**: the output format is chosen from the target
//!   file's extension, which the cache copies from the source.
//!
//! - **Quality only for JPEG**: other formats ignore the quality setting.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};

use crate::error::ThumbnailError;

/// Default render quality (1-100).
pub const DEFAULT_QUALITY: u8 = 75;

/// Minimum allowed quality.
pub const MIN_QUALITY: u8 = 1;

/// Maximum allowed quality.
pub const MAX_QUALITY: u8 = 100;

// =============================================================================
// Resize Mode
// =============================================================================

/// How a source image is fitted to the target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    /// Scale to cover the box, then crop the excess. Output is exactly `width x height`.
    #[default]
    Outbound,

    /// Scale to fit inside the box, preserving aspect ratio. Never upscales.
    Inset,
}

impl ResizeMode {
    /// Stable lowercase name, also used in cache fingerprints.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResizeMode::Outbound => "outbound",
            ResizeMode::Inset => "inset",
        }
    }
}

impl fmt::Display for ResizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResizeMode {
    type Err = ThumbnailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "outbound" => Ok(ResizeMode::Outbound),
            "inset" => Ok(ResizeMode::Inset),
            other => Err(ThumbnailError::invalid_config(format!(
                "unknown resize mode '{}' (expected 'outbound' or 'inset')",
                other
            ))),
        }
    }
}

// =============================================================================
// Pipeline Trait
// =============================================================================

/// Decode/resize/encode operations used by the thumbnail cache.
pub trait ImagePipeline: Send + Sync {
    /// Decoded image handle.
    type Image: Send;

    /// Decode an image from raw file bytes.
    fn decode(&self, bytes: &[u8]) -> Result<Self::Image, ThumbnailError>;

    /// Resize to the target box according to `mode`.
    fn resize(
        &self,
        image: Self::Image,
        width: u32,
        height: u32,
        mode: ResizeMode,
    ) -> Result<Self::Image, ThumbnailError>;

    /// Encode to `path`. The format follows the path's extension.
    fn encode(&self, image: &Self::Image, path: &Path, quality: u8) -> Result<(), ThumbnailError>;
}

// =============================================================================
// Raster Pipeline
// =============================================================================

/// [`ImagePipeline`] backed by the `image` crate.
#[derive(Debug, Clone)]
pub struct RasterPipeline {
    filter: FilterType,
}

impl Default for RasterPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterPipeline {
    /// Create a pipeline using Lanczos3 resampling.
    pub fn new() -> Self {
        Self {
            filter: FilterType::Lanczos3,
        }
    }

    /// Create a pipeline with a specific resampling filter.
    pub fn with_filter(filter: FilterType) -> Self {
        Self { filter }
    }
}

impl ImagePipeline for RasterPipeline {
    type Image = DynamicImage;

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, ThumbnailError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(ThumbnailError::render)?;

        reader.decode().map_err(ThumbnailError::render)
    }

    fn resize(
        &self,
        image: DynamicImage,
        width: u32,
        height: u32,
        mode: ResizeMode,
    ) -> Result<DynamicImage, ThumbnailError> {
        if width == 0 || height == 0 {
            return Err(ThumbnailError::render(format!(
                "cannot resize to {}x{}",
                width, height
            )));
        }

        let resized = match mode {
            ResizeMode::Outbound => image.resize_to_fill(width, height, self.filter),
            ResizeMode::Inset => {
                if image.width() <= width && image.height() <= height {
                    image
                } else {
                    image.resize(width, height, self.filter)
                }
            }
        };

        Ok(resized)
    }

    fn encode(&self, image: &DynamicImage, path: &Path, quality: u8) -> Result<(), ThumbnailError> {
        let format = ImageFormat::from_path(path).map_err(|_| {
            ThumbnailError::render(format!(
                "cannot determine output format for {}",
                path.display()
            ))
        })?;

        let file = File::create(path).map_err(|e| ThumbnailError::storage(path, e))?;
        let mut writer = BufWriter::new(file);

        match format {
            ImageFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut writer, clamp_quality(quality));
                match image.color() {
                    ColorType::L8 | ColorType::Rgb8 => image.write_with_encoder(encoder),
                    _ => DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder),
                }
                .map_err(ThumbnailError::render)?;
            }
            other => image
                .write_to(&mut writer, other)
                .map_err(ThumbnailError::render)?,
        }

        writer.flush().map_err(|e| ThumbnailError::storage(path, e))
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_QUALITY..=MAX_QUALITY).contains(&quality)
}

/// Clamp quality to the valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_QUALITY, MAX_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
