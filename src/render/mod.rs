//! Image rendering layer.
//!
//! [`ImagePipeline`] is the seam between the thumbnail cache and the actual
//! pixel work; [`RasterPipeline`] implements it with the `image` crate.

mod pipeline;

pub use pipeline::{
    clamp_quality, is_valid_quality, ImagePipeline, RasterPipeline, ResizeMode, DEFAULT_QUALITY,
    MAX_QUALITY, MIN_QUALITY,
};
