//! Patch extraction from pathology images
//!
//! This module provides functionality to cut fixed-size patches out of
//! images using a strategy pattern. The point-centered strategy samples a
//! grid of patches around labeled points; window strategies tile the image.

mod extractor_strategy;
mod geometry;
mod image_input;
mod padding;
mod patch_set;
mod point_strategy;
mod window_strategy;

// Public exports
pub use extractor_strategy::{
    get_patch_extractor, FactoryOptions, PatchConfig, PatchExtractor, PatchExtractorFactory,
    PatchStrategy, DEFAULT_PATCH_SIZE,
};
pub use geometry::{get_last_steps, sample_offsets};
pub use image_input::{load_image, load_rgb_image, ImageInput, Pixel, ResolvedImage};
pub use padding::pad_symmetric;
pub use patch_set::{ExtractionResult, OutputFormat};
pub use point_strategy::{PointsPatchExtractor, DEFAULT_EXAMPLES_PER_POINT};
pub use window_strategy::{FixedWindowPatchExtractor, VariableWindowPatchExtractor};
