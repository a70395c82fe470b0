//! Window-based patch extraction
//!
//! Tiling strategies that walk an image at a fixed stride. Both are
//! constructible so they can be selected and configured, but extraction
//! and merging report `NotImplemented` for now.

use log::warn;
use ndarray::Array3;

use crate::errors::{PatchError, PatchResult};

use super::extractor_strategy::{PatchConfig, PatchExtractor, PatchStrategy};
use super::image_input::{ImageInput, Pixel};
use super::patch_set::ExtractionResult;

/// Tiles an image with one window size at a constant stride
#[derive(Debug, Clone)]
pub struct FixedWindowPatchExtractor {
    config: PatchConfig,
    stride_h: usize,
    stride_w: usize,
}

impl FixedWindowPatchExtractor {
    pub fn new(config: PatchConfig, stride_h: usize, stride_w: usize) -> Self {
        FixedWindowPatchExtractor { config, stride_h, stride_w }
    }

    pub fn stride(&self) -> (usize, usize) {
        (self.stride_h, self.stride_w)
    }
}

impl<T: Pixel> PatchExtractor<T> for FixedWindowPatchExtractor {
    fn config(&self) -> &PatchConfig {
        &self.config
    }

    fn strategy(&self) -> PatchStrategy {
        PatchStrategy::FixedWindow
    }

    fn extract_patches(&self, _image: ImageInput<'_, T>) -> PatchResult<ExtractionResult<T>> {
        warn!("Fixed window extraction requested but not available");
        Err(PatchError::NotImplemented("Fixed window patch extraction".to_string()))
    }

    fn merge_patches(&self, _patches: &ExtractionResult<T>) -> PatchResult<Array3<T>> {
        Err(PatchError::NotImplemented("Fixed window patch merging".to_string()))
    }
}

/// Tiles an image with separate input and label window sizes
///
/// The label window defaults to the input patch size when not given.
#[derive(Debug, Clone)]
pub struct VariableWindowPatchExtractor {
    config: PatchConfig,
    stride_h: usize,
    stride_w: usize,
    label_patch_height: usize,
    label_patch_width: usize,
}

impl VariableWindowPatchExtractor {
    pub fn new(
        config: PatchConfig,
        stride_h: usize,
        stride_w: usize,
        label_patch_height: Option<usize>,
        label_patch_width: Option<usize>,
    ) -> Self {
        VariableWindowPatchExtractor {
            config,
            stride_h,
            stride_w,
            label_patch_height: label_patch_height.unwrap_or(config.patch_height),
            label_patch_width: label_patch_width.unwrap_or(config.patch_width),
        }
    }

    pub fn stride(&self) -> (usize, usize) {
        (self.stride_h, self.stride_w)
    }

    pub fn label_patch_size(&self) -> (usize, usize) {
        (self.label_patch_height, self.label_patch_width)
    }
}

impl<T: Pixel> PatchExtractor<T> for VariableWindowPatchExtractor {
    fn config(&self) -> &PatchConfig {
        &self.config
    }

    fn strategy(&self) -> PatchStrategy {
        PatchStrategy::VariableWindow
    }

    fn extract_patches(&self, _image: ImageInput<'_, T>) -> PatchResult<ExtractionResult<T>> {
        warn!("Variable window extraction requested but not available");
        Err(PatchError::NotImplemented("Variable window patch extraction".to_string()))
    }

    fn merge_patches(&self, _patches: &ExtractionResult<T>) -> PatchResult<Array3<T>> {
        Err(PatchError::NotImplemented("Variable window patch merging".to_string()))
    }
}
