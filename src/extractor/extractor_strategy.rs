//! Patch extractor strategy definitions
//!
//! This module defines the contract shared by all patch extraction
//! strategies and the factory that selects one by name.

use std::fmt;

use log::{debug, error, info};
use ndarray::Array3;

use crate::config::ExtractionSettings;
use crate::errors::{PatchError, PatchResult};
use crate::points::PointSet;

use super::geometry;
use super::image_input::{ImageInput, Pixel};
use super::patch_set::ExtractionResult;
use super::point_strategy::{PointsPatchExtractor, DEFAULT_EXAMPLES_PER_POINT};
use super::window_strategy::{FixedWindowPatchExtractor, VariableWindowPatchExtractor};

/// Default patch height and width
pub const DEFAULT_PATCH_SIZE: usize = 224;

/// Patch size and padding shared by every strategy
///
/// Immutable once built; padding is applied symmetrically on both sides
/// of each spatial axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchConfig {
    /// Patch height in pixels
    pub patch_height: usize,
    /// Patch width in pixels
    pub patch_width: usize,
    /// Rows of padding added above and below
    pub pad_y: usize,
    /// Columns of padding added left and right
    pub pad_x: usize,
}

impl PatchConfig {
    /// Create a new configuration, rejecting empty patches
    pub fn new(patch_height: usize, patch_width: usize, pad_y: usize, pad_x: usize) -> PatchResult<Self> {
        if patch_height == 0 || patch_width == 0 {
            return Err(PatchError::InvalidInput(format!(
                "Patch dimensions must be positive, got {}x{}", patch_height, patch_width
            )));
        }

        Ok(PatchConfig { patch_height, patch_width, pad_y, pad_x })
    }
}

impl Default for PatchConfig {
    fn default() -> Self {
        PatchConfig {
            patch_height: DEFAULT_PATCH_SIZE,
            patch_width: DEFAULT_PATCH_SIZE,
            pad_y: 0,
            pad_x: 0,
        }
    }
}

/// Available extraction strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchStrategy {
    /// Patches centered on labeled points
    Point,
    /// Constant-stride tiling with one window size
    FixedWindow,
    /// Tiling with separate input and label window sizes
    VariableWindow,
}

impl PatchStrategy {
    /// Parse a strategy name, case-insensitively
    pub fn from_name(name: &str) -> PatchResult<Self> {
        match name.to_lowercase().as_str() {
            "point" => Ok(PatchStrategy::Point),
            "fixedwindow" => Ok(PatchStrategy::FixedWindow),
            "variablewindow" => Ok(PatchStrategy::VariableWindow),
            _ => {
                error!("Unsupported patch extraction method: {}", name);
                Err(PatchError::UnsupportedMethod(name.to_string()))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PatchStrategy::Point => "point",
            PatchStrategy::FixedWindow => "fixedwindow",
            PatchStrategy::VariableWindow => "variablewindow",
        }
    }
}

impl fmt::Display for PatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Strategy for extracting patches from an image
///
/// Implementations hold immutable configuration only, so a single
/// extractor can be shared between threads and reused across calls. Each
/// call allocates its own output.
pub trait PatchExtractor<T: Pixel>: Send + Sync {
    /// Patch size and padding of this extractor
    fn config(&self) -> &PatchConfig;

    /// Which strategy this extractor implements
    fn strategy(&self) -> PatchStrategy;

    /// Extract patches from an image
    ///
    /// # Arguments
    /// * `image` - In-memory array or path to an image file
    ///
    /// # Returns
    /// The patches with a label and identifier for each, or `InvalidInput`
    /// if the image cannot be resolved into a 3-D array
    fn extract_patches(&self, image: ImageInput<'_, T>) -> PatchResult<ExtractionResult<T>>;

    /// Merge patch-level results back into an image-level result
    fn merge_patches(&self, patches: &ExtractionResult<T>) -> PatchResult<Array3<T>>;

    /// Get the last location for patch extraction along one axis
    fn get_last_steps(&self, image_dim: i64, patch_dim: i64, stride: i64) -> i64 {
        geometry::get_last_steps(image_dim, patch_dim, stride)
    }
}

/// Parameters accepted by [`get_patch_extractor`]
#[derive(Debug, Clone)]
pub struct FactoryOptions {
    pub patch_height: usize,
    pub patch_width: usize,
    pub input_points: Option<PointSet>,
    pub pad_y: usize,
    pub pad_x: usize,
    pub num_examples_per_patch: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub label_patch_height: Option<usize>,
    pub label_patch_width: Option<usize>,
}

impl Default for FactoryOptions {
    fn default() -> Self {
        FactoryOptions {
            patch_height: DEFAULT_PATCH_SIZE,
            patch_width: DEFAULT_PATCH_SIZE,
            input_points: None,
            pad_y: 0,
            pad_x: 0,
            num_examples_per_patch: DEFAULT_EXAMPLES_PER_POINT,
            stride_h: 1,
            stride_w: 1,
            label_patch_height: None,
            label_patch_width: None,
        }
    }
}

/// Return a patch extractor for the named method
///
/// # Arguments
/// * `method_name` - One of "point", "fixedwindow" or "variablewindow", any case
/// * `options` - Patch size, padding and strategy parameters
///
/// # Returns
/// The extractor, or `UnsupportedMethod` for an unknown name
pub fn get_patch_extractor<T: Pixel>(method_name: &str, options: FactoryOptions) -> PatchResult<Box<dyn PatchExtractor<T>>> {
    let strategy = PatchStrategy::from_name(method_name)?;
    let config = PatchConfig::new(options.patch_height, options.patch_width, options.pad_y, options.pad_x)?;

    debug!("Creating {} extractor with {:?}", strategy, config);

    match strategy {
        PatchStrategy::Point => {
            info!("Using point-centered extraction with {} examples per point", options.num_examples_per_patch);
            Ok(Box::new(PointsPatchExtractor::new(
                config,
                options.input_points,
                options.num_examples_per_patch,
            )))
        },
        PatchStrategy::FixedWindow => {
            info!("Using fixed window extraction");
            Ok(Box::new(FixedWindowPatchExtractor::new(config, options.stride_h, options.stride_w)))
        },
        PatchStrategy::VariableWindow => {
            info!("Using variable window extraction");
            Ok(Box::new(VariableWindowPatchExtractor::new(
                config,
                options.stride_h,
                options.stride_w,
                options.label_patch_height,
                options.label_patch_width,
            )))
        },
    }
}

/// Factory building extractors from loaded settings
///
/// Wraps [`get_patch_extractor`] for callers that read their parameters
/// from a configuration file.
pub struct PatchExtractorFactory {
    settings: ExtractionSettings,
}

impl PatchExtractorFactory {
    /// Create a new factory instance
    pub fn new(settings: ExtractionSettings) -> Self {
        PatchExtractorFactory { settings }
    }

    /// Create the configured extractor
    ///
    /// # Arguments
    /// * `input_points` - Points for the point strategy, ignored by the others
    pub fn create_extractor<T: Pixel>(&self, input_points: Option<PointSet>) -> PatchResult<Box<dyn PatchExtractor<T>>> {
        let options = FactoryOptions {
            patch_height: self.settings.patch_height,
            patch_width: self.settings.patch_width,
            input_points,
            pad_y: self.settings.pad_y,
            pad_x: self.settings.pad_x,
            num_examples_per_patch: self.settings.num_examples_per_patch,
            stride_h: self.settings.stride_h,
            stride_w: self.settings.stride_w,
            label_patch_height: None,
            label_patch_width: None,
        };

        get_patch_extractor(&self.settings.method, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_defaults() {
        let extractor = get_patch_extractor::<u8>("point", FactoryOptions::default()).unwrap();
        assert_eq!(extractor.strategy(), PatchStrategy::Point);
        assert_eq!(*extractor.config(), PatchConfig::new(224, 224, 0, 0).unwrap());
    }

    #[test]
    fn test_method_name_is_case_insensitive() {
        let extractor = get_patch_extractor::<u8>("PoInT", FactoryOptions::default()).unwrap();
        assert_eq!(extractor.strategy(), PatchStrategy::Point);

        let extractor = get_patch_extractor::<u8>("FixedWindow", FactoryOptions::default()).unwrap();
        assert_eq!(extractor.strategy(), PatchStrategy::FixedWindow);

        let extractor = get_patch_extractor::<u8>("VARIABLEWINDOW", FactoryOptions::default()).unwrap();
        assert_eq!(extractor.strategy(), PatchStrategy::VariableWindow);
    }

    #[test]
    fn test_unknown_method() {
        let result = get_patch_extractor::<u8>("unknown", FactoryOptions::default());
        assert!(matches!(result, Err(PatchError::UnsupportedMethod(name)) if name == "unknown"));
    }

    #[test]
    fn test_zero_patch_size_rejected() {
        let options = FactoryOptions { patch_height: 0, ..FactoryOptions::default() };
        assert!(matches!(
            get_patch_extractor::<u8>("point", options),
            Err(PatchError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_last_steps_through_trait() {
        let extractor = get_patch_extractor::<u8>("point", FactoryOptions::default()).unwrap();
        assert_eq!(extractor.get_last_steps(10, 4, 2), 8);
    }

    #[test]
    fn test_factory_uses_settings() {
        let settings = ExtractionSettings {
            patch_height: 32,
            patch_width: 16,
            pad_y: 20,
            pad_x: 12,
            ..ExtractionSettings::default()
        };
        let factory = PatchExtractorFactory::new(settings);
        let extractor = factory.create_extractor::<u16>(None).unwrap();
        assert_eq!(*extractor.config(), PatchConfig::new(32, 16, 20, 12).unwrap());
    }
}
