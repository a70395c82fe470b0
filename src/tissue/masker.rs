//! Tissue masking strategies
//!
//! A masker is fitted on one or more images to learn a grey-level
//! threshold, then turns images into boolean masks where `true` marks
//! tissue. Tissue is darker than the bright slide background.

use log::{debug, info};
use ndarray::{Array2, ArrayView2, ArrayView3};

use crate::errors::{PatchError, PatchResult};
use crate::slide::Units;

use super::morphology::{dilate, ellipse_kernel, remove_small_regions};
use super::threshold::{rgb_to_grey, threshold_otsu};

/// Kernel edge length in microns used to derive kernel sizes from resolution
const KERNEL_MICRONS: f64 = 32.0;

/// Interface implemented by every tissue masker
pub trait TissueMasker: Send + Sync {
    /// Learn the masking parameters from `images`
    fn fit(&mut self, images: &[ArrayView3<u8>]) -> PatchResult<()>;

    /// Create one mask per image
    fn transform(&self, images: &[ArrayView3<u8>]) -> PatchResult<Vec<Array2<bool>>>;

    fn fit_transform(&mut self, images: &[ArrayView3<u8>]) -> PatchResult<Vec<Array2<bool>>> {
        self.fit(images)?;
        self.transform(images)
    }
}

fn fit_threshold(images: &[ArrayView3<u8>]) -> PatchResult<u8> {
    let mut greys = Vec::with_capacity(images.len());
    for image in images {
        greys.push(rgb_to_grey(*image)?);
    }

    let threshold = threshold_otsu(greys.iter().flat_map(|g| g.iter().copied()))
        .ok_or_else(|| PatchError::InvalidInput("Cannot fit a tissue masker on empty images".to_string()))?;
    info!("Fitted Otsu threshold {} on {} images", threshold, images.len());
    Ok(threshold)
}

fn dark_mask(image: ArrayView3<u8>, threshold: u8) -> PatchResult<Array2<bool>> {
    Ok(rgb_to_grey(image)?.mapv(|v| v < threshold))
}

fn not_fitted() -> PatchError {
    PatchError::InvalidInput("Fit must be called before transform".to_string())
}

/// Masks pixels darker than the Otsu threshold of the fitted images
#[derive(Debug, Clone, Default)]
pub struct OtsuTissueMasker {
    threshold: Option<u8>,
}

impl OtsuTissueMasker {
    pub fn new() -> Self {
        OtsuTissueMasker::default()
    }

    pub fn threshold(&self) -> Option<u8> {
        self.threshold
    }
}

impl TissueMasker for OtsuTissueMasker {
    fn fit(&mut self, images: &[ArrayView3<u8>]) -> PatchResult<()> {
        self.threshold = Some(fit_threshold(images)?);
        Ok(())
    }

    fn transform(&self, images: &[ArrayView3<u8>]) -> PatchResult<Vec<Array2<bool>>> {
        let threshold = self.threshold.ok_or_else(not_fitted)?;
        images.iter().map(|image| dark_mask(*image, threshold)).collect()
    }
}

/// Otsu masking followed by small-region removal and dilation
///
/// After thresholding, 8-connected regions smaller than `min_region_size`
/// pixels are dropped and the remainder is dilated with an elliptical
/// kernel.
#[derive(Debug, Clone)]
pub struct MorphologicalMasker {
    kernel_size: (f64, f64),
    kernel: Array2<bool>,
    min_region_size: f64,
    threshold: Option<u8>,
}

impl MorphologicalMasker {
    /// Create a masker with an explicit kernel size
    ///
    /// # Arguments
    /// * `kernel_size` - Kernel width and height in pixels
    /// * `min_region_size` - Smallest region kept; defaults to the sum of the kernel sides
    pub fn new(kernel_size: (f64, f64), min_region_size: Option<f64>) -> PatchResult<Self> {
        let (width, height) = kernel_size;
        if !(width.is_finite() && height.is_finite() && width >= 1.0 && height >= 1.0) {
            return Err(PatchError::InvalidInput(format!(
                "Kernel size must be at least 1x1, got {}x{}", width, height
            )));
        }

        let kernel = ellipse_kernel(width.round() as usize, height.round() as usize);
        let min_region_size = min_region_size.unwrap_or(width + height);
        debug!("Morphological masker kernel {}x{}, min region {}", width, height, min_region_size);

        Ok(MorphologicalMasker { kernel_size, kernel, min_region_size, threshold: None })
    }

    /// Create a masker for images scanned at `mpp` microns per pixel
    pub fn from_mpp(mpp: f64) -> PatchResult<Self> {
        if !(mpp.is_finite() && mpp > 0.0) {
            return Err(PatchError::InvalidInput(format!("Microns per pixel must be positive, got {}", mpp)));
        }
        let side = (KERNEL_MICRONS / mpp).max(1.0);
        MorphologicalMasker::new((side, side), None)
    }

    /// Create a masker for images at objective `power`
    pub fn from_power(power: f64) -> PatchResult<Self> {
        if !(power.is_finite() && power > 0.0) {
            return Err(PatchError::InvalidInput(format!("Objective power must be positive, got {}", power)));
        }
        MorphologicalMasker::from_mpp(objective_power_to_mpp(power))
    }

    pub fn kernel_size(&self) -> (f64, f64) {
        self.kernel_size
    }

    pub fn min_region_size(&self) -> f64 {
        self.min_region_size
    }

    fn clean(&self, mut mask: Array2<bool>) -> Array2<bool> {
        remove_small_regions(&mut mask, self.min_region_size);
        dilate(mask.view(), self.kernel.view())
    }
}

impl Default for MorphologicalMasker {
    fn default() -> Self {
        MorphologicalMasker {
            kernel_size: (1.0, 1.0),
            kernel: ellipse_kernel(1, 1),
            min_region_size: 2.0,
            threshold: None,
        }
    }
}

impl TissueMasker for MorphologicalMasker {
    fn fit(&mut self, images: &[ArrayView3<u8>]) -> PatchResult<()> {
        self.threshold = Some(fit_threshold(images)?);
        Ok(())
    }

    fn transform(&self, images: &[ArrayView3<u8>]) -> PatchResult<Vec<Array2<bool>>> {
        let threshold = self.threshold.ok_or_else(not_fitted)?;
        images
            .iter()
            .map(|image| dark_mask(*image, threshold).map(|mask| self.clean(mask)))
            .collect()
    }
}

/// Approximate microns per pixel at an objective power
pub fn objective_power_to_mpp(power: f64) -> f64 {
    10.0 / power
}

/// Tissue masking methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskMethod {
    Otsu,
    Morphological,
}

impl MaskMethod {
    /// Parse a method name, case-insensitively
    pub fn from_name(name: &str) -> PatchResult<Self> {
        match name.trim().to_lowercase().as_str() {
            "otsu" => Ok(MaskMethod::Otsu),
            "morphological" => Ok(MaskMethod::Morphological),
            _ => Err(PatchError::UnsupportedMethod(name.to_string())),
        }
    }
}

/// Options for [`get_tissue_masker`]
#[derive(Debug, Clone)]
pub struct MaskerOptions {
    pub resolution: f64,
    pub units: Units,
    pub kernel_size: Option<(usize, usize)>,
}

impl Default for MaskerOptions {
    fn default() -> Self {
        MaskerOptions { resolution: 1.25, units: Units::Power, kernel_size: None }
    }
}

/// Create a tissue masker by method name
///
/// The morphological masker takes its kernel from `kernel_size` when
/// given, otherwise from `resolution` in mpp or power units.
pub fn get_tissue_masker(method: &str, options: &MaskerOptions) -> PatchResult<Box<dyn TissueMasker>> {
    match MaskMethod::from_name(method)? {
        MaskMethod::Otsu => Ok(Box::new(OtsuTissueMasker::new())),
        MaskMethod::Morphological => {
            let masker = match (options.kernel_size, options.units) {
                (Some((w, h)), _) => MorphologicalMasker::new((w as f64, h as f64), None)?,
                (None, Units::Mpp) => MorphologicalMasker::from_mpp(options.resolution)?,
                (None, Units::Power) => MorphologicalMasker::from_power(options.resolution)?,
                (None, units) => return Err(PatchError::UnsupportedMethod(format!(
                    "{:?} units not supported for tissue masking", units
                ))),
            };
            Ok(Box::new(masker))
        },
    }
}

/// Fraction of `true` pixels in a mask
pub fn tissue_fraction(mask: ArrayView2<bool>) -> f64 {
    if mask.is_empty() {
        return 0.0;
    }
    mask.iter().filter(|&&v| v).count() as f64 / mask.len() as f64
}
