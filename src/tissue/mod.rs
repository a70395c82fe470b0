//! Tissue detection
//!
//! Grey-level thresholding and binary morphology used to separate tissue
//! from the bright background of a slide image.

mod masker;
mod morphology;
mod threshold;

pub use masker::{
    get_tissue_masker, objective_power_to_mpp, tissue_fraction, MaskMethod, MaskerOptions,
    MorphologicalMasker, OtsuTissueMasker, TissueMasker,
};
pub use morphology::{dilate, ellipse_kernel, remove_small_regions};
pub use threshold::{rgb_to_grey, threshold_otsu};
