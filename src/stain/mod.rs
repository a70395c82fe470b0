//! Stain separation and normalisation for H&E images
//!
//! Stain matrices are estimated from optical densities (Ruifrok, Macenko,
//! Vahadane or a user-supplied matrix) and used to map a source image onto
//! the stain appearance of a target image. Reinhard colour transfer works
//! on CIELAB statistics instead of stain vectors.

mod conversion;
mod extractor;
mod matrix_io;
mod normalizer;

pub use conversion::{
    ensure_rgb, lab_to_rgb, luminosity_tissue_mask, od_to_rgb, percentile, rgb_to_lab, rgb_to_od,
};
pub use extractor::{
    normalize_rows, CustomExtractor, MacenkoExtractor, RuifrokExtractor, StainExtractor,
    VahadaneExtractor, LUMINOSITY_THRESHOLD,
};
pub use matrix_io::{load_stain_matrix, parse_stain_csv, read_npy_matrix};
pub use normalizer::{
    get_concentrations, get_normalizer, NormMethod, ReinhardNormalizer, StainMatrixNormalizer,
    StainNormalizer,
};
