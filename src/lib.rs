pub mod errors;
pub mod config;
pub mod points;
pub mod extractor;
pub mod slide;
pub mod tissue;
pub mod stain;
pub mod utils;
pub mod commands;

pub use errors::{PatchError, PatchResult};
pub use config::{ExtractionSettings, OutputSettings, PatchkitConfig};
pub use points::{read_points, Point, PointSet};
pub use extractor::{
    get_last_steps, get_patch_extractor, load_image, load_rgb_image, ExtractionResult, FactoryOptions,
    ImageInput, OutputFormat, PatchConfig, PatchExtractor, PatchExtractorFactory, PatchStrategy, Pixel,
    PointsPatchExtractor,
};
pub use slide::{read_bounds, save_tiles, slide_thumbnail, Bounds, SlideInfo, Units};
pub use tissue::{get_tissue_masker, MorphologicalMasker, OtsuTissueMasker, TissueMasker};
pub use stain::{get_normalizer, StainExtractor, StainNormalizer};
