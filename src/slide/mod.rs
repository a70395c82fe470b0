//! Whole-image operations
//!
//! Metadata, region reads, thumbnails and tiling for ordinary image files
//! decoded with the `image` crate.

mod info;
mod region;
mod thumbnail;
mod tiles;

pub use info::{default_meta_dir, SlideInfo};
pub use region::{read_bounds, read_bounds_baseline, scale_for, Bounds, Units, DEFAULT_BOUNDS};
pub use thumbnail::{save_image, slide_thumbnail, DEFAULT_THUMBNAIL_SIZE};
pub use tiles::{save_tiles, tile_grid, TileRecord, DEFAULT_TILE_SIZE};
