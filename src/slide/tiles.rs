//! Tiling whole images
//!
//! Splits an image into a grid of tiles written as JPEG files, together
//! with an `Output.csv` listing every tile's position and a thumbnail of
//! the whole image.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::DynamicImage;
use log::info;

use crate::errors::{PatchError, PatchResult};
use crate::utils::csv_utils::format_record;
use crate::utils::progress::ProgressTracker;

use super::thumbnail::{save_image, slide_thumbnail, DEFAULT_THUMBNAIL_SIZE};

/// Tile width and height used when none is given
pub const DEFAULT_TILE_SIZE: (u32, u32) = (5000, 5000);

/// Position of one saved tile, ends exclusive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRecord {
    pub name: String,
    pub start_w: u32,
    pub end_w: u32,
    pub start_h: u32,
    pub end_h: u32,
}

impl TileRecord {
    pub fn size_w(&self) -> u32 {
        self.end_w - self.start_w
    }

    pub fn size_h(&self) -> u32 {
        self.end_h - self.start_h
    }
}

/// Tile grid covering a `width` x `height` image
///
/// Tiles run row by row; the last tile on each axis is cut at the image
/// border.
pub fn tile_grid(width: u32, height: u32, tile_size: (u32, u32)) -> PatchResult<Vec<TileRecord>> {
    let (tile_w, tile_h) = tile_size;
    if tile_w == 0 || tile_h == 0 {
        return Err(PatchError::InvalidInput(format!(
            "Tile size must be positive, got {}x{}", tile_w, tile_h
        )));
    }

    let mut tiles = Vec::new();
    for iy in 0..height.div_ceil(tile_h) {
        for ix in 0..width.div_ceil(tile_w) {
            let start_w = ix * tile_w;
            let start_h = iy * tile_h;
            tiles.push(TileRecord {
                name: format!("Tile_{}_{}.jpg", start_w, start_h),
                start_w,
                end_w: start_w.saturating_add(tile_w).min(width),
                start_h,
                end_h: start_h.saturating_add(tile_h).min(height),
            });
        }
    }

    Ok(tiles)
}

/// Save the tiles of one image under `output_dir/<file name>/`
///
/// # Arguments
/// * `input_path` - Image to tile
/// * `output_dir` - Directory receiving one sub-directory per image
/// * `tile_size` - Tile width and height in pixels
///
/// # Returns
/// The records written to `Output.csv`
pub fn save_tiles(input_path: &Path, output_dir: &Path, tile_size: (u32, u32)) -> PatchResult<Vec<TileRecord>> {
    let file_name = input_path
        .file_name()
        .ok_or_else(|| PatchError::InvalidInput(format!("{} has no file name", input_path.display())))?;
    let slide_dir: PathBuf = output_dir.join(file_name);
    fs::create_dir_all(&slide_dir)?;

    let image = image::open(input_path).map_err(|e| {
        PatchError::InvalidInput(format!("Could not decode image {}: {}", input_path.display(), e))
    })?;
    let tiles = tile_grid(image.width(), image.height(), tile_size)?;
    info!("Saving {} tiles of {} to {}", tiles.len(), input_path.display(), slide_dir.display());

    let progress = ProgressTracker::new(tiles.len() as u64, "Writing tiles");
    for tile in &tiles {
        progress.set_message(&tile.name);
        let crop: DynamicImage = image.crop_imm(tile.start_w, tile.start_h, tile.size_w(), tile.size_h());
        save_image(&crop, &slide_dir.join(&tile.name))?;
        progress.increment(1);
    }
    progress.finish();

    write_tile_csv(&slide_dir.join("Output.csv"), &tiles)?;
    save_image(&slide_thumbnail(&image, DEFAULT_THUMBNAIL_SIZE), &slide_dir.join("slide_thumbnail.jpg"))?;

    Ok(tiles)
}

fn write_tile_csv(path: &Path, tiles: &[TileRecord]) -> PatchResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "iter,Tile_Name,start_w,end_w,start_h,end_h,size_w,size_h")?;

    for (index, tile) in tiles.iter().enumerate() {
        let fields = [
            index.to_string(),
            tile.name.clone(),
            tile.start_w.to_string(),
            tile.end_w.to_string(),
            tile.start_h.to_string(),
            tile.end_h.to_string(),
            tile.size_w().to_string(),
            tile.size_h().to_string(),
        ];
        writeln!(writer, "{}", format_record(&fields))?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_grid_cuts_last_tiles_at_border() {
        let tiles = tile_grid(10, 7, (4, 4)).unwrap();
        assert_eq!(tiles.len(), 6);
        assert_eq!(tiles[2], TileRecord {
            name: "Tile_8_0.jpg".to_string(),
            start_w: 8,
            end_w: 10,
            start_h: 0,
            end_h: 4,
        });
        assert_eq!((tiles[5].size_w(), tiles[5].size_h()), (2, 3));
    }

    #[test]
    fn test_zero_tile_size_rejected() {
        assert!(tile_grid(10, 10, (0, 4)).is_err());
    }

    #[test]
    fn test_save_tiles_writes_listing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("slide.png");
        RgbImage::from_pixel(9, 5, Rgb([120, 60, 200])).save(&input).unwrap();

        let out = dir.path().join("tiles");
        let tiles = save_tiles(&input, &out, (4, 4)).unwrap();
        assert_eq!(tiles.len(), 6);

        let slide_dir = out.join("slide.png");
        for tile in &tiles {
            let saved = image::open(slide_dir.join(&tile.name)).unwrap();
            assert_eq!((saved.width(), saved.height()), (tile.size_w(), tile.size_h()));
        }
        assert!(slide_dir.join("slide_thumbnail.jpg").is_file());

        let listing = std::fs::read_to_string(slide_dir.join("Output.csv")).unwrap();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[6], "5,Tile_8_4.jpg,8,9,4,5,1,1");
    }
}
