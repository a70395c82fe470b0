//! Thumbnails and image writing

use std::fs;
use std::path::Path;

use image::DynamicImage;
use log::{debug, info};

use crate::errors::PatchResult;

/// Longest side of a thumbnail when none is given
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 1024;

/// Downscale an image so its longest side is at most `max_size`
///
/// Aspect ratio is kept; images that are already small enough are
/// returned unchanged.
pub fn slide_thumbnail(image: &DynamicImage, max_size: u32) -> DynamicImage {
    let max_size = max_size.max(1);
    if image.width() <= max_size && image.height() <= max_size {
        return image.clone();
    }

    let thumb = image.thumbnail(max_size, max_size);
    debug!("Thumbnail {}x{} -> {}x{}", image.width(), image.height(), thumb.width(), thumb.height());
    thumb
}

/// Save an image, dropping alpha for formats that cannot store it
///
/// JPEG stores 8-bit luma or RGB only, so other layouts are converted to
/// one of those before encoding. Parent directories are created.
pub fn save_image(image: &DynamicImage, path: &Path) -> PatchResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let is_jpeg = path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .map(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg"))
        .unwrap_or(false);

    if is_jpeg {
        let flattened = match image.color().channel_count() {
            1 | 2 => DynamicImage::ImageLuma8(image.to_luma8()),
            _ => DynamicImage::ImageRgb8(image.to_rgb8()),
        };
        flattened.save(path)?;
    } else {
        image.save(path)?;
    }

    info!("Saved {}x{} image to {}", image.width(), image.height(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn test_thumbnail_keeps_aspect_ratio() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 100, Rgb([10, 20, 30])));
        let thumb = slide_thumbnail(&image, 200);
        assert_eq!((thumb.width(), thumb.height()), (200, 50));
    }

    #[test]
    fn test_small_image_unchanged() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, Rgb([1, 2, 3])));
        let thumb = slide_thumbnail(&image, 1024);
        assert_eq!(thumb, image);
    }

    #[test]
    fn test_rgba_saved_as_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("thumb.jpg");
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([200, 100, 50, 255])));

        save_image(&image, &path).unwrap();
        let reloaded = image::open(&path).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (8, 8));
        assert_eq!(reloaded.color().channel_count(), 3);
    }
}
