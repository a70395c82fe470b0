//! Image metadata
//!
//! Collects what can be learned about an ordinary image file without
//! decoding pixel data twice, and saves it as a small TOML document next
//! to other per-file outputs.

use std::fs;
use std::path::{Path, PathBuf};

use image::ColorType;
use log::{debug, info};

use crate::errors::{PatchError, PatchResult};

/// Metadata of one image file
#[derive(Debug, Clone, PartialEq)]
pub struct SlideInfo {
    pub file_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    /// Bits per channel, 8 or 16 for integer images and 32 for float images
    pub bits_per_channel: u16,
    /// Color layout as reported by the decoder, e.g. `Rgb8`
    pub color: String,
    pub file_size: u64,
}

impl SlideInfo {
    /// Read the metadata of an image file
    pub fn read(path: &Path) -> PatchResult<Self> {
        let image = image::open(path).map_err(|e| {
            PatchError::InvalidInput(format!("Could not decode image {}: {}", path.display(), e))
        })?;
        let color = image.color();
        let file_size = fs::metadata(path)?.len();

        Ok(SlideInfo {
            file_path: path.to_path_buf(),
            width: image.width(),
            height: image.height(),
            channels: color.channel_count(),
            bits_per_channel: bits_per_channel(color),
            color: format!("{:?}", color),
            file_size,
        })
    }

    /// Metadata as a TOML table
    pub fn to_toml(&self) -> toml::Table {
        let mut table = toml::Table::new();
        table.insert("file_path".to_string(), toml::Value::String(self.file_path.display().to_string()));
        table.insert("width".to_string(), toml::Value::Integer(self.width as i64));
        table.insert("height".to_string(), toml::Value::Integer(self.height as i64));
        table.insert("channels".to_string(), toml::Value::Integer(self.channels as i64));
        table.insert("bits_per_channel".to_string(), toml::Value::Integer(self.bits_per_channel as i64));
        table.insert("color".to_string(), toml::Value::String(self.color.clone()));
        table.insert("file_size".to_string(), toml::Value::Integer(self.file_size as i64));
        table
    }

    /// Save the metadata as `<file stem>.toml` inside `output_dir`
    ///
    /// # Returns
    /// Path of the written file
    pub fn save(&self, output_dir: &Path) -> PatchResult<PathBuf> {
        let stem = self.file_path
            .file_stem()
            .and_then(std::ffi::OsStr::to_str)
            .ok_or_else(|| PatchError::InvalidInput(format!(
                "Cannot derive a metadata file name from {}", self.file_path.display()
            )))?;

        let content = toml::to_string(&self.to_toml())
            .map_err(|e| PatchError::GenericError(format!("Failed to serialize metadata: {}", e)))?;

        fs::create_dir_all(output_dir)?;
        let out_path = output_dir.join(format!("{}.toml", stem));
        fs::write(&out_path, content)?;

        info!("Saved metadata of {} to {}", self.file_path.display(), out_path.display());
        Ok(out_path)
    }
}

fn bits_per_channel(color: ColorType) -> u16 {
    let channels = color.channel_count().max(1) as u16;
    let bits = color.bits_per_pixel() / channels;
    debug!("{:?} uses {} bits per channel", color, bits);
    bits
}

/// Default metadata directory for an input
///
/// A directory `slides/` maps to `slides/../meta`; a file
/// `slides/a.png` maps to `slides/../meta` as well.
pub fn default_meta_dir(input: &Path) -> PathBuf {
    let base = if input.is_dir() {
        input.parent()
    } else {
        input.parent().and_then(Path::parent)
    };
    base.unwrap_or_else(|| Path::new(".")).join("meta")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_read_rgb_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.png");
        RgbImage::from_pixel(7, 5, Rgb([1, 2, 3])).save(&path).unwrap();

        let info = SlideInfo::read(&path).unwrap();
        assert_eq!((info.width, info.height, info.channels), (7, 5, 3));
        assert_eq!(info.bits_per_channel, 8);
        assert_eq!(info.color, "Rgb8");
        assert!(info.file_size > 0);
    }

    #[test]
    fn test_save_writes_toml_named_after_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slide_01.png");
        RgbImage::from_pixel(3, 2, Rgb([9, 9, 9])).save(&path).unwrap();

        let meta_dir = dir.path().join("meta");
        let written = SlideInfo::read(&path).unwrap().save(&meta_dir).unwrap();
        assert_eq!(written, meta_dir.join("slide_01.toml"));

        let table: toml::Table = std::fs::read_to_string(&written).unwrap().parse().unwrap();
        assert_eq!(table["width"].as_integer(), Some(3));
        assert_eq!(table["height"].as_integer(), Some(2));
        assert_eq!(table["channels"].as_integer(), Some(3));
    }

    #[test]
    fn test_default_meta_dir() {
        let dir = tempfile::tempdir().unwrap();
        let slides = dir.path().join("slides");
        std::fs::create_dir(&slides).unwrap();

        assert_eq!(default_meta_dir(&slides), dir.path().join("meta"));
        assert_eq!(default_meta_dir(&slides.join("a.png")), dir.path().join("meta"));
    }

    #[test]
    fn test_undecodable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(matches!(SlideInfo::read(&path), Err(PatchError::InvalidInput(_))));
    }
}
