//! Image sources for patch extraction
//!
//! An extractor accepts either an in-memory array or a path to an image
//! file. Files are decoded with the `image` crate into a
//! (rows, columns, channels) array whose element type is chosen by the
//! [`Pixel`] trait.

use std::fmt::Debug;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use image::{DynamicImage, ImageBuffer, Luma, LumaA, Rgb, Rgba};
use log::{debug, info};
use ndarray::{Array3, ArrayView3, ArrayViewD, Ix3};

use crate::errors::{PatchError, PatchResult};

/// Element type of an image array
///
/// Implemented for `u8`, `u16` and `f32`. Each implementation knows how to
/// decode an image file into its own precision, how to serialize itself
/// into little-endian NPY payloads and, where the format allows it, how to
/// turn a patch back into an encodable image.
pub trait Pixel: Copy + Default + Debug + PartialEq + Send + Sync + 'static {
    /// NumPy dtype descriptor used in NPY headers
    const NPY_DESCR: &'static str;

    /// Convert a decoded image into a (rows, columns, channels) array
    fn array_from_image(image: DynamicImage) -> PatchResult<Array3<Self>>;

    /// Write this value in little-endian byte order
    fn write_le<W: Write>(&self, writer: &mut W) -> io::Result<()>;

    /// Convert a (rows, columns, channels) patch into an image
    fn patch_to_image(patch: ArrayView3<Self>) -> PatchResult<DynamicImage>;
}

fn array_from_raw<T>(width: u32, height: u32, channels: usize, raw: Vec<T>) -> PatchResult<Array3<T>> {
    Array3::from_shape_vec((height as usize, width as usize, channels), raw)
        .map_err(|e| PatchError::InvalidInput(format!("Decoded image has inconsistent shape: {}", e)))
}

fn patch_dims<T>(patch: &ArrayView3<T>) -> PatchResult<(u32, u32, usize)> {
    let (rows, cols, channels) = patch.dim();
    if !(1..=4).contains(&channels) {
        return Err(PatchError::InvalidInput(format!(
            "Cannot encode a patch with {} channels as an image", channels
        )));
    }
    Ok((cols as u32, rows as u32, channels))
}

fn encode_error(width: u32, height: u32) -> PatchError {
    PatchError::GenericError(format!("Failed to build {}x{} image buffer", width, height))
}

impl Pixel for u8 {
    const NPY_DESCR: &'static str = "|u1";

    fn array_from_image(image: DynamicImage) -> PatchResult<Array3<u8>> {
        let (width, height) = (image.width(), image.height());
        match image.color().channel_count() {
            1 => array_from_raw(width, height, 1, image.into_luma8().into_raw()),
            2 => array_from_raw(width, height, 2, image.into_luma_alpha8().into_raw()),
            3 => array_from_raw(width, height, 3, image.into_rgb8().into_raw()),
            _ => array_from_raw(width, height, 4, image.into_rgba8().into_raw()),
        }
    }

    fn write_le<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u8(*self)
    }

    fn patch_to_image(patch: ArrayView3<u8>) -> PatchResult<DynamicImage> {
        let (width, height, channels) = patch_dims(&patch)?;
        let raw: Vec<u8> = patch.iter().copied().collect();
        let image = match channels {
            1 => ImageBuffer::<Luma<u8>, _>::from_raw(width, height, raw).map(DynamicImage::ImageLuma8),
            2 => ImageBuffer::<LumaA<u8>, _>::from_raw(width, height, raw).map(DynamicImage::ImageLumaA8),
            3 => ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, raw).map(DynamicImage::ImageRgb8),
            _ => ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, raw).map(DynamicImage::ImageRgba8),
        };
        image.ok_or_else(|| encode_error(width, height))
    }
}

impl Pixel for u16 {
    const NPY_DESCR: &'static str = "<u2";

    fn array_from_image(image: DynamicImage) -> PatchResult<Array3<u16>> {
        let (width, height) = (image.width(), image.height());
        match image.color().channel_count() {
            1 => array_from_raw(width, height, 1, image.into_luma16().into_raw()),
            2 => array_from_raw(width, height, 2, image.into_luma_alpha16().into_raw()),
            3 => array_from_raw(width, height, 3, image.into_rgb16().into_raw()),
            _ => array_from_raw(width, height, 4, image.into_rgba16().into_raw()),
        }
    }

    fn write_le<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u16::<LittleEndian>(*self)
    }

    fn patch_to_image(patch: ArrayView3<u16>) -> PatchResult<DynamicImage> {
        let (width, height, channels) = patch_dims(&patch)?;
        let raw: Vec<u16> = patch.iter().copied().collect();
        let image = match channels {
            1 => ImageBuffer::<Luma<u16>, _>::from_raw(width, height, raw).map(DynamicImage::ImageLuma16),
            2 => ImageBuffer::<LumaA<u16>, _>::from_raw(width, height, raw).map(DynamicImage::ImageLumaA16),
            3 => ImageBuffer::<Rgb<u16>, _>::from_raw(width, height, raw).map(DynamicImage::ImageRgb16),
            _ => ImageBuffer::<Rgba<u16>, _>::from_raw(width, height, raw).map(DynamicImage::ImageRgba16),
        };
        image.ok_or_else(|| encode_error(width, height))
    }
}

impl Pixel for f32 {
    const NPY_DESCR: &'static str = "<f4";

    fn array_from_image(image: DynamicImage) -> PatchResult<Array3<f32>> {
        let (width, height) = (image.width(), image.height());
        let scale = |v: u16| v as f32 / u16::MAX as f32;
        match image.color().channel_count() {
            // image has no float luma buffers; go through 16-bit
            1 => array_from_raw(width, height, 1, image.into_luma16().into_raw().into_iter().map(scale).collect()),
            2 => array_from_raw(width, height, 2, image.into_luma_alpha16().into_raw().into_iter().map(scale).collect()),
            3 => array_from_raw(width, height, 3, image.into_rgb32f().into_raw()),
            _ => array_from_raw(width, height, 4, image.into_rgba32f().into_raw()),
        }
    }

    fn write_le<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_f32::<LittleEndian>(*self)
    }

    fn patch_to_image(_patch: ArrayView3<f32>) -> PatchResult<DynamicImage> {
        Err(PatchError::UnsupportedOperation(
            "Floating point patches cannot be saved as PNG, use the npy format".to_string(),
        ))
    }
}

/// Load an image file into a (rows, columns, channels) array
///
/// # Arguments
/// * `path` - Path to any format the `image` crate can decode
///
/// # Returns
/// The decoded array, or `InvalidInput` if the path does not resolve to a
/// decodable image
pub fn load_image<T: Pixel>(path: &Path) -> PatchResult<Array3<T>> {
    if !path.is_file() {
        return Err(PatchError::InvalidInput(format!(
            "Please input correct image path or array: {} is not a file", path.display()
        )));
    }

    info!("Loading image from {}", path.display());
    let image = image::open(path).map_err(|e| {
        PatchError::InvalidInput(format!("Could not decode image {}: {}", path.display(), e))
    })?;

    let array = T::array_from_image(image)?;
    debug!("Loaded image with shape {:?}", array.dim());
    Ok(array)
}

/// Load an image file as an 8-bit RGB array
///
/// Grey images are replicated to three channels and alpha is dropped.
pub fn load_rgb_image(path: &Path) -> PatchResult<Array3<u8>> {
    let image = image::open(path).map_err(|e| {
        PatchError::InvalidInput(format!("Could not decode image {}: {}", path.display(), e))
    })?;
    u8::array_from_image(DynamicImage::ImageRgb8(image.into_rgb8()))
}

/// Image argument accepted by patch extractors
#[derive(Debug, Clone)]
pub enum ImageInput<'a, T> {
    /// In-memory (rows, columns, channels) array
    Array(ArrayView3<'a, T>),
    /// Array of unknown dimensionality, checked to be 3-D at extraction time
    Dynamic(ArrayViewD<'a, T>),
    /// Image file to be loaded
    Path(PathBuf),
}

/// Either a borrowed view or an array loaded from disk
pub enum ResolvedImage<'a, T> {
    Borrowed(ArrayView3<'a, T>),
    Loaded(Array3<T>),
}

impl<'a, T> ResolvedImage<'a, T> {
    /// View of the image regardless of where it came from
    pub fn view(&self) -> ArrayView3<'_, T> {
        match self {
            ResolvedImage::Borrowed(view) => view.view(),
            ResolvedImage::Loaded(array) => array.view(),
        }
    }
}

impl<'a, T: Pixel> ImageInput<'a, T> {
    /// Resolve the input into an array, loading from disk when needed
    pub fn resolve(self) -> PatchResult<ResolvedImage<'a, T>> {
        match self {
            ImageInput::Array(view) => Ok(ResolvedImage::Borrowed(view)),
            ImageInput::Dynamic(view) => {
                let ndim = view.ndim();
                view.into_dimensionality::<Ix3>()
                    .map(ResolvedImage::Borrowed)
                    .map_err(|_| PatchError::InvalidInput(format!(
                        "Please input correct image path or array: expected 3 dimensions, got {}", ndim
                    )))
            },
            ImageInput::Path(path) => load_image(&path).map(ResolvedImage::Loaded),
        }
    }
}

impl<'a, T> From<ArrayView3<'a, T>> for ImageInput<'a, T> {
    fn from(view: ArrayView3<'a, T>) -> Self {
        ImageInput::Array(view)
    }
}

impl<'a, T> From<&'a Array3<T>> for ImageInput<'a, T> {
    fn from(array: &'a Array3<T>) -> Self {
        ImageInput::Array(array.view())
    }
}

impl<'a, T> From<ArrayViewD<'a, T>> for ImageInput<'a, T> {
    fn from(view: ArrayViewD<'a, T>) -> Self {
        ImageInput::Dynamic(view)
    }
}

impl<'a, T> From<&Path> for ImageInput<'a, T> {
    fn from(path: &Path) -> Self {
        ImageInput::Path(path.to_path_buf())
    }
}

impl<'a, T> From<PathBuf> for ImageInput<'a, T> {
    fn from(path: PathBuf) -> Self {
        ImageInput::Path(path)
    }
}

impl<'a, T> From<&str> for ImageInput<'a, T> {
    fn from(path: &str) -> Self {
        ImageInput::Path(PathBuf::from(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn test_rgb_roundtrip_through_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.png");

        let array = Array3::from_shape_fn((4, 5, 3), |(r, c, ch)| (r * 50 + c * 10 + ch) as u8);
        u8::patch_to_image(array.view()).unwrap().save(&path).unwrap();

        let loaded: Array3<u8> = load_image(&path).unwrap();
        assert_eq!(loaded, array);
    }

    #[test]
    fn test_grayscale_keeps_single_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");

        let array = Array3::from_shape_fn((3, 3, 1), |(r, c, _)| (r * 3 + c) as u8);
        u8::patch_to_image(array.view()).unwrap().save(&path).unwrap();

        let loaded: Array3<u8> = load_image(&path).unwrap();
        assert_eq!(loaded.dim(), (3, 3, 1));
    }

    #[test]
    fn test_rgb_loading_expands_grey() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");

        let array = Array3::from_shape_fn((2, 3, 1), |(r, c, _)| (r * 3 + c) as u8 * 20);
        u8::patch_to_image(array.view()).unwrap().save(&path).unwrap();

        let rgb = load_rgb_image(&path).unwrap();
        assert_eq!(rgb.dim(), (2, 3, 3));
        assert_eq!((rgb[[1, 2, 0]], rgb[[1, 2, 2]]), (100, 100));
    }

    #[test]
    fn test_missing_path_is_invalid_input() {
        let input: ImageInput<u8> = ImageInput::from("/definitely/not/here.png");
        assert!(matches!(input.resolve(), Err(PatchError::InvalidInput(_))));
    }

    #[test]
    fn test_undecodable_file_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.png");
        std::fs::write(&path, b"not an image").unwrap();

        assert!(matches!(load_image::<u8>(&path), Err(PatchError::InvalidInput(_))));
    }

    #[test]
    fn test_dynamic_input_must_be_3d() {
        let flat = ArrayD::<u8>::zeros(IxDyn(&[4, 4]));
        let input = ImageInput::from(flat.view());
        assert!(matches!(input.resolve(), Err(PatchError::InvalidInput(_))));

        let cube = ArrayD::<u8>::zeros(IxDyn(&[4, 4, 3]));
        let resolved = ImageInput::from(cube.view()).resolve().unwrap();
        assert_eq!(resolved.view().dim(), (4, 4, 3));
    }

    #[test]
    fn test_float_patches_cannot_be_encoded() {
        let patch = Array3::<f32>::zeros((2, 2, 3));
        assert!(matches!(
            f32::patch_to_image(patch.view()),
            Err(PatchError::UnsupportedOperation(_))
        ));
    }
}
