//! Reading rectangular regions
//!
//! Bounds are given as `(start_x, start_y, end_x, end_y)` in baseline
//! pixels with exclusive ends. Parts of the region that fall outside the
//! image are filled with zeros.

use image::imageops::FilterType;
use log::debug;
use ndarray::{s, Array3, ArrayView3};

use crate::errors::{PatchError, PatchResult};
use crate::extractor::Pixel;

/// Region read when none is given
pub const DEFAULT_BOUNDS: [i64; 4] = [0, 0, 2000, 2000];

/// Rectangle in baseline pixel coordinates, ends exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub start_x: i64,
    pub start_y: i64,
    pub end_x: i64,
    pub end_y: i64,
}

impl Bounds {
    /// Create bounds, rejecting empty or inverted rectangles
    pub fn new(start_x: i64, start_y: i64, end_x: i64, end_y: i64) -> PatchResult<Self> {
        if end_x <= start_x || end_y <= start_y {
            return Err(PatchError::InvalidInput(format!(
                "Bounds ({}, {}, {}, {}) must have end > start on both axes", start_x, start_y, end_x, end_y
            )));
        }
        Ok(Bounds { start_x, start_y, end_x, end_y })
    }

    /// Create bounds from a `[start_x, start_y, end_x, end_y]` slice
    pub fn from_slice(values: &[i64]) -> PatchResult<Self> {
        match values {
            [start_x, start_y, end_x, end_y] => Bounds::new(*start_x, *start_y, *end_x, *end_y),
            _ => Err(PatchError::InvalidInput(format!(
                "Bounds need 4 values (start_x start_y end_x end_y), got {}", values.len()
            ))),
        }
    }

    pub fn width(&self) -> u64 {
        self.end_x.abs_diff(self.start_x)
    }

    pub fn height(&self) -> u64 {
        self.end_y.abs_diff(self.start_y)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        let [start_x, start_y, end_x, end_y] = DEFAULT_BOUNDS;
        Bounds { start_x, start_y, end_x, end_y }
    }
}

/// Units a read resolution is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    /// Pyramid level; plain images only have level 0
    Level,
    /// Scale factor relative to the baseline image
    Baseline,
    /// Microns per pixel
    Mpp,
    /// Objective power
    Power,
}

impl Units {
    /// Parse a unit name, case-insensitively
    pub fn from_name(name: &str) -> PatchResult<Self> {
        match name.trim().to_lowercase().as_str() {
            "level" => Ok(Units::Level),
            "baseline" => Ok(Units::Baseline),
            "mpp" => Ok(Units::Mpp),
            "power" => Ok(Units::Power),
            _ => Err(PatchError::UnsupportedMethod(format!("Unknown resolution units: {}", name))),
        }
    }
}

/// Scale factor from baseline pixels to output pixels
///
/// Plain images carry no microns-per-pixel or objective power metadata,
/// so only level 0 and baseline scale factors can be honoured.
pub fn scale_for(resolution: f64, units: Units) -> PatchResult<f64> {
    match units {
        Units::Level if resolution == 0.0 => Ok(1.0),
        Units::Level => Err(PatchError::InvalidInput(format!(
            "Level {} does not exist, plain images only have level 0", resolution
        ))),
        // resolution 0 is the default and means "as stored"
        Units::Baseline if resolution == 0.0 => Ok(1.0),
        Units::Baseline if resolution.is_finite() && resolution > 0.0 => Ok(resolution),
        Units::Baseline => Err(PatchError::InvalidInput(format!(
            "Baseline scale must be positive, got {}", resolution
        ))),
        Units::Mpp | Units::Power => Err(PatchError::UnsupportedOperation(format!(
            "{:?} resolutions need scan metadata, which plain images do not have", units
        ))),
    }
}

/// Copy the part of `image` inside `bounds`, zero-filling the rest
pub fn read_bounds_baseline<T: Pixel>(image: ArrayView3<T>, bounds: Bounds) -> PatchResult<Array3<T>> {
    let (rows, cols, channels) = image.dim();
    let out_h = usize::try_from(bounds.height())
        .map_err(|_| PatchError::InvalidInput("Region height does not fit in memory".to_string()))?;
    let out_w = usize::try_from(bounds.width())
        .map_err(|_| PatchError::InvalidInput("Region width does not fit in memory".to_string()))?;

    let fits = out_h
        .checked_mul(out_w)
        .and_then(|n| n.checked_mul(channels.max(1)))
        .is_some_and(|n| n <= isize::MAX as usize);
    if !fits {
        return Err(PatchError::InvalidInput(format!("Region {:?} is too large to read", bounds)));
    }

    let mut region = Array3::<T>::default((out_h, out_w, channels));

    let src_y0 = bounds.start_y.clamp(0, rows as i64);
    let src_y1 = bounds.end_y.clamp(0, rows as i64);
    let src_x0 = bounds.start_x.clamp(0, cols as i64);
    let src_x1 = bounds.end_x.clamp(0, cols as i64);

    if src_y1 > src_y0 && src_x1 > src_x0 {
        // both differences are within 0..=out_h / 0..=out_w after clamping
        let dst_y0 = (src_y0 - bounds.start_y) as usize;
        let dst_x0 = (src_x0 - bounds.start_x) as usize;
        let h = (src_y1 - src_y0) as usize;
        let w = (src_x1 - src_x0) as usize;

        region
            .slice_mut(s![dst_y0..dst_y0 + h, dst_x0..dst_x0 + w, ..])
            .assign(&image.slice(s![src_y0 as usize..src_y1 as usize, src_x0 as usize..src_x1 as usize, ..]));
    } else {
        debug!("Bounds {:?} do not overlap the {}x{} image", bounds, rows, cols);
    }

    Ok(region)
}

/// Read a region at the requested resolution
///
/// # Arguments
/// * `image` - Baseline image as (rows, columns, channels)
/// * `bounds` - Region in baseline pixels
/// * `resolution` - Resolution value, interpreted according to `units`
/// * `units` - Units of `resolution`
pub fn read_bounds(image: ArrayView3<u8>, bounds: Bounds, resolution: f64, units: Units) -> PatchResult<Array3<u8>> {
    let scale = scale_for(resolution, units)?;
    let region = read_bounds_baseline(image, bounds)?;
    if scale == 1.0 {
        return Ok(region);
    }

    let (rows, cols, _) = region.dim();
    let out_w = ((cols as f64 * scale).round() as u32).max(1);
    let out_h = ((rows as f64 * scale).round() as u32).max(1);
    debug!("Resizing region from {}x{} to {}x{}", cols, rows, out_w, out_h);

    let resized = u8::patch_to_image(region.view())?.resize_exact(out_w, out_h, FilterType::Triangle);
    u8::array_from_image(resized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Array3<u8> {
        Array3::from_shape_fn((6, 8, 3), |(r, c, ch)| (10 * r + c + ch + 1) as u8)
    }

    #[test]
    fn test_bounds_validation() {
        assert!(Bounds::new(0, 0, 10, 10).is_ok());
        assert!(Bounds::new(5, 0, 5, 10).is_err());
        assert!(Bounds::from_slice(&[0, 0, 1]).is_err());
        assert_eq!(Bounds::default().width(), 2000);
    }

    #[test]
    fn test_inside_region_is_copied() {
        let image = ramp();
        let region = read_bounds_baseline(image.view(), Bounds::new(2, 1, 5, 4).unwrap()).unwrap();
        assert_eq!(region.dim(), (3, 3, 3));
        assert_eq!(region, image.slice(s![1..4, 2..5, ..]));
    }

    #[test]
    fn test_region_past_edges_is_zero_filled() {
        let image = ramp();
        let region = read_bounds_baseline(image.view(), Bounds::new(-2, -1, 3, 2).unwrap()).unwrap();
        assert_eq!(region.dim(), (3, 5, 3));
        assert!(region.slice(s![0, .., ..]).iter().all(|&v| v == 0));
        assert!(region.slice(s![.., 0..2, ..]).iter().all(|&v| v == 0));
        assert_eq!(region.slice(s![1..3, 2..5, ..]), image.slice(s![0..2, 0..3, ..]));
    }

    #[test]
    fn test_region_outside_image_is_blank() {
        let region = read_bounds_baseline(ramp().view(), Bounds::new(100, 100, 104, 102).unwrap()).unwrap();
        assert_eq!(region.dim(), (2, 4, 3));
        assert!(region.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_oversized_region_rejected() {
        let bounds = Bounds::new(0, 0, i64::MAX, i64::MAX).unwrap();
        assert!(matches!(read_bounds_baseline(ramp().view(), bounds), Err(PatchError::InvalidInput(_))));
    }

    #[test]
    fn test_resolution_units() {
        assert_eq!(scale_for(0.0, Units::Level).unwrap(), 1.0);
        assert!(scale_for(1.0, Units::Level).is_err());
        assert_eq!(scale_for(0.5, Units::Baseline).unwrap(), 0.5);
        assert!(matches!(scale_for(0.5, Units::Mpp), Err(PatchError::UnsupportedOperation(_))));
        assert!(matches!(Units::from_name("furlong"), Err(PatchError::UnsupportedMethod(_))));
    }

    #[test]
    fn test_baseline_scale_resizes() {
        let image = ramp();
        let region = read_bounds(image.view(), Bounds::new(0, 0, 8, 6).unwrap(), 0.5, Units::Baseline).unwrap();
        assert_eq!(region.dim(), (3, 4, 3));
    }
}
