//! Point-centered patch extraction
//!
//! Extracts a small grid of patches around each labeled point. With
//! `num_examples_per_patch = 9` every point yields a 3x3 grid of patches
//! whose centers are shifted by -1, 0 and +1 pixels on each axis.

use log::{debug, info};
use ndarray::{s, Array4, ArrayView3};

use crate::errors::{PatchError, PatchResult};
use crate::points::PointSet;

use super::extractor_strategy::{PatchConfig, PatchExtractor, PatchStrategy};
use super::geometry::sample_offsets;
use super::image_input::{ImageInput, Pixel};
use super::padding::pad_symmetric;
use super::patch_set::ExtractionResult;

/// Default number of patches sampled around each point
pub const DEFAULT_EXAMPLES_PER_POINT: usize = 9;

/// Padded index of a 1-indexed coordinate, `None` on overflow
fn padded_center(coordinate: i64, pad: usize) -> Option<i64> {
    coordinate.checked_add(i64::try_from(pad).ok()?)?.checked_sub(1)
}

/// Half-open window of `size` pixels around `center - offset`, `None` on overflow
fn window_bounds(center: i64, offset: i64, half: i64, size: usize) -> Option<(i64, i64)> {
    let start = center.checked_sub(offset)?.checked_sub(half)?;
    let end = start.checked_add(i64::try_from(size).ok()?)?;
    Some((start, end))
}

/// Extractor producing patches centered on labeled points
///
/// `num_examples_per_patch` should be the square of an odd number (1, 9,
/// 25, ...) for the sampling grid to be centered on the point. Padding must
/// be large enough for every window to stay inside the padded image, i.e.
/// at least `patch_size / 2 + sqrt(num_examples_per_patch) / 2` per axis.
#[derive(Debug, Clone)]
pub struct PointsPatchExtractor {
    config: PatchConfig,
    input_points: Option<PointSet>,
    num_examples_per_patch: usize,
}

impl PointsPatchExtractor {
    /// Create a new point-centered extractor
    ///
    /// # Arguments
    /// * `config` - Patch size and symmetric padding
    /// * `input_points` - Points to extract around; extraction fails without them
    /// * `num_examples_per_patch` - Patches sampled per point
    pub fn new(config: PatchConfig, input_points: Option<PointSet>, num_examples_per_patch: usize) -> Self {
        PointsPatchExtractor {
            config,
            input_points,
            num_examples_per_patch,
        }
    }

    /// Number of patches a single point produces with the current grid
    fn patches_per_point(&self) -> usize {
        let side = sample_offsets(self.num_examples_per_patch).count();
        side * side
    }

    fn extract_from_view<T: Pixel>(&self, image: ArrayView3<T>, points: &PointSet) -> PatchResult<ExtractionResult<T>> {
        let patch_h = self.config.patch_height;
        let patch_w = self.config.patch_width;
        let pad_y = self.config.pad_y;
        let pad_x = self.config.pad_x;

        let padded = pad_symmetric(image, pad_y, pad_x)?;
        let (img_h, img_w, img_d) = padded.dim();
        debug!("Padded image to {}x{}x{}", img_h, img_w, img_d);

        let offsets = sample_offsets(self.num_examples_per_patch);
        let num_patches = points.len() * self.patches_per_point();

        let mut patches = Array4::<T>::default((num_patches, patch_h, patch_w, img_d));
        let mut labels = Vec::with_capacity(num_patches);
        let mut ids = Vec::with_capacity(num_patches);

        let half_h = ((patch_h - 1) / 2) as i64;
        let half_w = ((patch_w - 1) / 2) as i64;

        let mut cell_id: u32 = 1;
        let mut iter_tot = 0;
        for point in points {
            let outside = || PatchError::InvalidInput(format!(
                "Patch window for point '{}' at ({}, {}) falls outside the padded {}x{} image, increase padding",
                point.label, point.x, point.y, img_h, img_w
            ));

            // Point sources are 1-indexed
            let row = padded_center(point.y, pad_y).ok_or_else(outside)?;
            let col = padded_center(point.x, pad_x).ok_or_else(outside)?;

            for h in offsets.clone() {
                for w in offsets.clone() {
                    let (start_h, end_h) = window_bounds(row, h, half_h, patch_h).ok_or_else(outside)?;
                    let (start_w, end_w) = window_bounds(col, w, half_w, patch_w).ok_or_else(outside)?;

                    if start_h < 0 || start_w < 0 || end_h > img_h as i64 || end_w > img_w as i64 {
                        debug!("Window rows {}..{} cols {}..{} rejected", start_h, end_h, start_w, end_w);
                        return Err(outside());
                    }

                    let window = padded.slice(s![
                        start_h as usize..end_h as usize,
                        start_w as usize..end_w as usize,
                        ..
                    ]);
                    patches.slice_mut(s![iter_tot, .., .., ..]).assign(&window);
                    labels.push(point.label.clone());
                    ids.push(cell_id);
                    iter_tot += 1;
                }
            }

            cell_id += 1;
        }

        info!("Extracted {} patches around {} points", iter_tot, points.len());
        ExtractionResult::from_parts(patches, labels, ids)
    }
}

impl<T: Pixel> PatchExtractor<T> for PointsPatchExtractor {
    fn config(&self) -> &PatchConfig {
        &self.config
    }

    fn strategy(&self) -> PatchStrategy {
        PatchStrategy::Point
    }

    fn extract_patches(&self, image: ImageInput<'_, T>) -> PatchResult<ExtractionResult<T>> {
        let points = self.input_points.as_ref().ok_or_else(|| {
            PatchError::InvalidInput("Please input correct csv, json path or points data".to_string())
        })?;

        let resolved = image.resolve()?;
        self.extract_from_view(resolved.view(), points)
    }

    fn merge_patches(&self, _patches: &ExtractionResult<T>) -> PatchResult<ndarray::Array3<T>> {
        Err(PatchError::UnsupportedOperation(
            "Merge patches not supported for PointsPatchExtractor".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::Point;
    use ndarray::Array3;

    fn config(patch: usize, pad: usize) -> PatchConfig {
        PatchConfig::new(patch, patch, pad, pad).unwrap()
    }

    fn gradient_image() -> Array3<u8> {
        Array3::from_shape_fn((20, 20, 3), |(r, c, ch)| ((r * 20 + c + ch) % 251) as u8)
    }

    #[test]
    fn test_patch_count_and_shape() {
        let points: PointSet = vec![Point::new("a", 8, 8), Point::new("b", 12, 10)].into();
        let extractor = PointsPatchExtractor::new(config(5, 4), Some(points), 9);
        let image = gradient_image();

        let result = PatchExtractor::<u8>::extract_patches(&extractor, ImageInput::from(&image)).unwrap();
        assert_eq!(result.patches.dim(), (18, 5, 5, 3));
        assert_eq!(result.labels.len(), 18);
        assert_eq!(result.ids.len(), 18);
    }

    #[test]
    fn test_single_example_window_matches_padded_coordinates() {
        let points: PointSet = vec![Point::new("a", 6, 9)].into();
        let extractor = PointsPatchExtractor::new(config(3, 2), Some(points), 1);
        let image = gradient_image();

        let result = PatchExtractor::<u8>::extract_patches(&extractor, ImageInput::from(&image)).unwrap();
        // Padded center (9 + 2 - 1, 6 + 2 - 1) = (10, 7) is unpadded (8, 5)
        let patch = result.patch(0).unwrap();
        assert_eq!(patch.slice(s![1, 1, ..]), image.slice(s![8, 5, ..]));
        assert_eq!(patch.slice(s![0, 0, ..]), image.slice(s![7, 4, ..]));
    }

    #[test]
    fn test_offsets_row_major_and_reversed() {
        let points: PointSet = vec![Point::new("a", 10, 10)].into();
        let extractor = PointsPatchExtractor::new(config(1, 2), Some(points), 9);
        let image = gradient_image();

        let result = PatchExtractor::<u8>::extract_patches(&extractor, ImageInput::from(&image)).unwrap();
        // Offsets h, w run -1..=1 and the window is centered at point - offset
        let center = (9i64, 9i64);
        let mut index = 0;
        for h in -1i64..=1 {
            for w in -1i64..=1 {
                let (r, c) = ((center.0 - h) as usize, (center.1 - w) as usize);
                assert_eq!(result.patches[[index, 0, 0, 0]], image[[r, c, 0]]);
                index += 1;
            }
        }
    }

    #[test]
    fn test_window_outside_padded_image_fails() {
        let points: PointSet = vec![Point::new("edge", 1, 1)].into();
        let extractor = PointsPatchExtractor::new(config(7, 0), Some(points), 1);
        let image = gradient_image();

        let err = PatchExtractor::<u8>::extract_patches(&extractor, ImageInput::from(&image)).unwrap_err();
        assert!(matches!(err, PatchError::InvalidInput(_)));
    }

    #[test]
    fn test_extreme_coordinates_fail_without_overflow() {
        let far = crate::points::parse_points_json(r#"[{"label": "far", "x": 1e30, "y": 5}]"#).unwrap();
        let extractor = PointsPatchExtractor::new(config(3, 4), Some(far), 1);
        let image = Array3::<u8>::zeros((10, 10, 3));

        let err = PatchExtractor::<u8>::extract_patches(&extractor, ImageInput::from(&image)).unwrap_err();
        assert!(matches!(err, PatchError::InvalidInput(_)));

        let points: PointSet = vec![Point::new("low", 5, i64::MIN), Point::new("high", i64::MAX, 5)].into();
        for point in &points {
            let single: PointSet = vec![point.clone()].into();
            let extractor = PointsPatchExtractor::new(config(3, 4), Some(single), 9);
            let err = PatchExtractor::<u8>::extract_patches(&extractor, ImageInput::from(&image)).unwrap_err();
            assert!(matches!(err, PatchError::InvalidInput(_)), "point {:?}", point);
        }
    }

    #[test]
    fn test_window_bounds_overflow() {
        assert_eq!(window_bounds(10, -1, 2, 5), Some((9, 14)));
        assert_eq!(window_bounds(i64::MAX, -1, 0, 1), None);
        assert_eq!(window_bounds(i64::MIN, 1, 0, 1), None);
        assert_eq!(padded_center(i64::MAX, 4), None);
        assert_eq!(padded_center(1, 4), Some(4));
    }

    #[test]
    fn test_missing_points_is_invalid_input() {
        let extractor = PointsPatchExtractor::new(config(3, 2), None, 1);
        let image = gradient_image();

        let err = PatchExtractor::<u8>::extract_patches(&extractor, ImageInput::from(&image)).unwrap_err();
        assert!(matches!(err, PatchError::InvalidInput(_)));
    }

    #[test]
    fn test_empty_point_set_gives_empty_result() {
        let extractor = PointsPatchExtractor::new(config(3, 2), Some(PointSet::new()), 9);
        let image = gradient_image();

        let result = PatchExtractor::<u8>::extract_patches(&extractor, ImageInput::from(&image)).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.patches.dim(), (0, 3, 3, 3));
    }

    #[test]
    fn test_merge_patches_unsupported() {
        let extractor = PointsPatchExtractor::new(config(3, 2), None, 1);
        let empty = ExtractionResult::<u8>::from_parts(Array4::zeros((0, 3, 3, 3)), vec![], vec![]).unwrap();
        assert!(matches!(
            extractor.merge_patches(&empty),
            Err(PatchError::UnsupportedOperation(_))
        ));
    }
}
