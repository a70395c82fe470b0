//! Patch grid geometry
//!
//! Helpers for computing where patches start when tiling one axis of an image.

/// Get the last location for patch extraction along one axis
///
/// The number of steps is rounded up so that the final, possibly partial,
/// step is covered. The returned offset may lie past the end of the image;
/// callers clip it to valid bounds. No validation is performed: a patch
/// larger than the image gives a negative or small result.
///
/// # Arguments
/// * `image_dim` - Length of the image along the axis
/// * `patch_dim` - Length of a patch along the axis
/// * `stride` - Step between consecutive patch origins
///
/// # Returns
/// The final patch start offset, truncated to an integer
pub fn get_last_steps(image_dim: i64, patch_dim: i64, stride: i64) -> i64 {
    let nr_step = ((image_dim - patch_dim) as f64 / stride as f64).ceil();
    let last_step = (nr_step + 1.0) * stride as f64;
    last_step as i64
}

/// Offsets of the per-point sampling grid along one axis
///
/// For `num_examples` samples the grid side is `sqrt(num_examples)`; the
/// returned half-open range `start..end` starts at `-floor(side / 2)` and
/// spans `floor(side)` values, so an odd perfect square gives offsets
/// centered on zero. A single example always maps to `0..1`.
pub fn sample_offsets(num_examples: usize) -> std::ops::Range<i64> {
    if num_examples > 1 {
        let root = (num_examples as f64).sqrt();
        let start = -((root / 2.0) as i64);
        let end = (root + start as f64) as i64;
        start..end
    } else {
        0..1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_steps_rounds_up() {
        // ceil((10 - 4) / 2) = 3 steps, (3 + 1) * 2 = 8
        assert_eq!(get_last_steps(10, 4, 2), 8);
        // ceil((11 - 4) / 2) = 4 steps, (4 + 1) * 2 = 10
        assert_eq!(get_last_steps(11, 4, 2), 10);
    }

    #[test]
    fn test_last_steps_exact_fit() {
        assert_eq!(get_last_steps(224, 224, 1), 1);
        assert_eq!(get_last_steps(100, 50, 50), 100);
    }

    #[test]
    fn test_last_steps_patch_larger_than_image() {
        // ceil(-6 / 4) = -1, (-1 + 1) * 4 = 0
        assert_eq!(get_last_steps(4, 10, 4), 0);
        // ceil(-9 / 2) = -4, (-4 + 1) * 2 = -6
        assert_eq!(get_last_steps(1, 10, 2), -6);
    }

    #[test]
    fn test_sample_offsets() {
        assert_eq!(sample_offsets(1), 0..1);
        assert_eq!(sample_offsets(9), -1..2);
        assert_eq!(sample_offsets(25), -2..3);
        assert_eq!(sample_offsets(0), 0..1);
    }

    #[test]
    fn test_sample_offsets_non_square() {
        // sqrt(8) = 2.83: start = -1, end = trunc(1.83) = 1
        assert_eq!(sample_offsets(8), -1..1);
        // sqrt(4) = 2: start = -1, end = 1, an off-center 2x2 grid
        assert_eq!(sample_offsets(4), -1..1);
    }
}
