//! Symmetric image padding
//!
//! Extends an image outward by mirroring its border, including the edge
//! pixel itself (`d c b a | a b c d | d c b a`). Pads wider than the image
//! keep reflecting, so the padded axis is the periodic extension of the
//! image and its mirror.

use ndarray::{Array3, ArrayView3};

use crate::errors::{PatchError, PatchResult};

/// Map an index in padded space back to a source index on an axis of length `len`
fn reflect_index(index: i64, len: i64) -> usize {
    let period = 2 * len;
    let m = index.rem_euclid(period);
    if m < len {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

/// Pad the spatial axes of an image symmetrically
///
/// `pad_y` rows are added above and below and `pad_x` columns left and
/// right. The channel axis is untouched.
///
/// # Arguments
/// * `image` - Image laid out as (rows, columns, channels)
/// * `pad_y` - Rows added on each side
/// * `pad_x` - Columns added on each side
///
/// # Returns
/// The padded image, or `InvalidInput` when asked to pad an empty axis
pub fn pad_symmetric<T: Clone>(image: ArrayView3<T>, pad_y: usize, pad_x: usize) -> PatchResult<Array3<T>> {
    let (rows, cols, channels) = image.dim();

    if (rows == 0 && pad_y > 0) || (cols == 0 && pad_x > 0) {
        return Err(PatchError::InvalidInput(format!(
            "Cannot pad an empty image of shape ({}, {}, {})", rows, cols, channels
        )));
    }

    let out_rows = rows + 2 * pad_y;
    let out_cols = cols + 2 * pad_x;

    Ok(Array3::from_shape_fn((out_rows, out_cols, channels), |(r, c, ch)| {
        let src_r = reflect_index(r as i64 - pad_y as i64, rows as i64);
        let src_c = reflect_index(c as i64 - pad_x as i64, cols as i64);
        image[[src_r, src_c, ch]].clone()
    }))
}
