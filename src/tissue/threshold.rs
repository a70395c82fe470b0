//! Grey conversion and Otsu thresholding

use ndarray::{Array2, ArrayView3, Axis};

use crate::errors::{PatchError, PatchResult};

/// Convert an image to 8-bit grey
///
/// RGB(A) uses the fixed-point BT.601 weights (0.299, 0.587, 0.114) with
/// round-half-up; single-channel and luma-alpha images use their first
/// channel as is.
pub fn rgb_to_grey(image: ArrayView3<u8>) -> PatchResult<Array2<u8>> {
    let (rows, cols, channels) = image.dim();
    match channels {
        1 | 2 => Ok(image.index_axis(Axis(2), 0).to_owned()),
        3 | 4 => Ok(Array2::from_shape_fn((rows, cols), |(r, c)| {
            let red = image[[r, c, 0]] as u32;
            let green = image[[r, c, 1]] as u32;
            let blue = image[[r, c, 2]] as u32;
            ((red * 4899 + green * 9617 + blue * 1868 + (1 << 13)) >> 14) as u8
        })),
        _ => Err(PatchError::InvalidInput(format!(
            "Cannot convert an image with {} channels to grey", channels
        ))),
    }
}

/// Otsu threshold of a set of grey values
///
/// The histogram spans the observed value range with one bin per value.
/// The returned threshold is the bin that maximises the between-class
/// variance, taking the first one on ties; values strictly below it form
/// the dark class. A constant input returns that constant, an empty input
/// returns `None`.
pub fn threshold_otsu<I: IntoIterator<Item = u8>>(values: I) -> Option<u8> {
    let mut counts = [0u64; 256];
    for value in values {
        counts[value as usize] += 1;
    }

    let min = counts.iter().position(|&c| c > 0)?;
    let max = counts.iter().rposition(|&c| c > 0)?;
    if min == max {
        return Some(min as u8);
    }

    let hist = &counts[min..=max];
    let bins = hist.len();
    let center = |i: usize| (min + i) as f64;

    let mut weight1 = vec![0.0f64; bins];
    let mut mean1 = vec![0.0f64; bins];
    let (mut weight, mut moment) = (0.0, 0.0);
    for i in 0..bins {
        weight += hist[i] as f64;
        moment += hist[i] as f64 * center(i);
        weight1[i] = weight;
        mean1[i] = moment / weight;
    }

    let mut weight2 = vec![0.0f64; bins];
    let mut mean2 = vec![0.0f64; bins];
    let (mut weight, mut moment) = (0.0, 0.0);
    for i in (0..bins).rev() {
        weight += hist[i] as f64;
        moment += hist[i] as f64 * center(i);
        weight2[i] = weight;
        mean2[i] = moment / weight;
    }

    let mut best = 0;
    let mut best_variance = f64::MIN;
    for i in 0..bins - 1 {
        let diff = mean1[i] - mean2[i + 1];
        let variance = weight1[i] * weight2[i + 1] * diff * diff;
        if variance > best_variance {
            best_variance = variance;
            best = i;
        }
    }

    Some((min + best) as u8)
}
