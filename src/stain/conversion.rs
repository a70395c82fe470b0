//! Colour space conversions used by stain normalisation
//!
//! Optical density follows Beer-Lambert: `od = -ln(rgb / 255)`. CIELAB
//! values use the sRGB primaries with a D65 white point, `L` in `0..=100`
//! and `a`, `b` centred on zero.

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};

use crate::errors::{PatchError, PatchResult};

/// Smallest optical density kept, so that background never reaches zero
pub const MIN_OPTICAL_DENSITY: f64 = 1e-6;

const WHITE_X: f64 = 0.950456;
const WHITE_Z: f64 = 1.088754;

/// Check that `image` is a 3-channel RGB array
pub fn ensure_rgb(image: &ArrayView3<u8>) -> PatchResult<()> {
    let channels = image.len_of(Axis(2));
    if channels != 3 {
        return Err(PatchError::InvalidInput(format!(
            "Stain operations need an RGB image, got {} channels", channels
        )));
    }
    Ok(())
}

/// Optical density of every pixel as a (pixels, 3) matrix
///
/// Zero intensities are read as 1 so the logarithm stays finite.
pub fn rgb_to_od(image: ArrayView3<u8>) -> PatchResult<Array2<f64>> {
    ensure_rgb(&image)?;
    let (rows, cols, _) = image.dim();
    Ok(Array2::from_shape_fn((rows * cols, 3), |(p, ch)| {
        let value = image[[p / cols, p % cols, ch]].max(1) as f64;
        (-(value / 255.0).ln()).max(MIN_OPTICAL_DENSITY)
    }))
}

/// Convert a single optical density value back to an 8-bit intensity
pub fn od_to_intensity(od: f64) -> u8 {
    (255.0 * (-od.max(MIN_OPTICAL_DENSITY)).exp()).clamp(0.0, 255.0) as u8
}

/// Rebuild a (rows, cols, 3) image from a (pixels, 3) optical density matrix
pub fn od_to_rgb(od: ArrayView2<f64>, rows: usize, cols: usize) -> PatchResult<Array3<u8>> {
    if od.dim() != (rows * cols, 3) {
        return Err(PatchError::InvalidInput(format!(
            "Optical density matrix {:?} does not match a {}x{} RGB image", od.dim(), rows, cols
        )));
    }
    Ok(Array3::from_shape_fn((rows, cols, 3), |(r, c, ch)| od_to_intensity(od[[r * cols + c, ch]])))
}

fn srgb_to_linear(value: f64) -> f64 {
    if value <= 0.04045 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(value: f64) -> f64 {
    if value <= 0.0031308 {
        value * 12.92
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

fn lab_f(t: f64) -> f64 {
    if t > 0.008856 {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn lab_f_inv(t: f64) -> f64 {
    let cube = t * t * t;
    if cube > 0.008856 {
        cube
    } else {
        (t - 16.0 / 116.0) / 7.787
    }
}

/// Convert one 8-bit RGB pixel to CIELAB
pub fn pixel_to_lab(rgb: [u8; 3]) -> [f64; 3] {
    let [r, g, b] = rgb.map(|v| srgb_to_linear(v as f64 / 255.0));

    let x = (0.412453 * r + 0.357580 * g + 0.180423 * b) / WHITE_X;
    let y = 0.212671 * r + 0.715160 * g + 0.072169 * b;
    let z = (0.019334 * r + 0.119193 * g + 0.950227 * b) / WHITE_Z;

    let (fx, fy, fz) = (lab_f(x), lab_f(y), lab_f(z));
    let lightness = if y > 0.008856 { 116.0 * fy - 16.0 } else { 903.3 * y };
    [lightness, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

/// Convert one CIELAB value back to 8-bit RGB, clipping out-of-gamut colours
pub fn lab_to_pixel(lab: [f64; 3]) -> [u8; 3] {
    let [lightness, a, b] = lab;
    let fy = (lightness + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;

    let x = lab_f_inv(fx) * WHITE_X;
    let y = if lightness > 903.3 * 0.008856 { fy * fy * fy } else { lightness / 903.3 };
    let z = lab_f_inv(fz) * WHITE_Z;

    let r = 3.240479 * x - 1.537150 * y - 0.498535 * z;
    let g = -0.969256 * x + 1.875992 * y + 0.041556 * z;
    let bl = 0.055648 * x - 0.204043 * y + 1.057311 * z;

    [r, g, bl].map(|v| (linear_to_srgb(v.clamp(0.0, 1.0)) * 255.0).round().clamp(0.0, 255.0) as u8)
}

/// CIELAB image of an RGB image
pub fn rgb_to_lab(image: ArrayView3<u8>) -> PatchResult<Array3<f64>> {
    ensure_rgb(&image)?;
    let (rows, cols, _) = image.dim();
    let mut lab = Array3::zeros((rows, cols, 3));
    for r in 0..rows {
        for c in 0..cols {
            let value = pixel_to_lab([image[[r, c, 0]], image[[r, c, 1]], image[[r, c, 2]]]);
            for (ch, v) in value.into_iter().enumerate() {
                lab[[r, c, ch]] = v;
            }
        }
    }
    Ok(lab)
}

/// RGB image of a CIELAB image
pub fn lab_to_rgb(lab: &Array3<f64>) -> Array3<u8> {
    let (rows, cols, _) = lab.dim();
    let mut rgb = Array3::zeros((rows, cols, 3));
    for r in 0..rows {
        for c in 0..cols {
            let value = lab_to_pixel([lab[[r, c, 0]], lab[[r, c, 1]], lab[[r, c, 2]]]);
            for (ch, v) in value.into_iter().enumerate() {
                rgb[[r, c, ch]] = v;
            }
        }
    }
    rgb
}

/// Pixels whose relative lightness `L / 100` is below `threshold`
///
/// # Returns
/// A flat mask in row-major pixel order, or `InvalidInput` when no pixel
/// qualifies
pub fn luminosity_tissue_mask(image: ArrayView3<u8>, threshold: f64) -> PatchResult<Vec<bool>> {
    ensure_rgb(&image)?;
    let mask: Vec<bool> = image
        .rows()
        .into_iter()
        .map(|px| pixel_to_lab([px[0], px[1], px[2]])[0] / 100.0 < threshold)
        .collect();

    if !mask.iter().any(|&m| m) {
        return Err(PatchError::InvalidInput(
            "Empty tissue mask computed, the image has no pixels darker than the luminosity threshold".to_string(),
        ));
    }
    Ok(mask)
}

/// Percentile of `values` with linear interpolation between ranks
///
/// `None` for an empty slice.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64))
}
