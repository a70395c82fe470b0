//! Stain matrix estimation
//!
//! A stain matrix has one row per stain and one column per RGB channel;
//! each row is the unit optical density vector of that stain. For H&E the
//! haematoxylin row comes first.

use log::debug;
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{arr2, Array2, ArrayView3, Axis};

use crate::errors::{PatchError, PatchResult};

use super::conversion::{luminosity_tissue_mask, percentile, rgb_to_od};

/// Lightness below which a pixel counts as tissue
pub const LUMINOSITY_THRESHOLD: f64 = 0.8;

/// Interface implemented by every stain matrix estimator
pub trait StainExtractor: Send + Sync {
    /// Estimate the stain matrix of an RGB image
    fn get_stain_matrix(&self, image: ArrayView3<u8>) -> PatchResult<Array2<f64>>;
}

/// Scale every row of `matrix` to unit length, leaving zero rows alone
pub fn normalize_rows(mut matrix: Array2<f64>) -> Array2<f64> {
    for mut row in matrix.axis_iter_mut(Axis(0)) {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|v| v / norm);
        }
    }
    matrix
}

/// Optical densities of the tissue pixels of `image`
fn tissue_optical_density(image: ArrayView3<u8>, threshold: f64) -> PatchResult<Array2<f64>> {
    let mask = luminosity_tissue_mask(image, threshold)?;
    let od = rgb_to_od(image)?;
    let keep: Vec<usize> = mask.iter().enumerate().filter(|(_, &m)| m).map(|(i, _)| i).collect();
    debug!("{} of {} pixels pass the luminosity mask", keep.len(), mask.len());
    Ok(od.select(Axis(0), &keep))
}

/// Two stain vectors ordered haematoxylin first
///
/// Haematoxylin absorbs more red light, so the vector with the larger red
/// component goes in the first row.
fn he_in_order(first: [f64; 3], second: [f64; 3]) -> Array2<f64> {
    let (h, e) = if first[0] > second[0] { (first, second) } else { (second, first) };
    arr2(&[h, e])
}

/// Fixed stain matrix supplied by the caller
#[derive(Debug, Clone)]
pub struct CustomExtractor {
    stain_matrix: Array2<f64>,
}

impl CustomExtractor {
    /// Create an extractor that always returns `stain_matrix`
    ///
    /// The matrix must be (stains, 3) with 1 to 3 stains.
    pub fn new(stain_matrix: Array2<f64>) -> PatchResult<Self> {
        let (stains, channels) = stain_matrix.dim();
        if channels != 3 || !(1..=3).contains(&stains) {
            return Err(PatchError::InvalidInput(format!(
                "Stain matrix must have shape (1..=3, 3), got ({}, {})", stains, channels
            )));
        }
        if stain_matrix.iter().any(|v| !v.is_finite()) {
            return Err(PatchError::InvalidInput("Stain matrix contains non-finite values".to_string()));
        }
        Ok(CustomExtractor { stain_matrix })
    }
}

impl StainExtractor for CustomExtractor {
    fn get_stain_matrix(&self, _image: ArrayView3<u8>) -> PatchResult<Array2<f64>> {
        Ok(self.stain_matrix.clone())
    }
}

/// Ruifrok and Johnston's reference H&E optical densities
#[derive(Debug, Clone, Copy, Default)]
pub struct RuifrokExtractor;

impl RuifrokExtractor {
    /// Reference H&E stain matrix, haematoxylin first
    pub fn reference_matrix() -> Array2<f64> {
        arr2(&[[0.65, 0.70, 0.29], [0.07, 0.99, 0.11]])
    }
}

impl StainExtractor for RuifrokExtractor {
    fn get_stain_matrix(&self, _image: ArrayView3<u8>) -> PatchResult<Array2<f64>> {
        Ok(RuifrokExtractor::reference_matrix())
    }
}

/// Macenko's angular extreme estimator
///
/// Tissue optical densities are projected onto the plane of their two
/// principal eigenvectors; the stain vectors are the directions at the
/// low and high percentiles of the projected angle.
#[derive(Debug, Clone, Copy)]
pub struct MacenkoExtractor {
    pub luminosity_threshold: f64,
    pub angular_percentile: f64,
}

impl Default for MacenkoExtractor {
    fn default() -> Self {
        MacenkoExtractor { luminosity_threshold: LUMINOSITY_THRESHOLD, angular_percentile: 99.0 }
    }
}

/// Sample covariance of the columns of a (samples, 3) matrix
fn covariance(od: &Array2<f64>) -> DMatrix<f64> {
    let n = od.nrows();
    let mean = od.mean_axis(Axis(0)).unwrap_or_else(|| ndarray::Array1::zeros(3));
    let denom = if n > 1 { (n - 1) as f64 } else { 1.0 };

    let mut cov = DMatrix::zeros(3, 3);
    for row in od.rows() {
        for i in 0..3 {
            for j in 0..3 {
                cov[(i, j)] += (row[i] - mean[i]) * (row[j] - mean[j]);
            }
        }
    }
    cov / denom
}

impl StainExtractor for MacenkoExtractor {
    fn get_stain_matrix(&self, image: ArrayView3<u8>) -> PatchResult<Array2<f64>> {
        let od = tissue_optical_density(image, self.luminosity_threshold)?;

        let eigen = SymmetricEigen::new(covariance(&od));
        let mut order: Vec<usize> = (0..3).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

        // two principal eigenvectors, pointing into positive red density
        let basis: Vec<[f64; 3]> = order[..2]
            .iter()
            .map(|&k| {
                let column = eigen.eigenvectors.column(k);
                let sign = if column[0] < 0.0 { -1.0 } else { 1.0 };
                [sign * column[0], sign * column[1], sign * column[2]]
            })
            .collect();

        let angles: Vec<f64> = od
            .rows()
            .into_iter()
            .map(|px| {
                let x: f64 = (0..3).map(|i| px[i] * basis[0][i]).sum();
                let y: f64 = (0..3).map(|i| px[i] * basis[1][i]).sum();
                y.atan2(x)
            })
            .collect();

        let empty = || PatchError::InvalidInput("No tissue pixels to estimate stains from".to_string());
        let min_phi = percentile(&angles, 100.0 - self.angular_percentile).ok_or_else(empty)?;
        let max_phi = percentile(&angles, self.angular_percentile).ok_or_else(empty)?;
        debug!("Macenko angles span {:.4} to {:.4}", min_phi, max_phi);

        let direction = |phi: f64| -> [f64; 3] {
            let (sin, cos) = phi.sin_cos();
            [0, 1, 2].map(|i| basis[0][i] * cos + basis[1][i] * sin)
        };

        Ok(normalize_rows(he_in_order(direction(min_phi), direction(max_phi))))
    }
}

/// Vahadane's sparse non-negative stain separation
///
/// Learns a two-atom non-negative dictionary of tissue optical densities
/// with an L1 penalty on the non-negative stain concentrations, by
/// alternating coordinate descent on the codes and the atoms.
#[derive(Debug, Clone, Copy)]
pub struct VahadaneExtractor {
    pub luminosity_threshold: f64,
    pub regularizer: f64,
    pub iterations: usize,
}

impl Default for VahadaneExtractor {
    fn default() -> Self {
        VahadaneExtractor { luminosity_threshold: LUMINOSITY_THRESHOLD, regularizer: 0.1, iterations: 50 }
    }
}

const CODE_SWEEPS: usize = 10;

impl VahadaneExtractor {
    /// Non-negative lasso codes of every sample for the current dictionary
    fn update_codes(&self, od: &Array2<f64>, dictionary: &Array2<f64>, codes: &mut Array2<f64>) {
        let gram = dictionary.dot(&dictionary.t());
        let correlation = od.dot(&dictionary.t());
        let atoms = dictionary.nrows();

        for (mut code, corr) in codes.rows_mut().into_iter().zip(correlation.rows()) {
            for _ in 0..CODE_SWEEPS {
                for k in 0..atoms {
                    if gram[[k, k]] <= 0.0 {
                        code[k] = 0.0;
                        continue;
                    }
                    let others: f64 = (0..atoms).filter(|&j| j != k).map(|j| gram[[k, j]] * code[j]).sum();
                    code[k] = ((corr[k] - self.regularizer - others) / gram[[k, k]]).max(0.0);
                }
            }
        }
    }

    /// Block coordinate update of each atom, projected to non-negative unit vectors
    fn update_dictionary(od: &Array2<f64>, dictionary: &mut Array2<f64>, codes: &Array2<f64>) {
        let atoms = dictionary.nrows();
        for k in 0..atoms {
            let code_k = codes.column(k);
            let energy = code_k.dot(&code_k);
            if energy <= f64::EPSILON {
                continue;
            }

            let residual_dot = od.t().dot(&code_k) - dictionary.t().dot(&codes.t().dot(&code_k));
            let mut atom = dictionary.row(k).to_owned() + residual_dot / energy;
            atom.mapv_inplace(|v| v.max(0.0));

            let norm = atom.dot(&atom).sqrt();
            if norm > 0.0 {
                dictionary.row_mut(k).assign(&(atom / norm));
            }
        }
    }
}

impl StainExtractor for VahadaneExtractor {
    fn get_stain_matrix(&self, image: ArrayView3<u8>) -> PatchResult<Array2<f64>> {
        let od = tissue_optical_density(image, self.luminosity_threshold)?;

        let mut dictionary = normalize_rows(RuifrokExtractor::reference_matrix());
        let mut codes = Array2::zeros((od.nrows(), dictionary.nrows()));
        for _ in 0..self.iterations {
            self.update_codes(&od, &dictionary, &mut codes);
            VahadaneExtractor::update_dictionary(&od, &mut dictionary, &codes);
        }

        let row = |k: usize| [dictionary[[k, 0]], dictionary[[k, 1]], dictionary[[k, 2]]];
        Ok(normalize_rows(he_in_order(row(0), row(1))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stain::conversion::od_to_intensity;
    use ndarray::Array3;

    /// Image of pure haematoxylin, pure eosin and mixed columns under a blank strip
    fn synthetic_he(stains: &Array2<f64>) -> Array3<u8> {
        Array3::from_shape_fn((16, 16, 3), |(r, c, ch)| {
            if r < 2 {
                return 245;
            }
            let (h, e) = match c {
                0..=4 => (0.6 + 0.06 * r as f64, 0.0),
                11.. => (0.0, 0.6 + 0.06 * r as f64),
                _ => (0.4 + 0.1 * (c - 5) as f64, 0.4 + 0.05 * r as f64),
            };
            od_to_intensity(h * stains[[0, ch]] + e * stains[[1, ch]])
        })
    }

    fn unit_ruifrok() -> Array2<f64> {
        normalize_rows(RuifrokExtractor::reference_matrix())
    }

    fn angle_between(a: ndarray::ArrayView1<f64>, b: ndarray::ArrayView1<f64>) -> f64 {
        (a.dot(&b) / (a.dot(&a).sqrt() * b.dot(&b).sqrt())).clamp(-1.0, 1.0).acos()
    }

    #[test]
    fn test_custom_extractor_validates_shape() {
        assert!(CustomExtractor::new(Array2::zeros((2, 3))).is_ok());
        assert!(CustomExtractor::new(Array2::zeros((2, 4))).is_err());
        assert!(CustomExtractor::new(Array2::zeros((4, 3))).is_err());
    }

    #[test]
    fn test_macenko_recovers_synthetic_stains() {
        let stains = unit_ruifrok();
        let image = synthetic_he(&stains);
        let matrix = MacenkoExtractor::default().get_stain_matrix(image.view()).unwrap();

        assert_eq!(matrix.dim(), (2, 3));
        assert!(matrix[[0, 0]] > matrix[[1, 0]]);
        for k in 0..2 {
            let norm = matrix.row(k).dot(&matrix.row(k)).sqrt();
            assert!((norm - 1.0).abs() < 1e-9);
            assert!(angle_between(matrix.row(k), stains.row(k)) < 0.05);
        }
    }

    #[test]
    fn test_vahadane_gives_non_negative_he_matrix() {
        let stains = unit_ruifrok();
        let image = synthetic_he(&stains);
        let matrix = VahadaneExtractor::default().get_stain_matrix(image.view()).unwrap();

        assert_eq!(matrix.dim(), (2, 3));
        assert!(matrix.iter().all(|&v| v >= 0.0));
        assert!(matrix[[0, 0]] > matrix[[1, 0]]);
        assert!(angle_between(matrix.row(0), stains.row(0)) < 0.3);
    }

    #[test]
    fn test_blank_image_has_no_stains() {
        let blank = Array3::from_elem((4, 4, 3), 255u8);
        assert!(MacenkoExtractor::default().get_stain_matrix(blank.view()).is_err());
        assert!(VahadaneExtractor::default().get_stain_matrix(blank.view()).is_err());
    }
}
