//! Stain normalisation
//!
//! A normaliser is fitted on a target image and then maps source images
//! onto the target's stain appearance.

use log::{debug, info};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, Array3, ArrayView3, Axis};

use crate::errors::{PatchError, PatchResult};

use super::conversion::{lab_to_rgb, percentile, rgb_to_lab, rgb_to_od};
use super::extractor::{
    CustomExtractor, MacenkoExtractor, RuifrokExtractor, StainExtractor, VahadaneExtractor,
};

/// Percentile of stain concentrations matched between source and target
const CONCENTRATION_PERCENTILE: f64 = 99.0;

/// Interface implemented by every stain normaliser
pub trait StainNormalizer: Send + Sync {
    /// Learn the stain appearance of `target`
    fn fit(&mut self, target: ArrayView3<u8>) -> PatchResult<()>;

    /// Map `image` onto the fitted target appearance
    fn transform(&self, image: ArrayView3<u8>) -> PatchResult<Array3<u8>>;
}

fn not_fitted() -> PatchError {
    PatchError::InvalidInput("Fit must be called with a target image before transform".to_string())
}

/// Stain concentrations of every pixel as a (pixels, stains) matrix
///
/// Solves `od = concentrations * stain_matrix` in the least-squares sense.
pub fn get_concentrations(image: ArrayView3<u8>, stain_matrix: &Array2<f64>) -> PatchResult<Array2<f64>> {
    let od = rgb_to_od(image)?;
    let (stains, channels) = stain_matrix.dim();
    if channels != 3 {
        return Err(PatchError::InvalidInput(format!(
            "Stain matrix must have 3 columns, got {}", channels
        )));
    }

    let transposed = DMatrix::from_fn(channels, stains, |i, j| stain_matrix[[j, i]]);
    let pinv = transposed
        .pseudo_inverse(1e-12)
        .map_err(|e| PatchError::InvalidInput(format!("Cannot invert stain matrix: {}", e)))?;
    let solve = Array2::from_shape_fn((stains, channels), |(i, j)| pinv[(i, j)]);

    Ok(od.dot(&solve.t()))
}

/// Per-stain percentile of a concentration matrix
fn max_concentrations(concentrations: &Array2<f64>) -> PatchResult<Array1<f64>> {
    concentrations
        .axis_iter(Axis(1))
        .map(|column| {
            let values: Vec<f64> = column.to_vec();
            percentile(&values, CONCENTRATION_PERCENTILE)
                .ok_or_else(|| PatchError::InvalidInput("Cannot normalise an empty image".to_string()))
        })
        .collect::<PatchResult<Vec<f64>>>()
        .map(Array1::from)
}

struct FittedStains {
    stain_matrix: Array2<f64>,
    max_concentrations: Array1<f64>,
}

/// Normaliser that swaps the source stain matrix for the target's
///
/// Source concentrations are rescaled so their 99th percentile matches
/// the target's before being recombined with the target stain vectors.
pub struct StainMatrixNormalizer {
    extractor: Box<dyn StainExtractor>,
    target: Option<FittedStains>,
}

impl StainMatrixNormalizer {
    pub fn new(extractor: Box<dyn StainExtractor>) -> Self {
        StainMatrixNormalizer { extractor, target: None }
    }

    /// Stain matrix of the fitted target
    pub fn target_stain_matrix(&self) -> Option<&Array2<f64>> {
        self.target.as_ref().map(|t| &t.stain_matrix)
    }
}

impl StainNormalizer for StainMatrixNormalizer {
    fn fit(&mut self, target: ArrayView3<u8>) -> PatchResult<()> {
        let stain_matrix = self.extractor.get_stain_matrix(target)?;
        let concentrations = get_concentrations(target, &stain_matrix)?;
        let max_concentrations = max_concentrations(&concentrations)?;
        debug!("Target stain matrix {:?}, max concentrations {:?}", stain_matrix, max_concentrations);

        self.target = Some(FittedStains { stain_matrix, max_concentrations });
        Ok(())
    }

    fn transform(&self, image: ArrayView3<u8>) -> PatchResult<Array3<u8>> {
        let target = self.target.as_ref().ok_or_else(not_fitted)?;
        let (rows, cols, _) = image.dim();

        let source_matrix = self.extractor.get_stain_matrix(image)?;
        if source_matrix.nrows() != target.stain_matrix.nrows() {
            return Err(PatchError::InvalidInput(format!(
                "Source has {} stains but the target has {}", source_matrix.nrows(), target.stain_matrix.nrows()
            )));
        }

        let mut concentrations = get_concentrations(image, &source_matrix)?;
        let source_max = max_concentrations(&concentrations)?;
        for (k, mut column) in concentrations.axis_iter_mut(Axis(1)).enumerate() {
            let ratio = if source_max[k] != 0.0 { target.max_concentrations[k] / source_max[k] } else { 1.0 };
            column.mapv_inplace(|v| v * ratio);
        }

        let od = concentrations.dot(&target.stain_matrix);
        Ok(Array3::from_shape_fn((rows, cols, 3), |(r, c, ch)| {
            (255.0 * (-od[[r * cols + c, ch]]).exp()).clamp(0.0, 255.0) as u8
        }))
    }
}

/// Per-channel mean and standard deviation of a CIELAB image
fn lab_statistics(lab: &Array3<f64>) -> ([f64; 3], [f64; 3]) {
    let mut means = [0.0; 3];
    let mut stds = [0.0; 3];
    for (ch, channel) in lab.axis_iter(Axis(2)).enumerate() {
        means[ch] = channel.mean().unwrap_or(0.0);
        stds[ch] = channel.std(0.0);
    }
    (means, stds)
}

/// Reinhard's colour transfer
///
/// Matches the mean and standard deviation of every CIELAB channel of the
/// source to the target.
#[derive(Debug, Clone, Default)]
pub struct ReinhardNormalizer {
    target: Option<([f64; 3], [f64; 3])>,
}

impl ReinhardNormalizer {
    pub fn new() -> Self {
        ReinhardNormalizer::default()
    }
}

impl StainNormalizer for ReinhardNormalizer {
    fn fit(&mut self, target: ArrayView3<u8>) -> PatchResult<()> {
        let statistics = lab_statistics(&rgb_to_lab(target)?);
        debug!("Target LAB means {:?}, stds {:?}", statistics.0, statistics.1);
        self.target = Some(statistics);
        Ok(())
    }

    fn transform(&self, image: ArrayView3<u8>) -> PatchResult<Array3<u8>> {
        let (target_means, target_stds) = self.target.ok_or_else(not_fitted)?;
        let mut lab = rgb_to_lab(image)?;
        let (means, stds) = lab_statistics(&lab);

        for (ch, mut channel) in lab.axis_iter_mut(Axis(2)).enumerate() {
            let ratio = if stds[ch] > 0.0 { target_stds[ch] / stds[ch] } else { 1.0 };
            channel.mapv_inplace(|v| (v - means[ch]) * ratio + target_means[ch]);
        }
        Ok(lab_to_rgb(&lab))
    }
}

/// Stain normalisation methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormMethod {
    Reinhard,
    Custom,
    Ruifrok,
    Macenko,
    Vahadane,
}

impl NormMethod {
    /// Parse a method name, case-insensitively
    pub fn from_name(name: &str) -> PatchResult<Self> {
        match name.trim().to_lowercase().as_str() {
            "reinhard" => Ok(NormMethod::Reinhard),
            "custom" => Ok(NormMethod::Custom),
            "ruifrok" => Ok(NormMethod::Ruifrok),
            "macenko" => Ok(NormMethod::Macenko),
            "vahadane" => Ok(NormMethod::Vahadane),
            _ => Err(PatchError::UnsupportedMethod(name.to_string())),
        }
    }
}

/// Create a stain normaliser by method name
///
/// # Arguments
/// * `method` - One of reinhard, custom, ruifrok, macenko or vahadane
/// * `stain_matrix` - Stain matrix for the custom method; rejected for all others
pub fn get_normalizer(method: &str, stain_matrix: Option<Array2<f64>>) -> PatchResult<Box<dyn StainNormalizer>> {
    let method = NormMethod::from_name(method)?;
    if method != NormMethod::Custom && stain_matrix.is_some() {
        return Err(PatchError::InvalidInput("A stain matrix is only used by the custom method".to_string()));
    }
    info!("Using {:?} stain normalisation", method);

    let extractor: Box<dyn StainExtractor> = match method {
        NormMethod::Reinhard => return Ok(Box::new(ReinhardNormalizer::new())),
        NormMethod::Custom => {
            let matrix = stain_matrix.ok_or_else(|| {
                PatchError::InvalidInput("The custom method needs a stain matrix".to_string())
            })?;
            Box::new(CustomExtractor::new(matrix)?)
        },
        NormMethod::Ruifrok => Box::new(RuifrokExtractor),
        NormMethod::Macenko => Box::new(MacenkoExtractor::default()),
        NormMethod::Vahadane => Box::new(VahadaneExtractor::default()),
    };

    Ok(Box::new(StainMatrixNormalizer::new(extractor)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stain::conversion::od_to_intensity;
    use crate::stain::extractor::normalize_rows;

    /// H&E-like image with concentrations scaled by `strength`
    fn stained(strength: f64) -> Array3<u8> {
        let stains = normalize_rows(RuifrokExtractor::reference_matrix());
        Array3::from_shape_fn((16, 16, 3), |(r, c, ch)| {
            let h = strength * (0.3 + 0.05 * r as f64);
            let e = strength * (0.2 + 0.04 * c as f64);
            od_to_intensity(h * stains[[0, ch]] + e * stains[[1, ch]])
        })
    }

    fn mean_abs_diff(a: &Array3<u8>, b: &Array3<u8>) -> f64 {
        a.iter().zip(b.iter()).map(|(x, y)| (*x as f64 - *y as f64).abs()).sum::<f64>() / a.len() as f64
    }

    #[test]
    fn test_concentrations_recover_mixture() {
        let stains = Array2::from_shape_vec((2, 3), vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0]).unwrap();
        let image = Array3::from_shape_vec((1, 1, 3), vec![od_to_intensity(0.5), od_to_intensity(1.0), 255]).unwrap();
        let concentrations = get_concentrations(image.view(), &stains).unwrap();
        assert!((concentrations[[0, 0]] - 0.5).abs() < 0.01);
        assert!((concentrations[[0, 1]] - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_ruifrok_maps_darker_source_onto_target() {
        let target = stained(1.0);
        let source = stained(1.6);

        let mut normalizer = get_normalizer("ruifrok", None).unwrap();
        normalizer.fit(target.view()).unwrap();
        let output = normalizer.transform(source.view()).unwrap();

        assert_eq!(output.dim(), target.dim());
        assert!(mean_abs_diff(&source, &target) > 20.0);
        assert!(mean_abs_diff(&output, &target) < 3.0);
    }

    #[test]
    fn test_custom_normalizer_uses_given_matrix() {
        let matrix = RuifrokExtractor::reference_matrix();
        let mut normalizer = StainMatrixNormalizer::new(Box::new(CustomExtractor::new(matrix.clone()).unwrap()));
        assert!(normalizer.target_stain_matrix().is_none());

        normalizer.fit(stained(1.0).view()).unwrap();
        assert_eq!(normalizer.target_stain_matrix(), Some(&matrix));
    }

    #[test]
    fn test_reinhard_matches_target_lab_statistics() {
        let target = stained(1.0);
        let source = stained(1.4);

        let mut normalizer = ReinhardNormalizer::new();
        normalizer.fit(target.view()).unwrap();
        let output = normalizer.transform(source.view()).unwrap();

        let (target_means, _) = lab_statistics(&rgb_to_lab(target.view()).unwrap());
        let (output_means, _) = lab_statistics(&rgb_to_lab(output.view()).unwrap());
        for ch in 0..3 {
            assert!((target_means[ch] - output_means[ch]).abs() < 1.5);
        }
    }

    #[test]
    fn test_reinhard_on_constant_image_keeps_target_mean() {
        let mut normalizer = ReinhardNormalizer::new();
        normalizer.fit(stained(1.0).view()).unwrap();
        let flat = Array3::from_elem((4, 4, 3), 200u8);
        let output = normalizer.transform(flat.view()).unwrap();
        for ch in 0..3 {
            assert!(output.index_axis(Axis(2), ch).iter().all(|&v| v == output[[0, 0, ch]]));
        }
    }

    #[test]
    fn test_factory_rules() {
        assert!(matches!(get_normalizer("histogram", None), Err(PatchError::UnsupportedMethod(_))));
        assert!(get_normalizer("custom", None).is_err());
        assert!(get_normalizer("Macenko", Some(RuifrokExtractor::reference_matrix())).is_err());
        assert!(get_normalizer("CUSTOM", Some(RuifrokExtractor::reference_matrix())).is_ok());
        for method in ["reinhard", "ruifrok", "macenko", "vahadane"] {
            assert!(get_normalizer(method, None).is_ok());
        }
    }

    #[test]
    fn test_transform_before_fit_fails() {
        let image = stained(1.0);
        assert!(get_normalizer("reinhard", None).unwrap().transform(image.view()).is_err());
        assert!(get_normalizer("ruifrok", None).unwrap().transform(image.view()).is_err());
    }

    #[test]
    fn test_grey_input_rejected() {
        let grey = Array3::from_elem((2, 2, 1), 100u8);
        let mut normalizer = get_normalizer("ruifrok", None).unwrap();
        assert!(normalizer.fit(grey.view()).is_err());
    }
}
