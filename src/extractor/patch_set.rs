//! Extraction results
//!
//! This module defines the result of a patch extraction: a stack of
//! patches with a parallel label and identifier for each one, plus the
//! writers that persist it to disk.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use log::{debug, info};
use ndarray::{Array4, ArrayView3, Axis};

use crate::errors::{PatchError, PatchResult};
use crate::utils::csv_utils::quote_field;
use crate::utils::progress::ProgressTracker;

use super::image_input::Pixel;

/// On-disk format for extracted patches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One NumPy `.npy` array holding every patch
    Npy,
    /// One PNG image per patch
    Png,
}

impl OutputFormat {
    /// Parse a format name, case-insensitively
    pub fn from_name(name: &str) -> PatchResult<Self> {
        match name.trim().to_lowercase().as_str() {
            "npy" | "numpy" => Ok(OutputFormat::Npy),
            "png" => Ok(OutputFormat::Png),
            _ => Err(PatchError::InvalidInput(format!("Unsupported output format: {}", name))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::Npy => "npy",
            OutputFormat::Png => "png",
        }
    }
}

/// Patches extracted from one image
///
/// `patches` has shape `[n, patch_h, patch_w, channels]`; `labels[i]` and
/// `ids[i]` describe `patches[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult<T> {
    pub patches: Array4<T>,
    pub labels: Vec<String>,
    pub ids: Vec<u32>,
}

impl<T: Pixel> ExtractionResult<T> {
    /// Assemble a result, checking that the three sequences line up
    pub fn from_parts(patches: Array4<T>, labels: Vec<String>, ids: Vec<u32>) -> PatchResult<Self> {
        let count = patches.len_of(Axis(0));
        if labels.len() != count || ids.len() != count {
            return Err(PatchError::InvalidInput(format!(
                "Expected {} labels and ids, got {} labels and {} ids", count, labels.len(), ids.len()
            )));
        }
        Ok(ExtractionResult { patches, labels, ids })
    }

    /// Number of patches
    pub fn len(&self) -> usize {
        self.patches.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// View of a single patch as (rows, columns, channels)
    pub fn patch(&self, index: usize) -> Option<ArrayView3<'_, T>> {
        if index < self.len() {
            Some(self.patches.index_axis(Axis(0), index))
        } else {
            None
        }
    }

    /// Save the result under `dir`, creating the directory if needed
    ///
    /// Always writes `<name>_labels.csv`; the patches go to `<name>.npy` or
    /// to one `<name>_<index>_<id>_<label>.png` per patch.
    ///
    /// # Returns
    /// Paths of every file written
    pub fn save_to_dir(&self, dir: &Path, name: &str, format: OutputFormat) -> PatchResult<Vec<PathBuf>> {
        info!("Saving {} patches to {} as {}", self.len(), dir.display(), format.name());
        fs::create_dir_all(dir)?;

        let mut written = match format {
            OutputFormat::Npy => {
                let path = dir.join(format!("{}.npy", name));
                self.save_as_npy(&path)?;
                vec![path]
            },
            OutputFormat::Png => self.save_as_png(dir, name)?,
        };

        let labels_path = dir.join(format!("{}_labels.csv", name));
        self.save_labels_csv(&labels_path)?;
        written.push(labels_path);

        Ok(written)
    }

    /// Save the labels and ids as CSV with an `index,id,label` header
    ///
    /// Labels containing separators, quotes or line breaks are quoted.
    pub fn save_labels_csv(&self, path: &Path) -> PatchResult<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "index,id,label")?;
        for (index, (id, label)) in self.ids.iter().zip(&self.labels).enumerate() {
            writeln!(writer, "{},{},{}", index, id, quote_field(label))?;
        }
        writer.flush()?;

        Ok(())
    }

    /// Save the patch stack as a NumPy NPY (version 1.0) file
    pub fn save_as_npy(&self, path: &Path) -> PatchResult<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let (n, h, w, c) = self.patches.dim();
        let header = npy_header(T::NPY_DESCR, &[n, h, w, c]);

        writer.write_all(b"\x93NUMPY")?;
        writer.write_all(&[0x01, 0x00])?;
        writer.write_u16::<LittleEndian>(header.len() as u16)?;
        writer.write_all(header.as_bytes())?;

        let progress = ProgressTracker::new(n as u64, "Writing patches");
        for patch in self.patches.outer_iter() {
            for value in patch.iter() {
                value.write_le(&mut writer)?;
            }
            progress.increment(1);
        }
        writer.flush()?;
        progress.finish();

        debug!("Wrote NPY array of shape ({}, {}, {}, {}) to {}", n, h, w, c, path.display());
        Ok(())
    }

    fn save_as_png(&self, dir: &Path, name: &str) -> PatchResult<Vec<PathBuf>> {
        let progress = ProgressTracker::new(self.len() as u64, "Writing patch images");
        let mut written = Vec::with_capacity(self.len());

        for (index, patch) in self.patches.outer_iter().enumerate() {
            let file_name = format!(
                "{}_{}_{}_{}.png", name, index, self.ids[index], sanitize_label(&self.labels[index])
            );
            let path = dir.join(file_name);
            T::patch_to_image(patch)?.save(&path)?;
            written.push(path);
            progress.increment(1);
        }
        progress.finish();

        Ok(written)
    }
}

/// Build a padded NPY header dictionary, newline included
///
/// The magic string, version and length field take 10 bytes; the header
/// is padded with spaces so the data starts on a 64-byte boundary.
fn npy_header(descr: &str, shape: &[usize]) -> String {
    let shape_str = shape.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ");
    let header_str = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': ({}), }}", descr, shape_str
    );

    let header_len = header_str.len() + 1;
    let padding_len = (64 - ((header_len + 10) % 64)) % 64;
    format!("{}{}\n", header_str, " ".repeat(padding_len))
}

/// Replace characters that are awkward in file names
fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "unlabeled".to_string() } else { cleaned }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn sample_result() -> ExtractionResult<u8> {
        let patches = Array4::from_shape_fn((2, 3, 4, 3), |(n, r, c, ch)| (n * 60 + r * 12 + c * 3 + ch) as u8);
        ExtractionResult::from_parts(
            patches,
            vec!["tumour".to_string(), "lymph/node".to_string()],
            vec![1, 2],
        ).unwrap()
    }

    #[test]
    fn test_from_parts_checks_lengths() {
        let patches = Array4::<u8>::zeros((2, 1, 1, 1));
        let result = ExtractionResult::from_parts(patches, vec!["a".to_string()], vec![1, 1]);
        assert!(matches!(result, Err(PatchError::InvalidInput(_))));
    }

    #[test]
    fn test_patch_view() {
        let result = sample_result();
        assert_eq!(result.len(), 2);
        assert_eq!(result.patch(1).unwrap()[[0, 0, 0]], 60);
        assert!(result.patch(2).is_none());
    }

    #[test]
    fn test_npy_header_alignment() {
        let header = npy_header("|u1", &[2, 3, 4, 3]);
        assert_eq!((header.len() + 10) % 64, 0);
        assert!(header.ends_with('\n'));
        assert!(header.contains("'shape': (2, 3, 4, 3)"));
    }

    #[test]
    fn test_save_npy_layout() {
        let dir = tempfile::tempdir().unwrap();
        let result = sample_result();
        let written = result.save_to_dir(dir.path(), "cells", OutputFormat::Npy).unwrap();
        assert_eq!(written.len(), 2);

        let bytes = std::fs::read(dir.path().join("cells.npy")).unwrap();
        assert_eq!(&bytes[..6], b"\x93NUMPY");
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);

        let data = &bytes[10 + header_len..];
        assert_eq!(data.len(), 2 * 3 * 4 * 3);
        let expected: Vec<u8> = result.patches.iter().copied().collect();
        assert_eq!(data, expected.as_slice());

        let labels = std::fs::read_to_string(dir.path().join("cells_labels.csv")).unwrap();
        assert_eq!(labels, "index,id,label\n0,1,tumour\n1,2,lymph/node\n");
    }

    #[test]
    fn test_labels_csv_quotes_awkward_labels() {
        let dir = tempfile::tempdir().unwrap();
        let patches = Array4::<u8>::zeros((2, 1, 1, 3));
        let labels = vec!["tumour, grade 2".to_string(), "say \"hi\"".to_string()];
        let result = ExtractionResult::from_parts(patches, labels.clone(), vec![1, 2]).unwrap();

        let path = dir.path().join("labels.csv");
        result.save_labels_csv(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "index,id,label\n0,1,\"tumour, grade 2\"\n1,2,\"say \"\"hi\"\"\"\n");

        let records = crate::utils::csv_utils::parse_records(&content).unwrap();
        assert!(records.iter().all(|r| r.fields.len() == 3));
        assert_eq!(records[1].fields[2], labels[0]);
        assert_eq!(records[2].fields[2], labels[1]);
    }

    #[test]
    fn test_save_png_per_patch() {
        let dir = tempfile::tempdir().unwrap();
        let written = sample_result().save_to_dir(dir.path(), "cells", OutputFormat::Png).unwrap();

        assert_eq!(written.len(), 3);
        assert!(dir.path().join("cells_0_1_tumour.png").is_file());
        assert!(dir.path().join("cells_1_2_lymph_node.png").is_file());
    }

    #[test]
    fn test_output_format_names() {
        assert_eq!(OutputFormat::from_name("NPY").unwrap(), OutputFormat::Npy);
        assert_eq!(OutputFormat::from_name("png").unwrap(), OutputFormat::Png);
        assert!(OutputFormat::from_name("tiff").is_err());
    }
}
