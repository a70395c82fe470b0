//! Tissue mask command
//!
//! Fits a tissue masker on each input image and prints the tissue
//! fraction or saves the mask as `<stem>.png` with tissue at 255.

use std::fs;
use std::path::{Path, PathBuf};

use clap::ArgMatches;
use image::{GrayImage, Luma};
use log::{info, warn};
use ndarray::Array2;

use crate::commands::command_traits::Command;
use crate::commands::output_mode::{required_path, OutputMode};
use crate::errors::{PatchError, PatchResult};
use crate::extractor::load_image;
use crate::slide::Units;
use crate::tissue::{get_tissue_masker, tissue_fraction, MaskerOptions};
use crate::utils::file_utils::{collect_inputs, DEFAULT_FILE_TYPES};

/// Output directory used when none is given
const DEFAULT_MASK_DIR: &str = "tissue_mask";

/// Command for generating tissue masks
pub struct TissueMaskCommand {
    input: PathBuf,
    output_dir: PathBuf,
    method: String,
    options: MaskerOptions,
    mode: OutputMode,
    file_types: String,
}

impl TissueMaskCommand {
    /// Create a new command from the `tissue-mask` subcommand arguments
    pub fn new(args: &ArgMatches) -> PatchResult<Self> {
        let defaults = MaskerOptions::default();
        let units = match args.get_one::<String>("units") {
            Some(name) => Units::from_name(name)?,
            None => defaults.units,
        };
        let kernel_size = match args.get_many::<usize>("kernel-size") {
            Some(values) => match values.copied().collect::<Vec<usize>>().as_slice() {
                [width, height] => Some((*width, *height)),
                other => return Err(PatchError::InvalidInput(format!(
                    "Kernel size needs a width and a height, got {} values", other.len()
                ))),
            },
            None => None,
        };
        let options = MaskerOptions {
            resolution: args.get_one::<f64>("resolution").copied().unwrap_or(defaults.resolution),
            units,
            kernel_size,
        };

        let method = args.get_one::<String>("method").cloned().unwrap_or_else(|| "Otsu".to_string());
        // fail on bad method or unit combinations before touching any file
        get_tissue_masker(&method, &options)?;

        Ok(TissueMaskCommand {
            input: required_path(args, "input")?,
            output_dir: args.get_one::<String>("output-dir")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MASK_DIR)),
            method,
            options,
            mode: OutputMode::from_args(args)?,
            file_types: args.get_one::<String>("file-types")
                .cloned()
                .unwrap_or_else(|| DEFAULT_FILE_TYPES.to_string()),
        })
    }

    fn save_mask(&self, mask: &Array2<bool>, image_path: &Path) -> PatchResult<PathBuf> {
        let stem = image_path
            .file_stem()
            .and_then(std::ffi::OsStr::to_str)
            .ok_or_else(|| PatchError::InvalidInput(format!("{} has no file name", image_path.display())))?;

        let (rows, cols) = mask.dim();
        let image = GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
            Luma([if mask[[y as usize, x as usize]] { 255 } else { 0 }])
        });

        let out_path = self.output_dir.join(format!("{}.png", stem));
        image.save(&out_path)?;
        Ok(out_path)
    }
}

impl Command for TissueMaskCommand {
    fn execute(&self) -> PatchResult<()> {
        let files = collect_inputs(&self.input, &self.file_types)?;
        if files.is_empty() {
            return Err(PatchError::InvalidInput(format!(
                "No files matching '{}' in {}", self.file_types, self.input.display()
            )));
        }
        if self.mode == OutputMode::Save {
            fs::create_dir_all(&self.output_dir)?;
        }

        let mut masker = get_tissue_masker(&self.method, &self.options)?;
        for path in &files {
            let image = load_image::<u8>(path)?;
            let mask = match masker.fit_transform(&[image.view()])?.into_iter().next() {
                Some(mask) => mask,
                None => {
                    warn!("No mask produced for {}", path.display());
                    continue;
                },
            };

            match self.mode {
                OutputMode::Show => println!(
                    "{}: tissue covers {:.1}% of {}x{} pixels",
                    path.display(), 100.0 * tissue_fraction(mask.view()), mask.ncols(), mask.nrows()
                ),
                OutputMode::Save => {
                    let out_path = self.save_mask(&mask, path)?;
                    info!("Saved tissue mask of {} to {}", path.display(), out_path.display());
                },
            }
        }

        Ok(())
    }
}
