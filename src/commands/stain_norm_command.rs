//! Stain normalisation command
//!
//! Fits a normaliser on one target image and writes every source image,
//! mapped onto the target's stain appearance, under the output directory
//! with its original file name.

use std::fs;
use std::path::PathBuf;

use clap::ArgMatches;
use log::info;

use crate::commands::command_traits::Command;
use crate::commands::output_mode::required_path;
use crate::errors::{PatchError, PatchResult};
use crate::extractor::{load_rgb_image, Pixel};
use crate::slide::save_image;
use crate::stain::{get_normalizer, load_stain_matrix, NormMethod};
use crate::utils::file_utils::collect_inputs;
use crate::utils::progress::ProgressTracker;

/// Output directory used when none is given
const DEFAULT_NORM_DIR: &str = "stainnorm_output";

/// File types picked up from source directories
pub const DEFAULT_STAIN_FILE_TYPES: &str = "*.png, *.jpg, *.tif, *.tiff";

/// Command for stain normalising images
pub struct StainNormCommand {
    source: PathBuf,
    target: PathBuf,
    method: String,
    stain_matrix: Option<PathBuf>,
    output_dir: PathBuf,
    file_types: String,
}

impl StainNormCommand {
    /// Create a new command from the `stain-norm` subcommand arguments
    pub fn new(args: &ArgMatches) -> PatchResult<Self> {
        let method = args.get_one::<String>("method").cloned().unwrap_or_else(|| "reinhard".to_string());
        NormMethod::from_name(&method)?;

        Ok(StainNormCommand {
            source: required_path(args, "input")?,
            target: required_path(args, "target")?,
            method,
            stain_matrix: args.get_one::<String>("stain-matrix").map(PathBuf::from),
            output_dir: args.get_one::<String>("output-dir")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_NORM_DIR)),
            file_types: args.get_one::<String>("file-types")
                .cloned()
                .unwrap_or_else(|| DEFAULT_STAIN_FILE_TYPES.to_string()),
        })
    }
}

impl Command for StainNormCommand {
    fn execute(&self) -> PatchResult<()> {
        let files = collect_inputs(&self.source, &self.file_types)?;
        if files.is_empty() {
            return Err(PatchError::InvalidInput(format!(
                "No files matching '{}' in {}", self.file_types, self.source.display()
            )));
        }

        let stain_matrix = self.stain_matrix.as_deref().map(load_stain_matrix).transpose()?;
        let mut normalizer = get_normalizer(&self.method, stain_matrix)?;

        info!("Fitting {} normaliser on {}", self.method, self.target.display());
        normalizer.fit(load_rgb_image(&self.target)?.view())?;

        fs::create_dir_all(&self.output_dir)?;
        let progress = ProgressTracker::new(files.len() as u64, "Normalising stains");
        for path in &files {
            let file_name = path
                .file_name()
                .ok_or_else(|| PatchError::InvalidInput(format!("{} has no file name", path.display())))?;
            progress.set_message(&file_name.to_string_lossy());

            let normalized = normalizer.transform(load_rgb_image(path)?.view())?;
            save_image(&u8::patch_to_image(normalized.view())?, &self.output_dir.join(file_name))?;
            progress.increment(1);
        }
        progress.finish();

        info!("Wrote {} normalised images to {}", files.len(), self.output_dir.display());
        Ok(())
    }
}
