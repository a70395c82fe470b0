//! Patch extraction command
//!
//! This module implements the command for extracting patches from one
//! image or a directory of images and saving them to disk.

use std::path::{Path, PathBuf};

use clap::ArgMatches;
use log::{debug, error, info, warn};

use crate::commands::command_traits::Command;
use crate::config::PatchkitConfig;
use crate::errors::{PatchError, PatchResult};
use crate::extractor::{ImageInput, OutputFormat, PatchExtractor, PatchExtractorFactory, PatchStrategy, Pixel};
use crate::points::{read_points, PointSet};
use crate::utils::file_utils::{collect_inputs, DEFAULT_FILE_TYPES};

/// Name of the directory created next to the input when no output is given
const DEFAULT_OUTPUT_DIR: &str = "patches";

/// Element type used for extracted arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    U8,
    U16,
    F32,
}

impl PixelType {
    pub fn from_name(name: &str) -> PatchResult<Self> {
        match name.to_lowercase().as_str() {
            "u8" | "uint8" => Ok(PixelType::U8),
            "u16" | "uint16" => Ok(PixelType::U16),
            "f32" | "float32" => Ok(PixelType::F32),
            _ => Err(PatchError::InvalidInput(format!("Unsupported pixel type: {}", name))),
        }
    }
}

/// Command for extracting patches
pub struct ExtractCommand {
    /// Image file or directory of images
    input: PathBuf,
    /// Explicit points file shared by all inputs
    points_file: Option<PathBuf>,
    /// Settings from the config file with CLI overrides applied
    config: PatchkitConfig,
    /// Explicit output name; defaults to each image's file stem
    name_override: Option<String>,
    /// File types searched in directories
    file_types: String,
    /// Element type of the extracted arrays
    pixel_type: PixelType,
}

impl ExtractCommand {
    /// Create a new extract command from the `extract` subcommand arguments
    ///
    /// # Arguments
    /// * `args` - Subcommand argument matches from clap
    ///
    /// # Returns
    /// A new ExtractCommand instance or an error
    pub fn new(args: &ArgMatches) -> PatchResult<Self> {
        let input = args.get_one::<String>("input")
            .ok_or_else(|| PatchError::InvalidInput("Missing input path".to_string()))?;
        info!("Input: {}", input);

        let mut config = match args.get_one::<String>("config") {
            Some(path) => PatchkitConfig::load(Path::new(path))?,
            None => PatchkitConfig::default(),
        };
        Self::apply_overrides(args, &mut config)?;
        config.validate()?;
        debug!("Effective configuration: {:?}", config);

        let pixel_type = match args.get_one::<String>("dtype") {
            Some(name) => PixelType::from_name(name)?,
            None => PixelType::U8,
        };

        Ok(ExtractCommand {
            input: PathBuf::from(input),
            points_file: args.get_one::<String>("points").map(PathBuf::from),
            config,
            name_override: args.get_one::<String>("name").cloned(),
            file_types: args.get_one::<String>("file-types")
                .cloned()
                .unwrap_or_else(|| DEFAULT_FILE_TYPES.to_string()),
            pixel_type,
        })
    }

    /// Apply command-line flags on top of the loaded configuration
    fn apply_overrides(args: &ArgMatches, config: &mut PatchkitConfig) -> PatchResult<()> {
        let extraction = &mut config.extraction;

        if let Some(method) = args.get_one::<String>("method") {
            extraction.method = method.clone();
        }

        let numeric: [(&str, &mut usize); 5] = [
            ("patch-height", &mut extraction.patch_height),
            ("patch-width", &mut extraction.patch_width),
            ("pad-y", &mut extraction.pad_y),
            ("pad-x", &mut extraction.pad_x),
            ("num-examples", &mut extraction.num_examples_per_patch),
        ];
        for (flag, target) in numeric {
            if let Some(value) = args.get_one::<usize>(flag) {
                *target = *value;
            }
        }

        if let Some(format) = args.get_one::<String>("format") {
            config.output.format = OutputFormat::from_name(format)?;
        }
        if let Some(dir) = args.get_one::<String>("output-dir") {
            config.output.directory = Some(PathBuf::from(dir));
        }

        Ok(())
    }

    /// Find the points for an image
    ///
    /// An explicit points file wins; otherwise a `.csv` or `.json` file with
    /// the image's stem next to it is used.
    fn points_for(&self, image_path: &Path) -> PatchResult<Option<PointSet>> {
        if let Some(points_file) = &self.points_file {
            return read_points(points_file).map(Some);
        }

        for extension in ["csv", "json"] {
            let candidate = image_path.with_extension(extension);
            if candidate.is_file() {
                debug!("Found points file {}", candidate.display());
                return read_points(&candidate).map(Some);
            }
        }

        Ok(None)
    }

    fn output_dir_for(&self, image_path: &Path) -> PathBuf {
        match &self.config.output.directory {
            Some(dir) => dir.clone(),
            None => image_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(DEFAULT_OUTPUT_DIR),
        }
    }

    fn output_name_for(&self, image_path: &Path, multiple: bool) -> String {
        let stem = image_path
            .file_stem()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or(&self.config.output.name)
            .to_string();

        match (&self.name_override, multiple) {
            (Some(name), true) => format!("{}_{}", name, stem),
            (Some(name), false) => name.clone(),
            (None, _) => stem,
        }
    }

    /// Extract and save patches for every input file
    fn run<T: Pixel>(&self, files: &[PathBuf]) -> PatchResult<()> {
        let strategy = PatchStrategy::from_name(&self.config.extraction.method)?;
        let factory = PatchExtractorFactory::new(self.config.extraction.clone());
        let multiple = files.len() > 1;

        for path in files {
            info!("Extracting patches from {}", path.display());

            let points = self.points_for(path)?;
            if strategy == PatchStrategy::Point && points.is_none() {
                return Err(PatchError::InvalidInput(format!(
                    "No points given for {}, pass --points or place a .csv/.json file next to it",
                    path.display()
                )));
            }
            if multiple && self.points_file.is_some() {
                warn!("Using the same points file for every image");
            }

            let extractor = factory.create_extractor::<T>(points)?;
            let result = extractor.extract_patches(ImageInput::from(path.as_path()))?;

            let dir = self.output_dir_for(path);
            let name = self.output_name_for(path, multiple);
            let written = result.save_to_dir(&dir, &name, self.config.output.format)?;

            info!("Saved {} patches from {} into {} files under {}",
                  result.len(), path.display(), written.len(), dir.display());
        }

        Ok(())
    }
}

impl Command for ExtractCommand {
    fn execute(&self) -> PatchResult<()> {
        let files = collect_inputs(&self.input, &self.file_types)?;
        if files.is_empty() {
            error!("No input images found in {}", self.input.display());
            return Err(PatchError::InvalidInput(format!(
                "No files matching '{}' in {}", self.file_types, self.input.display()
            )));
        }

        info!("Processing {} images with method '{}'", files.len(), self.config.extraction.method);

        match self.pixel_type {
            PixelType::U8 => self.run::<u8>(&files),
            PixelType::U16 => self.run::<u16>(&files),
            PixelType::F32 => self.run::<f32>(&files),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_type_names() {
        assert_eq!(PixelType::from_name("UINT8").unwrap(), PixelType::U8);
        assert_eq!(PixelType::from_name("f32").unwrap(), PixelType::F32);
        assert!(PixelType::from_name("i64").is_err());
    }
}
