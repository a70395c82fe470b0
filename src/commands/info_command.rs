//! Image information command
//!
//! Reports the dimensions and channel layout of input images, which is
//! what padding and patch sizes have to be chosen against, or saves the
//! same metadata as one TOML file per image.

use std::path::PathBuf;

use clap::ArgMatches;
use log::{info, warn};

use crate::commands::command_traits::Command;
use crate::commands::output_mode::{required_path, OutputMode};
use crate::errors::{PatchError, PatchResult};
use crate::slide::{default_meta_dir, SlideInfo};
use crate::utils::file_utils::{collect_inputs, DEFAULT_FILE_TYPES};

/// Command for printing or saving image information
pub struct InfoCommand {
    /// File or directory to inspect
    input: PathBuf,
    /// File types searched in directories
    file_types: String,
    mode: OutputMode,
    /// Metadata directory for save mode
    output_dir: PathBuf,
}

impl InfoCommand {
    /// Create a new info command from the `info` subcommand arguments
    pub fn new(args: &ArgMatches) -> PatchResult<Self> {
        let input = required_path(args, "input")?;
        let file_types = args.get_one::<String>("file-types")
            .cloned()
            .unwrap_or_else(|| DEFAULT_FILE_TYPES.to_string());
        let output_dir = args.get_one::<String>("output-dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_meta_dir(&input));

        Ok(InfoCommand {
            input,
            file_types,
            mode: OutputMode::from_args(args)?,
            output_dir,
        })
    }

    fn show(slide: &SlideInfo) {
        println!(
            "{}: {}x{} pixels, {} channels of {} bits ({}), {} bytes",
            slide.file_path.display(), slide.width, slide.height, slide.channels,
            slide.bits_per_channel, slide.color, slide.file_size
        );
    }
}

impl Command for InfoCommand {
    fn execute(&self) -> PatchResult<()> {
        let files = collect_inputs(&self.input, &self.file_types)?;
        if files.is_empty() {
            return Err(PatchError::InvalidInput(format!(
                "No files matching '{}' in {}", self.file_types, self.input.display()
            )));
        }
        info!("Inspecting {} files", files.len());

        let mut saved = 0;
        for path in files {
            let slide = match SlideInfo::read(&path) {
                Ok(slide) => slide,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                },
            };

            match self.mode {
                OutputMode::Show => InfoCommand::show(&slide),
                OutputMode::Save => {
                    slide.save(&self.output_dir)?;
                    saved += 1;
                },
            }
        }

        if self.mode == OutputMode::Save {
            info!("Saved metadata of {} images to {}", saved, self.output_dir.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::build_cli;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_save_mode_writes_one_file_per_image() {
        let dir = tempfile::tempdir().unwrap();
        let slides = dir.path().join("slides");
        std::fs::create_dir(&slides).unwrap();
        RgbImage::from_pixel(7, 5, Rgb([1, 2, 3])).save(slides.join("a.png")).unwrap();
        RgbImage::from_pixel(3, 2, Rgb([1, 2, 3])).save(slides.join("b.png")).unwrap();
        std::fs::write(slides.join("notes.txt"), "skip me").unwrap();

        let matches = build_cli()
            .try_get_matches_from(["patchkit", "info", slides.to_str().unwrap(), "--mode", "save"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        InfoCommand::new(sub).unwrap().execute().unwrap();

        let meta = dir.path().join("meta");
        let saved: toml::Table = std::fs::read_to_string(meta.join("a.toml")).unwrap().parse().unwrap();
        assert_eq!(saved["width"].as_integer(), Some(7));
        assert!(meta.join("b.toml").is_file());
        assert!(!meta.join("notes.toml").exists());
    }
}
