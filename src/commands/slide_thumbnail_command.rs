//! Thumbnail command

use std::path::PathBuf;

use clap::ArgMatches;
use log::info;

use crate::commands::command_traits::Command;
use crate::commands::output_mode::{default_output_path, required_path, OutputMode};
use crate::errors::{PatchError, PatchResult};
use crate::slide::{save_image, slide_thumbnail, DEFAULT_THUMBNAIL_SIZE};

/// File name of the saved thumbnail when no output path is given
const DEFAULT_THUMBNAIL_NAME: &str = "slide_thumb.jpg";

/// Command for creating an image thumbnail
pub struct SlideThumbnailCommand {
    input: PathBuf,
    max_size: u32,
    output_path: PathBuf,
    mode: OutputMode,
}

impl SlideThumbnailCommand {
    /// Create a new command from the `slide-thumbnail` subcommand arguments
    pub fn new(args: &ArgMatches) -> PatchResult<Self> {
        let input = required_path(args, "input")?;
        let max_size = args.get_one::<u32>("max-size").copied().unwrap_or(DEFAULT_THUMBNAIL_SIZE);
        if max_size == 0 {
            return Err(PatchError::InvalidInput("Thumbnail size must be positive".to_string()));
        }
        let output_path = args.get_one::<String>("output-path")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_output_path(&input, DEFAULT_THUMBNAIL_NAME));

        Ok(SlideThumbnailCommand {
            input,
            max_size,
            output_path,
            mode: OutputMode::from_args(args)?,
        })
    }
}

impl Command for SlideThumbnailCommand {
    fn execute(&self) -> PatchResult<()> {
        let image = image::open(&self.input).map_err(|e| {
            PatchError::InvalidInput(format!("Could not decode image {}: {}", self.input.display(), e))
        })?;
        let thumbnail = slide_thumbnail(&image, self.max_size);

        match self.mode {
            OutputMode::Show => println!(
                "{}: {}x{} thumbnail of a {}x{} image",
                self.input.display(), thumbnail.width(), thumbnail.height(), image.width(), image.height()
            ),
            OutputMode::Save => {
                save_image(&thumbnail, &self.output_path)?;
                info!("Saved thumbnail of {} to {}", self.input.display(), self.output_path.display());
            },
        }

        Ok(())
    }
}
