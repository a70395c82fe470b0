//! Tiling command

use std::path::PathBuf;

use clap::ArgMatches;
use log::info;

use crate::commands::command_traits::Command;
use crate::commands::output_mode::required_path;
use crate::errors::{PatchError, PatchResult};
use crate::slide::{save_tiles, DEFAULT_TILE_SIZE};
use crate::utils::file_utils::{collect_inputs, DEFAULT_FILE_TYPES};

/// Output directory used when none is given
const DEFAULT_TILES_DIR: &str = "tiles";

/// Command for cutting images into tiles
pub struct SaveTilesCommand {
    input: PathBuf,
    output_dir: PathBuf,
    file_types: String,
    tile_size: (u32, u32),
}

impl SaveTilesCommand {
    /// Create a new command from the `save-tiles` subcommand arguments
    pub fn new(args: &ArgMatches) -> PatchResult<Self> {
        let tile_size = match args.get_many::<u32>("tile-size") {
            Some(values) => match values.copied().collect::<Vec<u32>>().as_slice() {
                [width, height] => (*width, *height),
                other => return Err(PatchError::InvalidInput(format!(
                    "Tile size needs a width and a height, got {} values", other.len()
                ))),
            },
            None => DEFAULT_TILE_SIZE,
        };

        Ok(SaveTilesCommand {
            input: required_path(args, "input")?,
            output_dir: args.get_one::<String>("output-dir")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TILES_DIR)),
            file_types: args.get_one::<String>("file-types")
                .cloned()
                .unwrap_or_else(|| DEFAULT_FILE_TYPES.to_string()),
            tile_size,
        })
    }
}

impl Command for SaveTilesCommand {
    fn execute(&self) -> PatchResult<()> {
        let files = collect_inputs(&self.input, &self.file_types)?;
        if files.is_empty() {
            return Err(PatchError::InvalidInput(format!(
                "No files matching '{}' in {}", self.file_types, self.input.display()
            )));
        }

        for path in &files {
            let tiles = save_tiles(path, &self.output_dir, self.tile_size)?;
            info!("Wrote {} tiles of {}", tiles.len(), path.display());
        }

        Ok(())
    }
}
