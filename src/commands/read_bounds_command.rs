//! Region reading command
//!
//! Reads a rectangle of an image at a chosen resolution and either
//! prints its shape or saves it as an image.

use std::path::PathBuf;

use clap::ArgMatches;
use log::info;

use crate::commands::command_traits::Command;
use crate::commands::output_mode::{default_output_path, required_path, OutputMode};
use crate::errors::PatchResult;
use crate::extractor::{load_image, Pixel};
use crate::slide::{read_bounds, save_image, Bounds, Units};

/// File name of the saved region when no output path is given
const DEFAULT_REGION_NAME: &str = "im_region.jpg";

/// Command for reading an image region
pub struct ReadBoundsCommand {
    input: PathBuf,
    bounds: Bounds,
    resolution: f64,
    units: Units,
    output_path: PathBuf,
    mode: OutputMode,
}

impl ReadBoundsCommand {
    /// Create a new command from the `read-bounds` subcommand arguments
    pub fn new(args: &ArgMatches) -> PatchResult<Self> {
        let input = required_path(args, "input")?;

        let bounds = match args.get_many::<i64>("region") {
            Some(values) => Bounds::from_slice(&values.copied().collect::<Vec<i64>>())?,
            None => Bounds::default(),
        };
        let units = match args.get_one::<String>("units") {
            Some(name) => Units::from_name(name)?,
            None => Units::Level,
        };
        let output_path = args.get_one::<String>("output-path")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_output_path(&input, DEFAULT_REGION_NAME));

        Ok(ReadBoundsCommand {
            input,
            bounds,
            resolution: args.get_one::<f64>("resolution").copied().unwrap_or(0.0),
            units,
            output_path,
            mode: OutputMode::from_args(args)?,
        })
    }
}

impl Command for ReadBoundsCommand {
    fn execute(&self) -> PatchResult<()> {
        let image = load_image::<u8>(&self.input)?;
        let region = read_bounds(image.view(), self.bounds, self.resolution, self.units)?;
        let (rows, cols, channels) = region.dim();

        match self.mode {
            OutputMode::Show => println!(
                "{}: region ({}, {}, {}, {}) read as {}x{} pixels with {} channels",
                self.input.display(), self.bounds.start_x, self.bounds.start_y,
                self.bounds.end_x, self.bounds.end_y, cols, rows, channels
            ),
            OutputMode::Save => {
                save_image(&u8::patch_to_image(region.view())?, &self.output_path)?;
                info!("Saved {}x{} region to {}", cols, rows, self.output_path.display());
            },
        }

        Ok(())
    }
}
