//! CLI command implementations
//!
//! This module contains implementations of various commands
//! supported by the CLI application using the Command pattern.

pub mod command_traits;
pub mod extract_command;
pub mod info_command;
pub mod output_mode;
pub mod read_bounds_command;
pub mod save_tiles_command;
pub mod slide_thumbnail_command;
pub mod stain_norm_command;
pub mod tissue_mask_command;

pub use command_traits::{Command, CommandFactory};
pub use extract_command::ExtractCommand;
pub use info_command::InfoCommand;
pub use output_mode::OutputMode;
pub use read_bounds_command::ReadBoundsCommand;
pub use save_tiles_command::SaveTilesCommand;
pub use slide_thumbnail_command::SlideThumbnailCommand;
pub use stain_norm_command::{StainNormCommand, DEFAULT_STAIN_FILE_TYPES};
pub use tissue_mask_command::TissueMaskCommand;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command as ClapCommand};

use crate::errors::{PatchError, PatchResult};
use crate::utils::file_utils::DEFAULT_FILE_TYPES;

fn input_arg() -> Arg {
    Arg::new("input")
        .help("Input image file or directory of images")
        .required(true)
        .index(1)
}

fn file_types_arg() -> Arg {
    Arg::new("file-types")
        .long("file-types")
        .help("File types to pick up from directories")
        .value_name("PATTERNS")
        .default_value(DEFAULT_FILE_TYPES)
}

fn file_input_arg() -> Arg {
    Arg::new("input")
        .help("Input image file")
        .required(true)
        .index(1)
}

fn mode_arg() -> Arg {
    Arg::new("mode")
        .long("mode")
        .help("'show' to print a summary or 'save' to write the result")
        .value_name("MODE")
        .value_parser(["show", "save"])
        .default_value("show")
}

fn output_path_arg(default_name: &str) -> Arg {
    Arg::new("output-path")
        .short('o')
        .long("output-path")
        .help(format!("Output file in save mode, default=<input dir>/../{}", default_name))
        .value_name("FILE")
}

fn output_dir_arg(help: &'static str) -> Arg {
    Arg::new("output-dir")
        .short('o')
        .long("output-dir")
        .help(help)
        .value_name("DIR")
}

fn resolution_args(default_resolution: &'static str, default_units: &'static str) -> [Arg; 2] {
    [
        Arg::new("resolution")
            .long("resolution")
            .help("Resolution to read the image at")
            .value_name("VALUE")
            .value_parser(value_parser!(f64))
            .default_value(default_resolution),
        Arg::new("units")
            .long("units")
            .help("Resolution units (level, baseline, mpp, power)")
            .value_name("UNITS")
            .default_value(default_units),
    ]
}

fn usize_arg(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .help(help)
        .value_name("N")
        .value_parser(value_parser!(usize))
}

/// Build the command-line interface definition
pub fn build_cli() -> ClapCommand {
    ClapCommand::new("patchkit")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Extract patches from pathology images for machine learning")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug output")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .help("Write log records to this file")
                .value_name("FILE")
                .global(true),
        )
        .subcommand(
            ClapCommand::new("extract")
                .about("Extract patches centered on labeled points")
                .arg(input_arg())
                .arg(
                    Arg::new("points")
                        .short('p')
                        .long("points")
                        .help("CSV or JSON points file (label, x, y); defaults to <image>.csv or <image>.json")
                        .value_name("FILE"),
                )
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .help("TOML configuration file")
                        .value_name("FILE"),
                )
                .arg(
                    Arg::new("method")
                        .short('m')
                        .long("method")
                        .help("Extraction method (point, fixedwindow, variablewindow)")
                        .value_name("NAME"),
                )
                .arg(usize_arg("patch-height", "Patch height in pixels"))
                .arg(usize_arg("patch-width", "Patch width in pixels"))
                .arg(usize_arg("pad-y", "Symmetric padding in rows"))
                .arg(usize_arg("pad-x", "Symmetric padding in columns"))
                .arg(usize_arg("num-examples", "Patches sampled per point (an odd square, e.g. 1, 9, 25)"))
                .arg(
                    Arg::new("output-dir")
                        .short('o')
                        .long("output-dir")
                        .help("Output directory, default=<input dir>/patches")
                        .value_name("DIR"),
                )
                .arg(
                    Arg::new("name")
                        .long("name")
                        .help("Base name of output files, default=image file stem")
                        .value_name("NAME"),
                )
                .arg(
                    Arg::new("format")
                        .short('f')
                        .long("format")
                        .help("Output format (npy, png)")
                        .value_name("FORMAT"),
                )
                .arg(
                    Arg::new("dtype")
                        .long("dtype")
                        .help("Pixel type of extracted arrays (u8, u16, f32)")
                        .value_name("TYPE")
                        .default_value("u8"),
                )
                .arg(file_types_arg()),
        )
        .subcommand(
            ClapCommand::new("info")
                .about("Show or save image dimensions and channels")
                .arg(input_arg())
                .arg(file_types_arg())
                .arg(mode_arg())
                .arg(output_dir_arg("Metadata directory in save mode, default=<input dir>/../meta")),
        )
        .subcommand(
            ClapCommand::new("read-bounds")
                .about("Read a rectangular region of an image")
                .arg(file_input_arg())
                .arg(
                    Arg::new("region")
                        .long("region")
                        .help("Region as start_x start_y end_x end_y, default=0 0 2000 2000")
                        .value_names(["START_X", "START_Y", "END_X", "END_Y"])
                        .num_args(4)
                        .allow_negative_numbers(true)
                        .value_parser(value_parser!(i64)),
                )
                .args(resolution_args("0", "level"))
                .arg(output_path_arg("im_region.jpg"))
                .arg(mode_arg()),
        )
        .subcommand(
            ClapCommand::new("slide-thumbnail")
                .about("Create a thumbnail of an image")
                .arg(file_input_arg())
                .arg(
                    Arg::new("max-size")
                        .long("max-size")
                        .help("Longest side of the thumbnail in pixels")
                        .value_name("N")
                        .value_parser(value_parser!(u32))
                        .default_value("1024"),
                )
                .arg(output_path_arg("slide_thumb.jpg"))
                .arg(mode_arg()),
        )
        .subcommand(
            ClapCommand::new("save-tiles")
                .about("Cut images into tiles with a CSV listing")
                .arg(input_arg())
                .arg(output_dir_arg("Output directory, default=tiles"))
                .arg(file_types_arg())
                .arg(
                    Arg::new("tile-size")
                        .long("tile-size")
                        .help("Tile width and height, default=5000 5000")
                        .value_names(["WIDTH", "HEIGHT"])
                        .num_args(2)
                        .value_parser(value_parser!(u32)),
                ),
        )
        .subcommand(
            ClapCommand::new("tissue-mask")
                .about("Generate tissue masks")
                .arg(input_arg())
                .arg(output_dir_arg("Mask directory in save mode, default=tissue_mask"))
                .arg(
                    Arg::new("method")
                        .short('m')
                        .long("method")
                        .help("Tissue masking method (Otsu, Morphological)")
                        .value_name("NAME")
                        .default_value("Otsu"),
                )
                .args(resolution_args("1.25", "power"))
                .arg(
                    Arg::new("kernel-size")
                        .long("kernel-size")
                        .help("Kernel width and height for morphological dilation")
                        .value_names(["WIDTH", "HEIGHT"])
                        .num_args(2)
                        .value_parser(value_parser!(usize)),
                )
                .arg(mode_arg())
                .arg(file_types_arg()),
        )
        .subcommand(
            ClapCommand::new("stain-norm")
                .about("Stain normalise images to a target image")
                .arg(input_arg())
                .arg(
                    Arg::new("target")
                        .short('t')
                        .long("target")
                        .help("Target image whose stain appearance is matched")
                        .value_name("FILE")
                        .required(true),
                )
                .arg(
                    Arg::new("method")
                        .short('m')
                        .long("method")
                        .help("Normalisation method (reinhard, custom, ruifrok, macenko, vahadane)")
                        .value_name("NAME")
                        .default_value("reinhard"),
                )
                .arg(
                    Arg::new("stain-matrix")
                        .long("stain-matrix")
                        .help("Stain matrix for the custom method, a .npy file or a .csv file without header")
                        .value_name("FILE"),
                )
                .arg(output_dir_arg("Output directory, default=stainnorm_output"))
                .arg(
                    Arg::new("file-types")
                        .long("file-types")
                        .help("File types to pick up from directories")
                        .value_name("PATTERNS")
                        .default_value(DEFAULT_STAIN_FILE_TYPES),
                ),
        )
}

/// Factory for creating command instances based on CLI arguments
///
/// This factory examines the selected subcommand and creates
/// the appropriate command instance for execution.
pub struct PatchkitCommandFactory;

impl PatchkitCommandFactory {
    /// Create a new factory instance
    pub fn new() -> Self {
        PatchkitCommandFactory
    }
}

impl Default for PatchkitCommandFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandFactory for PatchkitCommandFactory {
    fn create_command(&self, args: &ArgMatches) -> PatchResult<Box<dyn Command>> {
        match args.subcommand() {
            Some(("extract", sub_args)) => Ok(Box::new(ExtractCommand::new(sub_args)?)),
            Some(("info", sub_args)) => Ok(Box::new(InfoCommand::new(sub_args)?)),
            Some(("read-bounds", sub_args)) => Ok(Box::new(ReadBoundsCommand::new(sub_args)?)),
            Some(("slide-thumbnail", sub_args)) => Ok(Box::new(SlideThumbnailCommand::new(sub_args)?)),
            Some(("save-tiles", sub_args)) => Ok(Box::new(SaveTilesCommand::new(sub_args)?)),
            Some(("tissue-mask", sub_args)) => Ok(Box::new(TissueMaskCommand::new(sub_args)?)),
            Some(("stain-norm", sub_args)) => Ok(Box::new(StainNormCommand::new(sub_args)?)),
            Some((name, _)) => Err(PatchError::GenericError(format!("Unknown command: {}", name))),
            None => Err(PatchError::GenericError("No command given".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_extract_arguments_parse() {
        let matches = build_cli()
            .try_get_matches_from(["patchkit", "extract", "slide.png", "--pad-y", "40", "--method", "point"])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "extract");
        assert_eq!(sub.get_one::<usize>("pad-y"), Some(&40));
        assert_eq!(sub.get_one::<String>("dtype").map(String::as_str), Some("u8"));
    }

    #[test]
    fn test_factory_builds_info_command() {
        let matches = build_cli()
            .try_get_matches_from(["patchkit", "info", "slides/"])
            .unwrap();
        assert!(PatchkitCommandFactory::new().create_command(&matches).is_ok());
    }

    #[test]
    fn test_region_accepts_negative_coordinates() {
        let matches = build_cli()
            .try_get_matches_from(["patchkit", "read-bounds", "a.png", "--region", "-10", "-5", "20", "30"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        let region: Vec<i64> = sub.get_many::<i64>("region").unwrap().copied().collect();
        assert_eq!(region, vec![-10, -5, 20, 30]);
        assert!(PatchkitCommandFactory::new().create_command(&matches).is_ok());
    }

    #[test]
    fn test_factory_rejects_bad_method_combinations() {
        let factory = PatchkitCommandFactory::new();
        let matches = build_cli()
            .try_get_matches_from(["patchkit", "tissue-mask", "a.png", "--method", "Morphological", "--units", "level"])
            .unwrap();
        assert!(matches!(factory.create_command(&matches), Err(PatchError::UnsupportedMethod(_))));

        let matches = build_cli()
            .try_get_matches_from(["patchkit", "stain-norm", "a.png", "--target", "t.png", "--method", "histogram"])
            .unwrap();
        assert!(matches!(factory.create_command(&matches), Err(PatchError::UnsupportedMethod(_))));
    }

    #[test]
    fn test_tile_size_needs_two_values() {
        let result = build_cli().try_get_matches_from(["patchkit", "save-tiles", "a.png", "--tile-size", "256"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_non_numeric_padding_rejected() {
        let result = build_cli().try_get_matches_from(["patchkit", "extract", "a.png", "--pad-x", "wide"]);
        assert!(result.is_err());
    }
}
