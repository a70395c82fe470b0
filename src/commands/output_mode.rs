//! Argument helpers shared by the slide commands

use std::path::{Path, PathBuf};

use clap::ArgMatches;

use crate::errors::{PatchError, PatchResult};

/// What a command does with its result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Print a summary to stdout
    Show,
    /// Write the result to disk
    Save,
}

impl OutputMode {
    pub fn from_name(name: &str) -> PatchResult<Self> {
        match name.trim().to_lowercase().as_str() {
            "show" => Ok(OutputMode::Show),
            "save" => Ok(OutputMode::Save),
            _ => Err(PatchError::InvalidInput(format!("Unknown mode '{}', use show or save", name))),
        }
    }

    /// Mode selected by `--mode`, `show` when absent
    pub fn from_args(args: &ArgMatches) -> PatchResult<Self> {
        match args.get_one::<String>("mode") {
            Some(name) => OutputMode::from_name(name),
            None => Ok(OutputMode::Show),
        }
    }
}

/// Path given for a required argument
pub fn required_path(args: &ArgMatches, id: &str) -> PatchResult<PathBuf> {
    args.get_one::<String>(id)
        .map(PathBuf::from)
        .ok_or_else(|| PatchError::InvalidInput(format!("Missing {} path", id)))
}

/// `<input dir>/../<file_name>`, the default location of single-image outputs
pub fn default_output_path(input: &Path, file_name: &str) -> PathBuf {
    input
        .parent()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("."))
        .join(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names() {
        assert_eq!(OutputMode::from_name("SAVE").unwrap(), OutputMode::Save);
        assert!(OutputMode::from_name("display").is_err());
    }

    #[test]
    fn test_default_output_path_sits_beside_input_dir() {
        let path = default_output_path(Path::new("/data/slides/a.png"), "slide_thumb.jpg");
        assert_eq!(path, PathBuf::from("/data/slide_thumb.jpg"));
    }
}
