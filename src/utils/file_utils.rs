//! File discovery utilities
//!
//! Collects input images from a directory using glob-like file type
//! patterns such as `"*.png, *.jpg"`.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use regex::Regex;

use crate::errors::{PatchError, PatchResult};

/// Default image file types picked up from directories
pub const DEFAULT_FILE_TYPES: &str = "*.png, *.jpg, *.jpeg, *.tif, *.tiff";

/// Compile a comma-separated list of glob patterns into one regex
///
/// `*` matches any run of characters and `?` a single character; matching
/// is case-insensitive and applies to the file name only.
pub fn file_types_to_regex(file_types: &str) -> PatchResult<Regex> {
    let alternatives: Vec<String> = file_types
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|pattern| {
            regex::escape(pattern)
                .replace(r"\*", ".*")
                .replace(r"\?", ".")
        })
        .collect();

    if alternatives.is_empty() {
        return Err(PatchError::InvalidInput("No file types given".to_string()));
    }

    let expression = format!("(?i)^(?:{})$", alternatives.join("|"));
    Regex::new(&expression)
        .map_err(|e| PatchError::InvalidInput(format!("Invalid file types '{}': {}", file_types, e)))
}

/// List files directly inside `dir` whose names match `file_types`
///
/// # Returns
/// Matching paths in sorted order
pub fn grab_files_from_dir(dir: &Path, file_types: &str) -> PatchResult<Vec<PathBuf>> {
    let pattern = file_types_to_regex(file_types)?;
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }

        let matches = path
            .file_name()
            .and_then(std::ffi::OsStr::to_str)
            .map(|name| pattern.is_match(name))
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }

    files.sort();
    debug!("Found {} files matching '{}' in {}", files.len(), file_types, dir.display());
    Ok(files)
}

/// Resolve an input argument into the list of files to process
///
/// A file is returned as-is; a directory is searched with `file_types`.
pub fn collect_inputs(input: &Path, file_types: &str) -> PatchResult<Vec<PathBuf>> {
    if input.is_dir() {
        grab_files_from_dir(input, file_types)
    } else if input.is_file() {
        Ok(vec![input.to_path_buf()])
    } else {
        Err(PatchError::InvalidInput(format!("{} is neither a file nor a directory", input.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching() {
        let re = file_types_to_regex("*.png, *.JPG, tile_?.tif").unwrap();
        assert!(re.is_match("slide.png"));
        assert!(re.is_match("slide.jpg"));
        assert!(re.is_match("tile_1.tif"));
        assert!(!re.is_match("tile_12.tif"));
        assert!(!re.is_match("slide.png.bak"));
    }

    #[test]
    fn test_empty_pattern_list() {
        assert!(file_types_to_regex(" , ").is_err());
    }

    #[test]
    fn test_grab_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.PNG", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let files = grab_files_from_dir(dir.path(), "*.png").unwrap();
        let names: Vec<_> = files.iter().map(|p| p.file_name().unwrap().to_str().unwrap().to_string()).collect();
        assert_eq!(names, vec!["a.PNG", "b.png"]);
    }

    #[test]
    fn test_collect_inputs_missing() {
        assert!(collect_inputs(Path::new("/no/such/input"), DEFAULT_FILE_TYPES).is_err());
    }
}
