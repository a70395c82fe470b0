//! Extraction configuration files
//!
//! Settings can be kept in a TOML file instead of being passed on the
//! command line every time:
//!
//! ```toml
//! [extraction]
//! method = "point"
//! patch_height = 64
//! patch_width = 64
//! pad_y = 40
//! pad_x = 40
//! num_examples_per_patch = 9
//!
//! [output]
//! format = "npy"
//! directory = "patches"
//! name = "cells"
//! ```
//!
//! Every key is optional; missing keys keep their defaults. Command-line
//! flags override values read from the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info};

use crate::errors::{PatchError, PatchResult};
use crate::extractor::{OutputFormat, PatchStrategy, DEFAULT_EXAMPLES_PER_POINT, DEFAULT_PATCH_SIZE};

/// Default base name for saved outputs
pub const DEFAULT_OUTPUT_NAME: &str = "patches";

/// Parameters of the patch extractor
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSettings {
    pub method: String,
    pub patch_height: usize,
    pub patch_width: usize,
    pub pad_y: usize,
    pub pad_x: usize,
    pub num_examples_per_patch: usize,
    pub stride_h: usize,
    pub stride_w: usize,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        ExtractionSettings {
            method: PatchStrategy::Point.name().to_string(),
            patch_height: DEFAULT_PATCH_SIZE,
            patch_width: DEFAULT_PATCH_SIZE,
            pad_y: 0,
            pad_x: 0,
            num_examples_per_patch: DEFAULT_EXAMPLES_PER_POINT,
            stride_h: 1,
            stride_w: 1,
        }
    }
}

/// Where and how extracted patches are written
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    pub format: OutputFormat,
    /// Output directory; the CLI falls back to a directory next to the input
    pub directory: Option<PathBuf>,
    pub name: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        OutputSettings {
            format: OutputFormat::Npy,
            directory: None,
            name: DEFAULT_OUTPUT_NAME.to_string(),
        }
    }
}

/// Complete configuration file contents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchkitConfig {
    pub extraction: ExtractionSettings,
    pub output: OutputSettings,
}

impl FromStr for PatchkitConfig {
    type Err = PatchError;

    /// Parse a configuration from a TOML string
    fn from_str(content: &str) -> PatchResult<Self> {
        let toml_value: toml::Value = content
            .parse()
            .map_err(|e: toml::de::Error| PatchError::ConfigError(format!("Invalid TOML: {}", e)))?;

        let mut config = PatchkitConfig::default();

        if let Some(table) = toml_value.get("extraction") {
            Self::parse_extraction(table, &mut config.extraction)?;
        }
        if let Some(table) = toml_value.get("output") {
            Self::parse_output(table, &mut config.output)?;
        }

        config.validate()?;
        Ok(config)
    }
}

impl PatchkitConfig {
    /// Load a configuration file
    pub fn load(path: &Path) -> PatchResult<Self> {
        info!("Loading configuration from {}", path.display());
        let content = fs::read_to_string(path)?;
        let config: PatchkitConfig = content.parse()?;
        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Check values that cannot be expressed by the TOML types alone
    pub fn validate(&self) -> PatchResult<()> {
        PatchStrategy::from_name(&self.extraction.method)
            .map_err(|_| PatchError::ConfigError(format!("Unknown method '{}'", self.extraction.method)))?;

        let settings = &self.extraction;
        for (key, value) in [
            ("patch_height", settings.patch_height),
            ("patch_width", settings.patch_width),
            ("num_examples_per_patch", settings.num_examples_per_patch),
            ("stride_h", settings.stride_h),
            ("stride_w", settings.stride_w),
        ] {
            if value == 0 {
                return Err(PatchError::ConfigError(format!("{} must be positive", key)));
            }
        }

        if self.output.name.trim().is_empty() {
            return Err(PatchError::ConfigError("output name must not be empty".to_string()));
        }

        Ok(())
    }

    fn parse_extraction(table: &toml::Value, settings: &mut ExtractionSettings) -> PatchResult<()> {
        if let Some(method) = read_string(table, "extraction", "method")? {
            settings.method = method;
        }

        let fields: [(&str, &mut usize); 7] = [
            ("patch_height", &mut settings.patch_height),
            ("patch_width", &mut settings.patch_width),
            ("pad_y", &mut settings.pad_y),
            ("pad_x", &mut settings.pad_x),
            ("num_examples_per_patch", &mut settings.num_examples_per_patch),
            ("stride_h", &mut settings.stride_h),
            ("stride_w", &mut settings.stride_w),
        ];
        for (key, target) in fields {
            if let Some(value) = read_usize(table, "extraction", key)? {
                *target = value;
            }
        }

        Ok(())
    }

    fn parse_output(table: &toml::Value, settings: &mut OutputSettings) -> PatchResult<()> {
        if let Some(format) = read_string(table, "output", "format")? {
            settings.format = OutputFormat::from_name(&format)
                .map_err(|_| PatchError::ConfigError(format!("Unknown output format '{}'", format)))?;
        }
        if let Some(directory) = read_string(table, "output", "directory")? {
            settings.directory = Some(PathBuf::from(directory));
        }
        if let Some(name) = read_string(table, "output", "name")? {
            settings.name = name;
        }
        Ok(())
    }
}

fn read_string(table: &toml::Value, table_name: &str, key: &str) -> PatchResult<Option<String>> {
    match table.get(key) {
        None => Ok(None),
        Some(toml::Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(PatchError::ConfigError(format!(
            "{}.{} must be a string, got {}", table_name, key, other.type_str()
        ))),
    }
}

fn read_usize(table: &toml::Value, table_name: &str, key: &str) -> PatchResult<Option<usize>> {
    match table.get(key) {
        None => Ok(None),
        Some(toml::Value::Integer(i)) if *i >= 0 => Ok(Some(*i as usize)),
        Some(toml::Value::Integer(i)) => Err(PatchError::ConfigError(format!(
            "{}.{} must not be negative, got {}", table_name, key, i
        ))),
        Some(other) => Err(PatchError::ConfigError(format!(
            "{}.{} must be an integer, got {}", table_name, key, other.type_str()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = "".parse::<PatchkitConfig>().unwrap();
        assert_eq!(config, PatchkitConfig::default());
        assert_eq!(config.extraction.patch_height, 224);
        assert_eq!(config.extraction.num_examples_per_patch, 9);
    }

    #[test]
    fn test_full_config() {
        let content = r#"
            [extraction]
            method = "Point"
            patch_height = 64
            patch_width = 32
            pad_y = 40
            pad_x = 20
            num_examples_per_patch = 25

            [output]
            format = "png"
            directory = "out/patches"
            name = "cells"
        "#;
        let config = content.parse::<PatchkitConfig>().unwrap();

        assert_eq!(config.extraction.method, "Point");
        assert_eq!(config.extraction.patch_width, 32);
        assert_eq!(config.extraction.pad_y, 40);
        assert_eq!(config.extraction.num_examples_per_patch, 25);
        assert_eq!(config.output.format, OutputFormat::Png);
        assert_eq!(config.output.directory, Some(PathBuf::from("out/patches")));
        assert_eq!(config.output.name, "cells");
    }

    #[test]
    fn test_negative_padding_rejected() {
        let err = PatchkitConfig::from_str("[extraction]\npad_y = -1\n").unwrap_err();
        assert!(matches!(err, PatchError::ConfigError(msg) if msg.contains("pad_y")));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let err = PatchkitConfig::from_str("[extraction]\npatch_height = \"big\"\n").unwrap_err();
        assert!(matches!(err, PatchError::ConfigError(_)));
    }

    #[test]
    fn test_unknown_method_rejected() {
        let err = PatchkitConfig::from_str("[extraction]\nmethod = \"grid\"\n").unwrap_err();
        assert!(matches!(err, PatchError::ConfigError(_)));
    }

    #[test]
    fn test_zero_patch_rejected() {
        assert!(PatchkitConfig::from_str("[extraction]\npatch_width = 0\n").is_err());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            PatchkitConfig::from_str("[extraction"),
            Err(PatchError::ConfigError(_))
        ));
    }
}
