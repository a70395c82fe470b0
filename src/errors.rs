//! Custom error types for patch extraction

use std::fmt;
use std::io;

/// Patch extraction error types
#[derive(Debug)]
pub enum PatchError {
    /// I/O error
    IoError(io::Error),
    /// Image decoding or encoding error
    ImageError(image::ImageError),
    /// Image or points argument has an unsupported type or shape
    InvalidInput(String),
    /// Requested extraction strategy is not recognized
    UnsupportedMethod(String),
    /// Operation is not supported by the selected strategy
    UnsupportedOperation(String),
    /// Strategy exists but has no implementation yet
    NotImplemented(String),
    /// Malformed configuration file or value
    ConfigError(String),
    /// Malformed points file
    PointsError {
        /// 1-based line (CSV) or element (JSON) number
        line: usize,
        message: String,
    },
    /// Generic error with message
    GenericError(String),
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchError::IoError(e) => write!(f, "I/O error: {}", e),
            PatchError::ImageError(e) => write!(f, "Image error: {}", e),
            PatchError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            PatchError::UnsupportedMethod(name) => write!(f, "Unsupported extraction method: {}", name),
            PatchError::UnsupportedOperation(msg) => write!(f, "Unsupported operation: {}", msg),
            PatchError::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            PatchError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            PatchError::PointsError { line, message } => write!(f, "Points error at line {}: {}", line, message),
            PatchError::GenericError(msg) => write!(f, "Patch error: {}", msg),
        }
    }
}

impl std::error::Error for PatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PatchError::IoError(e) => Some(e),
            PatchError::ImageError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PatchError {
    fn from(error: io::Error) -> Self {
        PatchError::IoError(error)
    }
}

impl From<image::ImageError> for PatchError {
    fn from(error: image::ImageError) -> Self {
        PatchError::ImageError(error)
    }
}

/// Result type for patch extraction operations
pub type PatchResult<T> = Result<T, PatchError>;

impl From<String> for PatchError {
    fn from(msg: String) -> Self {
        PatchError::GenericError(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = PatchError::UnsupportedMethod("grid".to_string());
        assert_eq!(err.to_string(), "Unsupported extraction method: grid");

        let err = PatchError::PointsError { line: 3, message: "bad x".to_string() };
        assert_eq!(err.to_string(), "Points error at line 3: bad x");
    }

    #[test]
    fn test_from_io_error_keeps_source() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: PatchError = io_err.into();
        assert!(matches!(err, PatchError::IoError(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
