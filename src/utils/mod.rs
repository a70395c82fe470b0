//! Utility modules for common functionality
//!
//! This module provides logging, progress reporting, file discovery and CSV handling
//! used throughout the application.

pub mod logger;
pub mod progress;
pub mod file_utils;
pub mod csv_utils;
