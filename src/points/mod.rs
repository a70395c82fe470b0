//! Points of interest for point-centered extraction
//!
//! This module defines labeled points and the readers that turn CSV or
//! JSON files into point sets.

mod point;
mod reader;

pub use point::{Point, PointSet};
pub use reader::{parse_points_csv, parse_points_json, read_points};
