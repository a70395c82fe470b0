//! Readers for points files
//!
//! Points can be supplied as CSV (`label,x,y` rows, optional header) or
//! JSON (an array of `{"label", "x", "y"}` objects or `[label, x, y]`
//! triples). Fractional coordinates are truncated toward zero.

use std::fs;
use std::path::Path;

use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use serde_json::Value;

use crate::errors::{PatchError, PatchResult};
use crate::utils::csv_utils::parse_records;
use super::point::{Point, PointSet};

lazy_static! {
    // Plain decimal or scientific notation number
    static ref NUMBER_PATTERN: Regex =
        Regex::new(r"^[-+]?(\d+(\.\d*)?|\.\d+)([eE][-+]?\d+)?$").unwrap();
}

/// Header names accepted for the label column
const LABEL_COLUMNS: [&str; 5] = ["label", "l", "class", "type", "cell_type"];

/// Column positions of label, x and y in a CSV file
#[derive(Debug, Clone, Copy, PartialEq)]
struct ColumnLayout {
    label: usize,
    x: usize,
    y: usize,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        ColumnLayout { label: 0, x: 1, y: 2 }
    }
}

impl ColumnLayout {
    /// Build a layout from header names
    fn from_header(fields: &[String], line: usize) -> PatchResult<Self> {
        match (
            column_position(fields, &LABEL_COLUMNS),
            column_position(fields, &["x"]),
            column_position(fields, &["y"]),
        ) {
            (Some(label), Some(x), Some(y)) => Ok(ColumnLayout { label, x, y }),
            _ => Err(PatchError::PointsError {
                line,
                message: format!("Header must name label, x and y columns, got '{}'", fields.join(",")),
            }),
        }
    }

    fn width(&self) -> usize {
        self.label.max(self.x).max(self.y) + 1
    }
}

fn column_position(fields: &[String], names: &[&str]) -> Option<usize> {
    fields.iter().position(|f| {
        let lowered = f.to_lowercase();
        names.iter().any(|name| *name == lowered)
    })
}

fn parse_coordinate(value: &str, line: usize, axis: &str) -> PatchResult<i64> {
    if !NUMBER_PATTERN.is_match(value) {
        return Err(PatchError::PointsError {
            line,
            message: format!("Invalid {} coordinate '{}'", axis, value),
        });
    }

    value.parse::<f64>()
        .map(|v| v.trunc() as i64)
        .map_err(|e| PatchError::PointsError { line, message: format!("Invalid {} coordinate '{}': {}", axis, value, e) })
}

/// Parse points from CSV text
///
/// Blank lines and lines starting with `#` are skipped and quoted fields
/// may contain commas. The first record is treated as a header when its
/// coordinate columns are not numeric.
pub fn parse_points_csv(content: &str) -> PatchResult<PointSet> {
    let mut points = PointSet::new();
    let mut layout = ColumnLayout::default();

    for (index, record) in parse_records(content)?.into_iter().enumerate() {
        let fields = record.fields;

        if index == 0 {
            let looks_numeric = fields.len() >= 3
                && NUMBER_PATTERN.is_match(&fields[layout.x])
                && NUMBER_PATTERN.is_match(&fields[layout.y]);
            if !looks_numeric {
                layout = ColumnLayout::from_header(&fields, record.line)?;
                debug!("Using CSV header layout {:?}", layout);
                continue;
            }
        }

        if fields.len() < layout.width() {
            return Err(PatchError::PointsError {
                line: record.line,
                message: format!("Expected at least {} columns, found {}", layout.width(), fields.len()),
            });
        }

        let x = parse_coordinate(&fields[layout.x], record.line, "x")?;
        let y = parse_coordinate(&fields[layout.y], record.line, "y")?;
        points.push(Point::new(fields[layout.label].clone(), x, y));
    }

    Ok(points)
}

fn json_label(value: &Value, line: usize) -> PatchResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(PatchError::PointsError { line, message: format!("Invalid label {}", other) }),
    }
}

fn json_coordinate(value: Option<&Value>, line: usize, axis: &str) -> PatchResult<i64> {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if NUMBER_PATTERN.is_match(s.trim()) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    number
        .map(|v| v.trunc() as i64)
        .ok_or_else(|| PatchError::PointsError { line, message: format!("Missing or invalid {} coordinate", axis) })
}

/// Parse points from JSON text
///
/// Element numbers in errors are 1-based positions in the top-level array.
pub fn parse_points_json(content: &str) -> PatchResult<PointSet> {
    let root: Value = serde_json::from_str(content)
        .map_err(|e| PatchError::PointsError { line: e.line(), message: e.to_string() })?;

    let Value::Array(items) = root else {
        return Err(PatchError::PointsError {
            line: 1,
            message: "Expected a top-level array of points".to_string(),
        });
    };

    let mut points = PointSet::new();
    for (index, item) in items.iter().enumerate() {
        let element = index + 1;
        let point = match item {
            Value::Object(map) => {
                let label_value = LABEL_COLUMNS.iter().find_map(|key| map.get(*key));
                let label = match label_value {
                    Some(v) => json_label(v, element)?,
                    None => return Err(PatchError::PointsError {
                        line: element,
                        message: "Missing label".to_string(),
                    }),
                };
                let x = json_coordinate(map.get("x"), element, "x")?;
                let y = json_coordinate(map.get("y"), element, "y")?;
                Point::new(label, x, y)
            },
            Value::Array(values) if values.len() >= 3 => {
                let label = json_label(&values[0], element)?;
                let x = json_coordinate(values.get(1), element, "x")?;
                let y = json_coordinate(values.get(2), element, "y")?;
                Point::new(label, x, y)
            },
            other => return Err(PatchError::PointsError {
                line: element,
                message: format!("Expected an object or [label, x, y] array, got {}", other),
            }),
        };
        points.push(point);
    }

    Ok(points)
}

/// Read a points file, choosing the parser by extension
///
/// # Arguments
/// * `path` - Path to a `.csv` or `.json` file
///
/// # Returns
/// The points in file order
pub fn read_points(path: &Path) -> PatchResult<PointSet> {
    let extension = path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("")
        .to_lowercase();

    info!("Reading points from {}", path.display());

    let points = match extension.as_str() {
        "csv" => parse_points_csv(&fs::read_to_string(path)?)?,
        "json" => parse_points_json(&fs::read_to_string(path)?)?,
        _ => return Err(PatchError::InvalidInput(format!(
            "Please input correct csv or json points path: {}", path.display()
        ))),
    };

    info!("Read {} points with labels {:?}", points.len(), points.labels());
    Ok(points)
}
