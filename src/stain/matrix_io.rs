//! Loading stain matrices from disk
//!
//! Accepts header-less CSV files with one stain per row, or NumPy `.npy`
//! files holding a 2-D little-endian float array in C order.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use lazy_static::lazy_static;
use log::debug;
use ndarray::Array2;
use regex::Regex;

use crate::errors::{PatchError, PatchResult};
use crate::utils::csv_utils::parse_records;

lazy_static! {
    static ref DESCR_PATTERN: Regex = Regex::new(r"'descr'\s*:\s*'([^']+)'").unwrap();
    static ref FORTRAN_PATTERN: Regex = Regex::new(r"'fortran_order'\s*:\s*(True|False)").unwrap();
    static ref SHAPE_PATTERN: Regex = Regex::new(r"'shape'\s*:\s*\(([^)]*)\)").unwrap();
}

/// Load a stain matrix, choosing the parser from the file extension
pub fn load_stain_matrix(path: &Path) -> PatchResult<Array2<f64>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let matrix = match extension.as_str() {
        "csv" => parse_stain_csv(&fs::read_to_string(path)?)?,
        "npy" => read_npy_matrix(&mut BufReader::new(File::open(path)?))?,
        _ => return Err(PatchError::InvalidInput(format!(
            "Stain matrix must be a .csv or .npy file, got {}", path.display()
        ))),
    };

    debug!("Loaded {:?} stain matrix from {}", matrix.dim(), path.display());
    Ok(matrix)
}

/// Parse a header-less CSV stain matrix
pub fn parse_stain_csv(content: &str) -> PatchResult<Array2<f64>> {
    let records = parse_records(content)?;
    let width = records.first().map(|r| r.fields.len()).unwrap_or(0);
    if width == 0 {
        return Err(PatchError::InvalidInput("Stain matrix CSV is empty".to_string()));
    }

    let mut values = Vec::with_capacity(records.len() * width);
    for record in &records {
        if record.fields.len() != width {
            return Err(PatchError::InvalidInput(format!(
                "Stain matrix line {}: expected {} values, found {}", record.line, width, record.fields.len()
            )));
        }
        for field in &record.fields {
            let value = field.trim().parse::<f64>().map_err(|_| PatchError::InvalidInput(format!(
                "Stain matrix line {}: '{}' is not a number (stain matrix files have no header)", record.line, field
            )))?;
            values.push(value);
        }
    }

    Array2::from_shape_vec((records.len(), width), values)
        .map_err(|e| PatchError::InvalidInput(format!("Malformed stain matrix: {}", e)))
}

/// Read a 2-D `<f8` or `<f4` NPY array
pub fn read_npy_matrix<R: Read>(reader: &mut R) -> PatchResult<Array2<f64>> {
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic != b"\x93NUMPY" {
        return Err(PatchError::InvalidInput("Not an NPY file".to_string()));
    }

    let major = reader.read_u8()?;
    let _minor = reader.read_u8()?;
    let header_len = match major {
        1 => reader.read_u16::<LittleEndian>()? as usize,
        2 | 3 => reader.read_u32::<LittleEndian>()? as usize,
        _ => return Err(PatchError::InvalidInput(format!("Unsupported NPY version {}", major))),
    };

    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header)?;
    let header = String::from_utf8_lossy(&header);

    let capture = |pattern: &Regex, name: &str| -> PatchResult<String> {
        pattern
            .captures(&header)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| PatchError::InvalidInput(format!("NPY header has no '{}' entry", name)))
    };

    let descr = capture(&DESCR_PATTERN, "descr")?;
    if capture(&FORTRAN_PATTERN, "fortran_order")? == "True" {
        return Err(PatchError::UnsupportedOperation("Fortran-ordered NPY arrays are not supported".to_string()));
    }
    let shape: Vec<usize> = capture(&SHAPE_PATTERN, "shape")?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|e| PatchError::InvalidInput(format!("Malformed NPY shape: {}", e)))?;

    let (rows, cols) = match shape.as_slice() {
        [rows, cols] => (*rows, *cols),
        _ => return Err(PatchError::InvalidInput(format!("Stain matrix must be 2-D, got shape {:?}", shape))),
    };
    let count = rows
        .checked_mul(cols)
        .filter(|&n| n <= 64)
        .ok_or_else(|| PatchError::InvalidInput(format!("Stain matrix shape {:?} is too large", shape)))?;

    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let value = match descr.as_str() {
            "<f8" => reader.read_f64::<LittleEndian>()?,
            "<f4" => reader.read_f32::<LittleEndian>()? as f64,
            other => return Err(PatchError::UnsupportedOperation(format!(
                "NPY dtype {} is not supported, use float32 or float64", other
            ))),
        };
        values.push(value);
    }

    Array2::from_shape_vec((rows, cols), values)
        .map_err(|e| PatchError::InvalidInput(format!("Malformed stain matrix: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::{Cursor, Write};

    fn npy_bytes(descr: &str, shape: &str, values: &[f64]) -> Vec<u8> {
        let header = format!("{{'descr': '{}', 'fortran_order': False, 'shape': ({}), }}\n", descr, shape);
        let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
        bytes.write_u16::<LittleEndian>(header.len() as u16).unwrap();
        bytes.write_all(header.as_bytes()).unwrap();
        for v in values {
            match descr {
                "<f4" => bytes.write_f32::<LittleEndian>(*v as f32).unwrap(),
                _ => bytes.write_f64::<LittleEndian>(*v).unwrap(),
            }
        }
        bytes
    }

    #[test]
    fn test_csv_matrix() {
        let matrix = parse_stain_csv("0.65,0.70,0.29\n0.07, 0.99, 0.11\n").unwrap();
        assert_eq!(matrix.dim(), (2, 3));
        assert_eq!(matrix[[1, 1]], 0.99);
    }

    #[test]
    fn test_csv_header_rejected() {
        let result = parse_stain_csv("r,g,b\n0.65,0.70,0.29\n");
        assert!(matches!(result, Err(PatchError::InvalidInput(msg)) if msg.contains("line 1")));
        assert!(parse_stain_csv("1,2,3\n4,5\n").is_err());
    }

    #[test]
    fn test_npy_matrix() {
        let bytes = npy_bytes("<f8", "2, 3", &[0.65, 0.70, 0.29, 0.07, 0.99, 0.11]);
        let matrix = read_npy_matrix(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(matrix.dim(), (2, 3));
        assert_eq!(matrix[[0, 2]], 0.29);

        let bytes = npy_bytes("<f4", "1, 3", &[0.5, 0.25, 0.125]);
        assert_eq!(read_npy_matrix(&mut Cursor::new(bytes)).unwrap()[[0, 1]], 0.25);
    }

    #[test]
    fn test_npy_rejects_other_shapes_and_types() {
        let bytes = npy_bytes("<f8", "3,", &[1.0, 2.0, 3.0]);
        assert!(read_npy_matrix(&mut Cursor::new(bytes)).is_err());
        let bytes = npy_bytes("<i8", "1, 1", &[1.0]);
        assert!(matches!(read_npy_matrix(&mut Cursor::new(bytes)), Err(PatchError::UnsupportedOperation(_))));
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("stains.csv");
        std::fs::write(&csv, "0.65,0.70,0.29\n0.07,0.99,0.11\n").unwrap();
        assert_eq!(load_stain_matrix(&csv).unwrap().dim(), (2, 3));

        let npy = dir.path().join("stains.npy");
        std::fs::write(&npy, npy_bytes("<f8", "1, 3", &[0.1, 0.2, 0.3])).unwrap();
        assert_eq!(load_stain_matrix(&npy).unwrap().dim(), (1, 3));

        assert!(load_stain_matrix(&dir.path().join("stains.txt")).is_err());
    }
}
