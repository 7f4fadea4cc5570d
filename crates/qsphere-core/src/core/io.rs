//! Gradient-direction and scalar file formats.
//!
//! A point file is whitespace-separated floating triples, one point per line
//! (N×3), optionally stored transposed as 3×N (the "fslgrad" layout). A scalar
//! file holds one value per line, or a single space-separated line in the
//! transposed layout.

use nalgebra::Vector3;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("I/O error on '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{path}': {message}", path = path.display())]
    Parse { path: PathBuf, message: String },
}

fn read_rows(path: &Path) -> Result<Vec<Vec<f64>>, IoError> {
    let content = fs::read_to_string(path).map_err(|source| IoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rows = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row: Result<Vec<f64>, _> = line.split_whitespace().map(str::parse).collect();
        rows.push(row.map_err(|e| IoError::Parse {
            path: path.to_path_buf(),
            message: format!("line {}: {}", lineno + 1, e),
        })?);
    }
    Ok(rows)
}

/// Reads a point file; `transposed` selects the 3×N fslgrad layout.
pub fn read_points(path: &Path, transposed: bool) -> Result<Vec<Vector3<f64>>, IoError> {
    let rows = read_rows(path)?;
    let table = if transposed { transpose(path, rows)? } else { rows };
    table
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            if row.len() != 3 {
                return Err(IoError::Parse {
                    path: path.to_path_buf(),
                    message: format!("point {} has {} components, expected 3", i, row.len()),
                });
            }
            Ok(Vector3::new(row[0], row[1], row[2]))
        })
        .collect()
}

fn transpose(path: &Path, rows: Vec<Vec<f64>>) -> Result<Vec<Vec<f64>>, IoError> {
    let width = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|r| r.len() != width) {
        return Err(IoError::Parse {
            path: path.to_path_buf(),
            message: "ragged rows in transposed file".to_string(),
        });
    }
    Ok((0..width)
        .map(|c| rows.iter().map(|r| r[c]).collect())
        .collect())
}

/// Writes a point file; `transposed` selects the 3×N fslgrad layout.
pub fn write_points(
    path: &Path,
    points: &[Vector3<f64>],
    transposed: bool,
) -> Result<(), IoError> {
    let body = if transposed {
        (0..3)
            .map(|c| {
                points
                    .iter()
                    .map(|p| p[c].to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        points
            .iter()
            .map(|p| format!("{} {} {}", p.x, p.y, p.z))
            .collect::<Vec<_>>()
            .join("\n")
    };
    fs::write(path, body + "\n").map_err(|source| IoError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a scalar file; in the transposed layout all values share one line.
pub fn read_scalars(path: &Path, transposed: bool) -> Result<Vec<f64>, IoError> {
    let rows = read_rows(path)?;
    if transposed {
        return Ok(rows.into_iter().next().unwrap_or_default());
    }
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            if row.len() != 1 {
                return Err(IoError::Parse {
                    path: path.to_path_buf(),
                    message: format!("scalar line {} holds {} values", i + 1, row.len()),
                });
            }
            Ok(row[0])
        })
        .collect()
}

pub fn write_scalars(path: &Path, values: &[f64], transposed: bool) -> Result<(), IoError> {
    let strings: Vec<String> = values.iter().map(f64::to_string).collect();
    let body = if transposed {
        strings.join(" ")
    } else {
        strings.join("\n")
    };
    fs::write(path, body + "\n").map_err(|source| IoError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads matching point and scalar files and groups the points by distinct
/// scalar label, preserving first-seen label order.
pub fn read_labeled_points(
    point_path: &Path,
    scalar_path: &Path,
    transposed: bool,
) -> Result<(Vec<f64>, Vec<Vec<Vector3<f64>>>), IoError> {
    let points = read_points(point_path, transposed)?;
    let scalars = read_scalars(scalar_path, transposed)?;
    if points.len() != scalars.len() {
        return Err(IoError::Parse {
            path: scalar_path.to_path_buf(),
            message: format!(
                "{} scalar labels for {} points",
                scalars.len(),
                points.len()
            ),
        });
    }
    let mut labels: Vec<f64> = Vec::new();
    let mut groups: Vec<Vec<Vector3<f64>>> = Vec::new();
    for (point, label) in points.into_iter().zip(scalars) {
        match labels.iter().position(|&l| l == label) {
            Some(idx) => groups[idx].push(point),
            None => {
                labels.push(label);
                groups.push(vec![point]);
            }
        }
    }
    Ok((labels, groups))
}
