use crate::error::{CliError, Result};
use std::path::{Path, PathBuf};

pub fn parse_counts(list: &str) -> Result<Vec<usize>> {
    list.split(',')
        .map(|s| {
            s.trim()
                .parse::<usize>()
                .map_err(|_| CliError::Argument(format!("'{s}' is not a point count")))
        })
        .collect()
}

pub fn parse_floats(list: &str) -> Result<Vec<f64>> {
    list.split(',')
        .map(|s| {
            s.trim()
                .parse::<f64>()
                .map_err(|_| CliError::Argument(format!("'{s}' is not a number")))
        })
        .collect()
}

pub fn parse_paths(list: &str) -> Vec<PathBuf> {
    list.split(',').map(|s| PathBuf::from(s.trim())).collect()
}

/// Splits a path into everything before the final extension and the
/// extension itself including its dot (empty when there is none).
fn split_extension(path: &Path) -> (String, String) {
    let as_str = path.to_string_lossy();
    match path.extension() {
        Some(ext) => {
            let ext = format!(".{}", ext.to_string_lossy());
            let stem = as_str[..as_str.len() - ext.len()].to_string();
            (stem, ext)
        }
        None => (as_str.to_string(), String::new()),
    }
}

/// `{stem}{suffix}{ext}`, used for the `_shell{i}` / `_bvec` / `_bval`
/// output naming.
pub fn suffixed_path(path: &Path, suffix: &str) -> PathBuf {
    let (stem, ext) = split_extension(path);
    PathBuf::from(format!("{stem}{suffix}{ext}"))
}

pub fn shell_path(path: &Path, shell: usize) -> PathBuf {
    suffixed_path(path, &format!("_shell{shell}"))
}

/// Output paths for one scheme: the plain path for a single shell, numbered
/// shell files otherwise.
pub fn scheme_paths(path: &Path, num_shells: usize) -> Vec<PathBuf> {
    if num_shells == 1 {
        vec![path.to_path_buf()]
    } else {
        (0..num_shells).map(|i| shell_path(path, i)).collect()
    }
}
