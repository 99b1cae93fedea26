use crate::types::{DatasetError, DatasetResult};
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// List the images directly under `root` in sorted order, keeping at most `limit`.
///
/// A readable folder without any images is `DatasetError::Empty`.
pub fn index_images(root: &Path, limit: Option<usize>) -> DatasetResult<Vec<PathBuf>> {
    let entries = fs::read_dir(root).map_err(|e| DatasetError::Io {
        path: root.to_path_buf(),
        source: e,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && is_image_path(p))
        .collect();
    if paths.is_empty() {
        return Err(DatasetError::Empty {
            path: root.to_path_buf(),
        });
    }
    paths.sort();
    if let Some(limit) = limit {
        paths.truncate(limit);
    }
    Ok(paths)
}
