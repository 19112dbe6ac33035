use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::errors::{InferError, Result};

/// Entries directly under `path` whose file name ends with `extension`.
///
/// The match is on the raw name suffix, so `.png` does not match `a.PNG`. An
/// empty `extension` matches every entry. The order of the result is
/// unspecified.
pub fn get_files_list(path: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(path).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| InferError::FileSystem {
            path: path.to_path_buf(),
            operation: "list directory".to_string(),
            source: e.into(),
        })?;
        if entry
            .file_name()
            .as_encoded_bytes()
            .ends_with(extension.as_bytes())
        {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}
