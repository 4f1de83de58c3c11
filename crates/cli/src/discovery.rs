//! Recursive discovery of Solidity inputs.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Find every `.sol` file under `dir`, sorted for deterministic batch order.
pub fn discover_contracts(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        bail!("input directory does not exist: {}", dir.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.with_context(|| format!("walking {}", dir.display()))?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "sol") {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    tracing::debug!(count = files.len(), dir = %dir.display(), "discovered contracts");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_sol_files_recursively_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("B.sol"), "contract B {}").unwrap();
        std::fs::write(dir.path().join("nested/A.sol"), "contract A {}").unwrap();
        std::fs::write(dir.path().join("README.md"), "not solidity").unwrap();

        let files = discover_contracts(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("B.sol"));
        assert!(files[1].ends_with("nested/A.sol"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(discover_contracts(Path::new("/no/such/dir")).is_err());
    }
}
