//! Folder scanning
//!
//! Walks a folder depth-first and collects the files eligible for review.
//! Unreadable entries are skipped; only an unreadable root fails the scan.

pub mod filter;

pub use filter::PathFilter;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Error)]
#[error("Cannot read folder {}: {source}", path.display())]
pub struct ScanError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// A file selected for review. Content is read later, when the file's turn comes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub path: PathBuf,
    pub name: String,
    pub extension: String,
    pub size: u64,
}

/// Eligible files in traversal order.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub files: Vec<FileCandidate>,
}

impl ScanResult {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}

pub struct TreeScanner {
    filter: PathFilter,
}

impl TreeScanner {
    pub fn new(filter: PathFilter) -> Self {
        Self { filter }
    }

    /// Scan `root` depth-first, pre-order. Entries of each directory are
    /// visited in file-name order so the result is stable for a given tree.
    ///
    /// Returned paths are absolute. A file reachable through several links
    /// is returned once, under the first path that reaches it.
    pub fn scan(&self, root: &Path) -> Result<ScanResult, ScanError> {
        let scan_error = |source| ScanError {
            path: root.to_path_buf(),
            source,
        };
        let root = std::path::absolute(root).map_err(scan_error)?;
        fs::read_dir(&root).map_err(scan_error)?;

        let mut files = Vec::new();
        let mut seen = HashSet::new();
        let walker = WalkDir::new(&root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| self.should_descend(e));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    debug!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if !self.filter.is_eligible(name) {
                continue;
            }

            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(err) => {
                    debug!(path = %entry.path().display(), error = %err, "skipping file without metadata");
                    continue;
                }
            };

            let target = fs::canonicalize(entry.path()).unwrap_or_else(|_| entry.path().to_path_buf());
            if !seen.insert(target) {
                debug!(path = %entry.path().display(), "skipping file already reached through another path");
                continue;
            }

            let extension = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_string();

            files.push(FileCandidate {
                path: entry.path().to_path_buf(),
                name: name.to_string(),
                extension,
                size,
            });
        }

        Ok(ScanResult { files })
    }

    fn should_descend(&self, entry: &walkdir::DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        self.filter
            .is_traversable(&entry.file_name().to_string_lossy())
    }
}

impl Default for TreeScanner {
    fn default() -> Self {
        Self::new(PathFilter::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "let x = 1;\n").unwrap();
    }

    fn names(result: &ScanResult, root: &Path) -> Vec<String> {
        result
            .files
            .iter()
            .map(|f| {
                f.path
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn test_scan_mixed_tree_only_returns_eligible() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        for rel in [
            "src/app.js",
            "src/app.min.js",
            "src/app.test.js",
            "src/types.d.ts",
            "src/util.ts",
            "README.md",
            "package.json",
            "main.py",
            "node_modules/lib/index.js",
            ".git/hooks/pre-commit.py",
            "dist/out.js",
            "nested/build/gen.c",
            "nested/deep/core.cpp",
            "notes.txt",
        ] {
            touch(root, rel);
        }

        let result = TreeScanner::default().scan(root).unwrap();
        let found = names(&result, root);

        assert_eq!(
            found,
            vec!["main.py", "nested/deep/core.cpp", "src/app.js", "src/util.ts"]
        );
        for path in result.paths() {
            let text = path.to_string_lossy();
            assert!(!text.contains("node_modules"));
            assert!(!text.contains(".git"));
            assert!(!text.ends_with(".min.js"));
        }
    }

    #[test]
    fn test_scan_is_depth_first_preorder() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, "a/z.js");
        touch(root, "a/b/y.js");
        touch(root, "c.js");

        let result = TreeScanner::default().scan(root).unwrap();
        assert_eq!(names(&result, root), vec!["a/b/y.js", "a/z.js", "c.js"]);
    }

    #[test]
    fn test_scan_records_candidate_metadata() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "index.html");

        let result = TreeScanner::default().scan(tmp.path()).unwrap();
        let file = &result.files[0];
        assert_eq!(file.name, "index.html");
        assert_eq!(file.extension, "html");
        assert_eq!(file.size, "let x = 1;\n".len() as u64);
        assert!(file.path.is_absolute());
    }

    #[test]
    fn test_scan_missing_root_fails() {
        let tmp = TempDir::new().unwrap();
        let err = TreeScanner::default()
            .scan(&tmp.path().join("missing"))
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_scan_empty_folder_is_empty() {
        let tmp = TempDir::new().unwrap();
        let result = TreeScanner::default().scan(tmp.path()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_scan_relative_root_yields_absolute_paths() {
        let tmp = tempfile::Builder::new()
            .prefix("kritiq-scan-rel")
            .tempdir_in(".")
            .unwrap();
        touch(tmp.path(), "proj/a.py");
        let relative = Path::new(tmp.path().file_name().unwrap()).join("proj");

        let result = TreeScanner::default().scan(&relative).unwrap();
        assert_eq!(result.len(), 1);
        let path = &result.files[0].path;
        assert!(path.is_absolute());
        assert!(path.ends_with("proj/a.py"));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_returns_linked_file_once() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "shared.js");
        std::os::unix::fs::symlink(tmp.path().join("shared.js"), tmp.path().join("link.js"))
            .unwrap();

        let result = TreeScanner::default().scan(tmp.path()).unwrap();
        assert_eq!(names(&result, tmp.path()), vec!["link.js"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_skips_broken_symlink() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "ok.js");
        std::os::unix::fs::symlink(tmp.path().join("gone.js"), tmp.path().join("dangling.js"))
            .unwrap();

        let result = TreeScanner::default().scan(tmp.path()).unwrap();
        assert_eq!(names(&result, tmp.path()), vec!["ok.js"]);
    }
}
