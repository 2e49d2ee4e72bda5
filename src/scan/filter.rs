//! File and folder eligibility rules for review.

use std::path::Path;

/// Extensions (without the dot) that are sent to review.
/// Matched case-sensitively against the raw extension.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "html", "css", "py", "java", "c", "cpp", "h",
];

/// Project metadata files that are never touched, whatever their extension.
pub const BLOCKED_FILES: &[&str] = &[
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    ".env",
    ".env.local",
    ".env.development",
    ".env.production",
    "README.md",
    "LICENSE",
    ".gitignore",
    "tsconfig.json",
    "jsconfig.json",
];

/// Generated, minified or test files.
pub const IGNORED_SUFFIXES: &[&str] = &[".min.js", ".test.js", ".spec.js", ".d.ts", ".map"];

/// Build output, dependency and VCS folders.
pub const BLOCKED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    ".vscode",
    "coverage",
    "bin",
    "obj",
    "venv",
    "__pycache__",
];

/// Static asset folders, only skipped when `skip_asset_folders` is on.
pub const ASSET_DIRS: &[&str] = &["public", "assets"];

#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    extra_blocked_dirs: Vec<String>,
    skip_asset_folders: bool,
}

impl PathFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_asset_folders(mut self, skip: bool) -> Self {
        self.skip_asset_folders = skip;
        self
    }

    pub fn with_blocked_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_blocked_dirs
            .extend(dirs.into_iter().map(Into::into));
        self
    }

    /// Whether a file with this name should be reviewed.
    pub fn is_eligible(&self, file_name: &str) -> bool {
        let allowed = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext));

        allowed
            && !BLOCKED_FILES.contains(&file_name)
            && !IGNORED_SUFFIXES
                .iter()
                .any(|suffix| file_name.ends_with(suffix))
    }

    /// Whether the scanner should descend into a directory with this name.
    pub fn is_traversable(&self, dir_name: &str) -> bool {
        if BLOCKED_DIRS.contains(&dir_name) {
            return false;
        }
        if self.skip_asset_folders && ASSET_DIRS.contains(&dir_name) {
            return false;
        }
        !self.extra_blocked_dirs.iter().any(|d| d == dir_name)
    }
}
