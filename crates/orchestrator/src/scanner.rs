use crate::config::DEFAULT_MAX_FILE_SIZE_BYTES;
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A discovered file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedFile {
    /// Absolute (root-joined) path
    pub path: PathBuf,
    /// Root-relative, `/`-separated path
    pub relative: String,
    pub size_bytes: u64,
}

/// Scanner for finding analyzable files in a project
pub struct FileScanner {
    root: PathBuf,
    max_file_size_bytes: u64,
}

impl FileScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
        }
    }

    #[must_use]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size_bytes = bytes;
        self
    }

    /// Scan directory for files (.gitignore aware), sorted by relative path
    pub fn scan(&self) -> Vec<ScannedFile> {
        let mut files = Vec::new();

        let root = self.root.clone();
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(true) // skip hidden files by default
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .require_git(false);
        builder.filter_entry(move |entry| !FileScanner::is_ignored_scope(entry.path(), &root));

        for result in builder.build() {
            match result {
                Ok(entry) => {
                    let Some(file_type) = entry.file_type() else {
                        continue;
                    };
                    if !file_type.is_file() {
                        continue;
                    }

                    let path = entry.path();
                    let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
                    if size_bytes > self.max_file_size_bytes {
                        log::debug!(
                            "Skipping large file {} ({} bytes > {})",
                            path.display(),
                            size_bytes,
                            self.max_file_size_bytes
                        );
                        continue;
                    }

                    if Self::is_noise_file(path) {
                        log::debug!("Skipping noisy artifact {}", path.display());
                        continue;
                    }

                    if !Self::is_supported_file(path) {
                        continue;
                    }

                    let Some(relative) = self.relative_path(path) else {
                        continue;
                    };
                    files.push(ScannedFile {
                        path: path.to_path_buf(),
                        relative,
                        size_bytes,
                    });
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }

        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        log::info!("Found {} files under {}", files.len(), self.root.display());
        files
    }

    fn relative_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                std::path::Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        (!parts.is_empty()).then(|| parts.join("/"))
    }

    fn is_supported_file(path: &Path) -> bool {
        if let Some(file_name) = path.file_name().and_then(|name| name.to_str()) {
            if matches!(file_name, "README" | "LICENSE" | "CHANGELOG") {
                return true;
            }
        }

        if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
            let ext = ext.to_lowercase();
            return SUPPORTED_EXTENSIONS
                .iter()
                .any(|candidate| candidate == &ext);
        }

        false
    }

    fn is_ignored_scope(path: &Path, root: &Path) -> bool {
        if let Ok(relative) = path.strip_prefix(root) {
            for component in relative.components() {
                if let std::path::Component::Normal(name) = component {
                    let lowered = name.to_string_lossy().to_lowercase();
                    if IGNORED_SCOPES.iter().any(|ignored| ignored == &lowered) {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn is_noise_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| {
                NOISE_FILE_NAMES
                    .iter()
                    .any(|candidate| name.eq_ignore_ascii_case(candidate))
                    || name.ends_with(".min.js")
                    || name.ends_with(".lock")
            })
    }
}

const IGNORED_SCOPES: &[&str] = &[
    // VCS / tooling
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    ".yarn",
    ".npm",
    // caches / builds
    ".cache",
    "node_modules",
    ".next",
    ".turbo",
    ".parcel-cache",
    ".output",
    "build",
    "dist",
    "coverage",
    ".nuxt",
    ".vite",
    ".svelte-kit",
    "tmp",
    "target",
    ".terraform",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    // vendor
    "vendor",
    "third_party",
    "third-party",
    "__pycache__",
];

const NOISE_FILE_NAMES: &[&str] = &[
    ".gitignore",
    ".gitmodules",
    "package-lock.json",
    "pnpm-lock.yaml",
    "yarn.lock",
    "cargo.lock",
    "poetry.lock",
];

/// Code, docs and plain-text extensions worth analyzing
const SUPPORTED_EXTENSIONS: &[&str] = &[
    // General purpose languages
    "rs", "py", "pyw", "js", "mjs", "cjs", "ts", "tsx", "jsx", "mts", "cts", "java", "kt", "kts",
    "go", "c", "h", "cpp", "cc", "cxx", "hpp", "hh", "hxx", "cs", "rb", "swift", "php", "scala",
    // Scripts
    "sh", "bash", "zsh", "sql", "css", "scss",
    // Docs
    "md", "mdx", "markdown", "rst", "adoc", "html", "htm", "txt",
    // Config / data
    "yaml", "yml", "json", "toml", "ini", "cfg", "conf", "xml", "proto",
];
