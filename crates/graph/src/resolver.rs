//! Resolution of extracted references against the known file set.
//!
//! All paths are relative and `/`-separated. A reference that does not land on
//! a known file resolves to `None`.

use crate::types::{ExtractedReference, ReferenceKind};
use corpus_chunker::Language;
use std::collections::HashSet;

const ECMASCRIPT_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "mts", "cts"];
const RUST_ROOT_FILES: &[&str] = &["lib.rs", "main.rs", "mod.rs"];

/// Set of known project files used for resolution
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    files: HashSet<String>,
}

impl FileIndex {
    pub fn new<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            files: files
                .into_iter()
                .map(|f| normalize_path(f.as_ref()))
                .collect(),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Resolve `reference` found in `from` to a known file
    pub fn resolve(&self, from: &str, reference: &ExtractedReference) -> Option<String> {
        let from = normalize_path(from);
        match reference.kind {
            ReferenceKind::ModuleDeclaration => self.resolve_rust_mod(&from, &reference.path),
            ReferenceKind::Include => self.resolve_include(&from, &reference.path),
            ReferenceKind::StaticImport
            | ReferenceKind::DynamicRequire
            | ReferenceKind::DynamicImport => match Language::from_path(&from) {
                Language::JavaScript | Language::TypeScript => {
                    self.resolve_ecmascript(&from, &reference.path)
                }
                Language::Python => {
                    self.resolve_python(&from, &reference.path, reference.symbol.as_deref())
                }
                Language::Rust => self.resolve_rust_use(&from, &reference.path),
                _ => None,
            },
        }
    }

    /// First candidate naming a known file; `None` candidates escaped the root
    fn first_known<I>(&self, candidates: I) -> Option<String>
    where
        I: IntoIterator<Item = Option<String>>,
    {
        candidates
            .into_iter()
            .flatten()
            .find(|c| self.files.contains(c))
    }

    fn resolve_ecmascript(&self, from: &str, specifier: &str) -> Option<String> {
        let base = if specifier.starts_with("./") || specifier.starts_with("../") {
            join(parent(from), specifier)?
        } else if let Some(rooted) = specifier.strip_prefix('/') {
            normalize_relative(rooted)?
        } else {
            return None;
        };

        let mut candidates = vec![Some(base.clone())];
        candidates.extend(ECMASCRIPT_EXTENSIONS.iter().map(|ext| Some(format!("{base}.{ext}"))));
        candidates.extend(
            ECMASCRIPT_EXTENSIONS
                .iter()
                .map(|ext| Some(format!("{base}/index.{ext}"))),
        );
        self.first_known(candidates)
    }

    fn resolve_python(&self, from: &str, module: &str, symbol: Option<&str>) -> Option<String> {
        let dots = module.chars().take_while(|&c| c == '.').count();
        let rest = module[dots..].replace('.', "/");

        let bases: Vec<String> = if dots > 0 {
            let mut dir = parent(from).to_string();
            for _ in 1..dots {
                dir = parent_dir(&dir)?;
            }
            vec![dir]
        } else {
            vec![String::new(), parent(from).to_string()]
        };

        let name = symbol
            .and_then(|s| s.split(',').next())
            .and_then(|first| first.split_whitespace().next())
            .filter(|n| n.chars().all(|c| c.is_alphanumeric() || c == '_'));

        let mut candidates = Vec::new();
        for base in &bases {
            let Some(module_dir) = join(base, &rest) else {
                continue;
            };
            if let Some(name) = name {
                candidates.push(join(&module_dir, &format!("{name}.py")));
                candidates.push(join(&module_dir, &format!("{name}/__init__.py")));
            }
            if !rest.is_empty() {
                candidates.push(join(base, &format!("{rest}.py")));
            }
            candidates.push(join(&module_dir, "__init__.py"));
        }
        self.first_known(candidates)
    }

    fn resolve_rust_mod(&self, from: &str, name: &str) -> Option<String> {
        let dir = rust_module_dir(from);
        self.first_known([join(&dir, &format!("{name}.rs")), join(&dir, &format!("{name}/mod.rs"))])
    }

    fn resolve_rust_use(&self, from: &str, path: &str) -> Option<String> {
        let mut segments: Vec<&str> = path.split("::").filter(|s| !s.is_empty()).collect();
        let first = *segments.first()?;

        let mut dir = match first {
            "crate" => self.rust_crate_root(from)?,
            "self" => rust_module_dir(from),
            "super" => rust_module_dir(from),
            _ => return None,
        };
        segments.remove(0);
        if first == "super" {
            dir = parent_dir(&dir)?;
        }
        while segments.first() == Some(&"super") {
            segments.remove(0);
            dir = parent_dir(&dir)?;
        }

        for len in (1..=segments.len()).rev() {
            let module = segments[..len].join("/");
            if let Some(found) = self.first_known([
                join(&dir, &format!("{module}.rs")),
                join(&dir, &format!("{module}/mod.rs")),
            ]) {
                return Some(found);
            }
        }

        // Items defined directly in the target module's own file.
        let mut candidates: Vec<Option<String>> =
            RUST_ROOT_FILES.iter().map(|f| join(&dir, f)).collect();
        if !dir.is_empty() {
            candidates.push(Some(format!("{dir}.rs")));
        }
        self.first_known(candidates).filter(|found| found != from)
    }

    /// Nearest ancestor directory holding `lib.rs` or `main.rs`
    fn rust_crate_root(&self, from: &str) -> Option<String> {
        let mut dir = parent(from).to_string();
        loop {
            if ["lib.rs", "main.rs"]
                .iter()
                .any(|root| join(&dir, root).is_some_and(|p| self.files.contains(&p)))
            {
                return Some(dir);
            }
            if dir.is_empty() {
                return None;
            }
            dir = parent(&dir).to_string();
        }
    }

    fn resolve_include(&self, from: &str, header: &str) -> Option<String> {
        self.first_known([join(parent(from), header), normalize_relative(header)])
    }
}

/// Normalize separators and `.`/`..` segments. Leading `..` that climb past the
/// root are kept, so such a path never names a project file.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." if parts.last().is_some_and(|last| *last != "..") => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Normalize a project-relative path, or `None` when a `..` climbs above the root
pub fn normalize_relative(path: &str) -> Option<String> {
    let path = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

fn parent(path: &str) -> &str {
    path.rfind('/').map_or("", |idx| &path[..idx])
}

/// Parent of a directory, `None` at the project root
fn parent_dir(dir: &str) -> Option<String> {
    (!dir.is_empty()).then(|| parent(dir).to_string())
}

fn join(dir: &str, rel: &str) -> Option<String> {
    if dir.is_empty() {
        normalize_relative(rel)
    } else {
        normalize_relative(&format!("{dir}/{rel}"))
    }
}

/// Directory holding the child modules of the module defined in `file`
fn rust_module_dir(file: &str) -> String {
    let name = file.rsplit('/').next().unwrap_or(file);
    if RUST_ROOT_FILES.contains(&name) {
        parent(file).to_string()
    } else {
        file.strip_suffix(".rs").unwrap_or(file).to_string()
    }
}
