use serde::{Deserialize, Serialize};

/// Syntax a reference was written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// `import … from`, `export … from`, Python `import`, Rust `use`
    StaticImport,
    /// `require("…")`
    DynamicRequire,
    /// `import("…")`
    DynamicImport,
    /// Rust `mod name;`
    ModuleDeclaration,
    /// C/C++ `#include`
    Include,
}

impl ReferenceKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StaticImport => "static_import",
            Self::DynamicRequire => "dynamic_require",
            Self::DynamicImport => "dynamic_import",
            Self::ModuleDeclaration => "module_declaration",
            Self::Include => "include",
        }
    }
}

/// A reference found in one file, before resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedReference {
    pub kind: ReferenceKind,

    /// Module specifier as written (`./util`, `crate::config`, `os.path`)
    pub path: String,

    /// Imported names, when the syntax names them
    pub symbol: Option<String>,

    /// Line of the reference (1-indexed)
    pub line: usize,
}

/// Directed file-to-file edge: `from` depends on `to`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub kind: ReferenceKind,
    pub symbol: Option<String>,
}

impl DependencyEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, kind: ReferenceKind) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
            symbol: None,
        }
    }

    #[must_use]
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

/// Summary of a built graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub files: usize,
    pub edges: usize,
    pub unresolved_references: usize,
    pub self_loops: usize,
}

impl std::fmt::Display for GraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Files: {} | Edges: {} | Unresolved: {} | Self-loops: {}",
            self.files, self.edges, self.unresolved_references, self.self_loops
        )
    }
}
