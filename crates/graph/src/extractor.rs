//! Pattern-based reference extraction.
//!
//! Every reference that matches is returned, including ones pointing outside
//! the project; resolution decides what becomes an edge.

use crate::types::{ExtractedReference, ReferenceKind};
use corpus_chunker::Language;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static ES_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*import[ \t]+(?:type[ \t]+)?(?:([\w$*{}\s,]+?)[ \t]+from[ \t]*)?["']([^"'\n]+)["']"#,
    )
    .expect("valid import regex")
});

static ES_EXPORT_FROM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*export[ \t]+(?:type[ \t]+)?([\w$*{}\s,]+?)[ \t]+from[ \t]*["']([^"'\n]+)["']"#,
    )
    .expect("valid export regex")
});

static REQUIRE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|[^\w$.])require[ \t]*\([ \t]*["']([^"'\n]+)["'][ \t]*\)"#)
        .expect("valid require regex")
});

static DYNAMIC_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|[^\w$.])import[ \t]*\([ \t]*["']([^"'\n]+)["'][ \t]*\)"#)
        .expect("valid dynamic import regex")
});

static PY_FROM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*from[ \t]+(\.*[\w.]*)[ \t]+import[ \t]+([^\n#]+)")
        .expect("valid from-import regex")
});

static PY_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*import[ \t]+([\w.]+(?:[ \t]+as[ \t]+\w+)?(?:[ \t]*,[ \t]*[\w.]+(?:[ \t]+as[ \t]+\w+)?)*)")
        .expect("valid import regex")
});

static RUST_USE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:pub(?:\([^)\n]*\))?[ \t]+)?use[ \t]+([^;]+);")
        .expect("valid use regex")
});

static RUST_MOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:pub(?:\([^)\n]*\))?[ \t]+)?mod[ \t]+(\w+)[ \t]*;")
        .expect("valid mod regex")
});

static C_INCLUDE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*#[ \t]*include[ \t]*[<"]([^>"\n]+)[>"]"#)
        .expect("valid include regex")
});

/// Extract references from `content`, choosing patterns by the extension of `file_path`
pub fn extract(content: &str, file_path: &str) -> Vec<ExtractedReference> {
    let lines = LineIndex::new(content);
    let mut refs = match Language::from_path(file_path) {
        Language::JavaScript | Language::TypeScript => extract_ecmascript(content, &lines),
        Language::Python => extract_python(content, &lines),
        Language::Rust => extract_rust(content, &lines),
        Language::C | Language::Cpp => extract_c(content, &lines),
        _ => Vec::new(),
    };
    refs.sort_by_key(|r| r.line);
    refs
}

fn extract_ecmascript(content: &str, lines: &LineIndex) -> Vec<ExtractedReference> {
    let mut refs = Vec::new();

    for caps in ES_IMPORT_RE.captures_iter(content) {
        refs.extend(reference(&caps, 2, ReferenceKind::StaticImport, lines, binding(&caps, 1)));
    }
    for caps in ES_EXPORT_FROM_RE.captures_iter(content) {
        refs.extend(reference(&caps, 2, ReferenceKind::StaticImport, lines, binding(&caps, 1)));
    }
    for caps in REQUIRE_RE.captures_iter(content) {
        refs.extend(reference(&caps, 1, ReferenceKind::DynamicRequire, lines, None));
    }
    for caps in DYNAMIC_IMPORT_RE.captures_iter(content) {
        refs.extend(reference(&caps, 1, ReferenceKind::DynamicImport, lines, None));
    }

    refs
}

fn extract_python(content: &str, lines: &LineIndex) -> Vec<ExtractedReference> {
    let mut refs = Vec::new();

    for caps in PY_FROM_RE.captures_iter(content) {
        let names = caps.get(2).map(|m| {
            m.as_str()
                .trim()
                .trim_start_matches('(')
                .trim_end_matches(['\\', ')'])
                .trim()
                .to_string()
        });
        refs.extend(reference(
            &caps,
            1,
            ReferenceKind::StaticImport,
            lines,
            names.filter(|n| !n.is_empty()),
        ));
    }

    for caps in PY_IMPORT_RE.captures_iter(content) {
        let (Some(whole), Some(list)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let line = lines.line_of(whole.start());
        for module in list.as_str().split(',') {
            let Some(name) = module.split_whitespace().next() else {
                continue;
            };
            refs.push(ExtractedReference {
                kind: ReferenceKind::StaticImport,
                path: name.to_string(),
                symbol: None,
                line,
            });
        }
    }

    refs
}

fn extract_rust(content: &str, lines: &LineIndex) -> Vec<ExtractedReference> {
    let mut refs = Vec::new();

    for caps in RUST_USE_RE.captures_iter(content) {
        let (Some(whole), Some(tree)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let (path, symbol) = split_use_tree(tree.as_str());
        refs.push(ExtractedReference {
            kind: ReferenceKind::StaticImport,
            path,
            symbol,
            line: lines.line_of(whole.start()),
        });
    }

    for caps in RUST_MOD_RE.captures_iter(content) {
        refs.extend(reference(&caps, 1, ReferenceKind::ModuleDeclaration, lines, None));
    }

    refs
}

fn extract_c(content: &str, lines: &LineIndex) -> Vec<ExtractedReference> {
    C_INCLUDE_RE
        .captures_iter(content)
        .filter_map(|caps| reference(&caps, 1, ReferenceKind::Include, lines, None))
        .collect()
}

/// `crate::a::{b, c}` splits into (`crate::a`, `{b,c}`); `crate::a::B` into (`crate::a::B`, `B`)
fn split_use_tree(tree: &str) -> (String, Option<String>) {
    let tree = if tree.contains('{') {
        tree
    } else {
        tree.split(" as ").next().unwrap_or(tree)
    };
    let tree: String = tree.split_whitespace().collect();

    if let Some(idx) = tree.find("::{") {
        return (tree[..idx].to_string(), Some(tree[idx + 2..].to_string()));
    }

    let symbol = tree
        .rsplit("::")
        .next()
        .filter(|s| !s.is_empty() && *s != "*")
        .map(str::to_string);
    (tree, symbol)
}

fn binding(caps: &Captures<'_>, group: usize) -> Option<String> {
    caps.get(group)
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
}

fn reference(
    caps: &Captures<'_>,
    group: usize,
    kind: ReferenceKind,
    lines: &LineIndex,
    symbol: Option<String>,
) -> Option<ExtractedReference> {
    let specifier = caps.get(group)?;
    let path = specifier.as_str().trim();
    if path.is_empty() {
        return None;
    }
    Some(ExtractedReference {
        kind,
        path: path.to_string(),
        symbol,
        line: lines.line_of(specifier.start()),
    })
}

/// Byte offset to line lookup
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(content: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(content.match_indices('\n').map(|(idx, _)| idx + 1))
            .collect();
        Self { starts }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&start| start <= offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn paths(refs: &[ExtractedReference]) -> Vec<(&str, ReferenceKind)> {
        refs.iter().map(|r| (r.path.as_str(), r.kind)).collect()
    }

    #[test]
    fn extracts_ecmascript_imports() {
        let code = r#"import React from "react";
import { a, b } from './util';
import './side-effect.css';
export * from "../shared/index";
const fs = require('fs');
const lazy = await import("./lazy.js");
"#;
        let refs = extract(code, "src/app.ts");
        assert_eq!(
            paths(&refs),
            vec![
                ("react", ReferenceKind::StaticImport),
                ("./util", ReferenceKind::StaticImport),
                ("./side-effect.css", ReferenceKind::StaticImport),
                ("../shared/index", ReferenceKind::StaticImport),
                ("fs", ReferenceKind::DynamicRequire),
                ("./lazy.js", ReferenceKind::DynamicImport),
            ]
        );
        assert_eq!(refs[1].symbol.as_deref(), Some("{ a, b }"));
        assert_eq!(refs[1].line, 2);
    }

    #[test]
    fn extracts_python_imports() {
        let code = "import os, sys as system\nfrom . import helpers\nfrom ..core.models import (User, Group)\n";
        let refs = extract(code, "pkg/sub/views.py");
        assert_eq!(
            paths(&refs),
            vec![
                ("os", ReferenceKind::StaticImport),
                ("sys", ReferenceKind::StaticImport),
                (".", ReferenceKind::StaticImport),
                ("..core.models", ReferenceKind::StaticImport),
            ]
        );
        assert_eq!(refs[2].symbol.as_deref(), Some("helpers"));
        assert_eq!(refs[3].symbol.as_deref(), Some("User, Group"));
    }

    #[test]
    fn extracts_rust_uses_and_mods() {
        let code = "mod config;\npub mod error;\nuse crate::config::Settings;\nuse super::{a, b};\nuse std::collections::HashMap;\n";
        let refs = extract(code, "src/lib.rs");
        assert_eq!(
            paths(&refs),
            vec![
                ("config", ReferenceKind::ModuleDeclaration),
                ("error", ReferenceKind::ModuleDeclaration),
                ("crate::config::Settings", ReferenceKind::StaticImport),
                ("super", ReferenceKind::StaticImport),
                ("std::collections::HashMap", ReferenceKind::StaticImport),
            ]
        );
        assert_eq!(refs[2].symbol.as_deref(), Some("Settings"));
        assert_eq!(refs[3].symbol.as_deref(), Some("{a,b}"));
    }

    #[test]
    fn extracts_c_includes() {
        let code = "#include <stdio.h>\n#include \"util/strings.h\"\n";
        let refs = extract(code, "src/main.c");
        assert_eq!(
            paths(&refs),
            vec![
                ("stdio.h", ReferenceKind::Include),
                ("util/strings.h", ReferenceKind::Include),
            ]
        );
    }

    #[test]
    fn unsupported_languages_yield_nothing() {
        assert!(extract("import \"fmt\"\n", "main.go").is_empty());
        assert!(extract("# Title\n", "README.md").is_empty());
    }
}
