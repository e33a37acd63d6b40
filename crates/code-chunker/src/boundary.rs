//! Structural boundary detection.
//!
//! Detectors are heuristic pattern matchers, not parsers. Each one is keyed by
//! [`ContentType`] in a [`BoundaryRegistry`] so a stronger implementation can be
//! registered without touching the chunking loop.

use crate::content_type::ContentType;
use crate::language::Language;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const MAX_MATCHED_TEXT: usize = 80;

/// Kind of structural boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryKind {
    /// Top-level function
    Function,
    /// Indented function (method, nested function)
    Method,
    /// Class, struct, trait, impl, module and friends
    Class,
    /// Line following a closing brace at column zero (or a closing fence)
    BlockEnd,
    /// Markup heading
    Heading,
    /// Opening fence of a fenced block
    FencedBlock,
    /// List item
    ListItem,
    /// First line after a blank-line gap
    Paragraph,
}

impl BoundaryKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::BlockEnd => "block_end",
            Self::Heading => "heading",
            Self::FencedBlock => "fenced_block",
            Self::ListItem => "list_item",
            Self::Paragraph => "paragraph",
        }
    }
}

/// A structurally meaningful byte offset (always at a line start)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boundary {
    pub offset: usize,
    pub kind: BoundaryKind,
    pub matched_text: String,
}

impl Boundary {
    fn new(text: &str, offset: usize, kind: BoundaryKind) -> Self {
        Self {
            offset,
            kind,
            matched_text: first_line(&text[offset..]),
        }
    }
}

/// Finds structural boundaries in text of one content type
pub trait BoundaryDetector: Send + Sync {
    /// Boundaries sorted by offset ascending
    fn detect(&self, text: &str) -> Vec<Boundary>;
}

static FUNCTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)^([ \t]*)(?:(?:pub(?:\([^)\n]*\))?|export|default|async|unsafe|const|extern(?:[ \t]+"[^"\n]*")?|static|public|private|protected|internal|override|open|final|abstract|inline|suspend)[ \t]+)*(?:fn|function\*?|def|func|fun)[ \t]+(?:\([^)\n]*\)[ \t]*)?[A-Za-z_$][\w$]*"#,
    )
    .expect("valid function regex")
});

static ARROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^([ \t]*)(?:export[ \t]+)?(?:const|let|var)[ \t]+[A-Za-z_$][\w$]*[ \t]*(?::[^=\n]+)?=[ \t]*(?:async[ \t]*)?(?:\([^)\n]*\)|[A-Za-z_$][\w$]*)[ \t]*(?::[^=\n]+)?=>",
    )
    .expect("valid arrow function regex")
});

static MODIFIED_METHOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^([ \t]*)(?:(?:public|private|protected|static|final|abstract|synchronized|override|virtual|async|internal)[ \t]+)+[^=;\n(]*\(",
    )
    .expect("valid method regex")
});

static CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^([ \t]*)(?:(?:pub(?:\([^)\n]*\))?|export|default|abstract|public|private|protected|internal|sealed|final|static|data|open|unsafe|partial)[ \t]+)*(?:(?:class|struct|enum|trait|interface|impl|mod|module|object|namespace|union|protocol|extension)\b[ \t]*[<A-Za-z_]|type[ \t]+[A-Za-z_]\w*[ \t]+(?:struct|interface)\b)",
    )
    .expect("valid class regex")
});

static BLOCK_END_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\}[;,)]*[ \t]*\r?$").expect("valid block end regex"));

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]{0,3}(?:```|~~~)").expect("valid fence regex"));

static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^(?:#{1,6}[ \t]+\S|[ \t]*<h[1-6][\s>])").expect("valid heading regex")
});

static LIST_ITEM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:[-*+]|\d{1,9}[.)])[ \t]+\S").expect("valid list item regex")
});

static PARAGRAPH_GAP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n(?:[ \t]*\n)+").expect("valid paragraph regex"));

/// Function/class/block detector for code-family content
#[derive(Debug, Clone, Copy)]
pub struct CodeBoundaryDetector {
    language: Language,
}

impl CodeBoundaryDetector {
    pub const fn new(language: Language) -> Self {
        Self { language }
    }

    fn uses_braces(self) -> bool {
        !matches!(self.language, Language::Python | Language::Ruby)
    }

    fn uses_modifier_methods(self) -> bool {
        matches!(
            self.language,
            Language::Java
                | Language::CSharp
                | Language::Kotlin
                | Language::Scala
                | Language::Php
                | Language::Cpp
                | Language::TypeScript
                | Language::Unknown
        )
    }

    /// Move `offset` up over comment and attribute lines directly above it
    fn attach_leading_decorations(self, text: &str, offset: usize) -> usize {
        let comments = self.language.comment_prefixes();
        let attributes = self.language.attribute_prefixes();
        let mut start = offset;

        while start > 0 {
            let prev_end = start - 1;
            let prev_start = text[..prev_end].rfind('\n').map_or(0, |idx| idx + 1);
            let line = text[prev_start..prev_end].trim();
            let decorates = !line.is_empty()
                && comments
                    .iter()
                    .chain(attributes.iter())
                    .any(|prefix| line.starts_with(prefix));
            if !decorates {
                break;
            }
            start = prev_start;
        }

        start
    }
}

impl BoundaryDetector for CodeBoundaryDetector {
    fn detect(&self, text: &str) -> Vec<Boundary> {
        let mut boundaries = Vec::new();

        for caps in CLASS_RE.captures_iter(text) {
            if let Some(m) = caps.get(0) {
                boundaries.push((m.start(), BoundaryKind::Class));
            }
        }

        for caps in FUNCTION_RE.captures_iter(text) {
            boundaries.extend(function_start(&caps));
        }
        if matches!(
            self.language,
            Language::JavaScript | Language::TypeScript | Language::Unknown
        ) {
            for caps in ARROW_RE.captures_iter(text) {
                boundaries.extend(function_start(&caps));
            }
        }
        if self.uses_modifier_methods() {
            for caps in MODIFIED_METHOD_RE.captures_iter(text) {
                boundaries.extend(function_start(&caps));
            }
        }

        let mut detected: Vec<Boundary> = boundaries
            .into_iter()
            .map(|(offset, kind)| {
                let offset = self.attach_leading_decorations(text, offset);
                Boundary::new(text, offset, kind)
            })
            .collect();

        if self.uses_braces() {
            for m in BLOCK_END_RE.find_iter(text) {
                let next_line = m.end() + 1;
                if next_line < text.len() && text.as_bytes()[m.end()] == b'\n' {
                    detected.push(Boundary::new(text, next_line, BoundaryKind::BlockEnd));
                }
            }
        }

        sort_and_dedup(detected)
    }
}

/// Top-level matches are functions, indented ones are methods
fn function_start(caps: &regex::Captures<'_>) -> Option<(usize, BoundaryKind)> {
    let whole = caps.get(0)?;
    let indent = caps.get(1)?;
    let kind = if indent.as_str().is_empty() {
        BoundaryKind::Function
    } else {
        BoundaryKind::Method
    };
    Some((whole.start(), kind))
}

/// Heading/fence/list detector for markup-family content
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupBoundaryDetector;

impl BoundaryDetector for MarkupBoundaryDetector {
    fn detect(&self, text: &str) -> Vec<Boundary> {
        let mut detected = Vec::new();
        let mut fenced: Vec<(usize, usize)> = Vec::new();
        let mut open: Option<usize> = None;

        for m in FENCE_RE.find_iter(text) {
            match open.take() {
                None => {
                    open = Some(m.start());
                    detected.push(Boundary::new(text, m.start(), BoundaryKind::FencedBlock));
                }
                Some(start) => {
                    let line_end = text[m.end()..]
                        .find('\n')
                        .map_or(text.len(), |idx| m.end() + idx);
                    fenced.push((start, line_end));
                    if line_end + 1 < text.len() {
                        detected.push(Boundary::new(text, line_end + 1, BoundaryKind::BlockEnd));
                    }
                }
            }
        }
        if let Some(start) = open {
            fenced.push((start, text.len()));
        }

        let outside_fences = |offset: usize| !inside_ranges(offset, &fenced);
        detected.extend(
            HEADING_RE
                .find_iter(text)
                .map(|m| m.start())
                .filter(|&offset| outside_fences(offset))
                .map(|offset| Boundary::new(text, offset, BoundaryKind::Heading)),
        );
        detected.extend(
            LIST_ITEM_RE
                .find_iter(text)
                .map(|m| m.start())
                .filter(|&offset| outside_fences(offset))
                .map(|offset| Boundary::new(text, offset, BoundaryKind::ListItem)),
        );

        sort_and_dedup(detected)
    }
}

/// Blank-line paragraph detector for plain text
#[derive(Debug, Clone, Copy, Default)]
pub struct ParagraphBoundaryDetector;

impl BoundaryDetector for ParagraphBoundaryDetector {
    fn detect(&self, text: &str) -> Vec<Boundary> {
        PARAGRAPH_GAP_RE
            .find_iter(text)
            .map(|m| m.end())
            .filter(|&offset| offset < text.len())
            .map(|offset| Boundary::new(text, offset, BoundaryKind::Paragraph))
            .collect()
    }
}

/// Detector lookup keyed by content type
#[derive(Clone, Default)]
pub struct BoundaryRegistry {
    overrides: HashMap<ContentType, Arc<dyn BoundaryDetector>>,
}

impl BoundaryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the detector used for `content_type`
    pub fn register(&mut self, content_type: ContentType, detector: Arc<dyn BoundaryDetector>) {
        self.overrides.insert(content_type, detector);
    }

    /// Detect boundaries; unknown content types yield an empty list
    pub fn detect(&self, text: &str, content_type: ContentType) -> Vec<Boundary> {
        if let Some(detector) = self.overrides.get(&content_type) {
            return sort_and_dedup(detector.detect(text));
        }

        match content_type {
            ContentType::Code(language) => CodeBoundaryDetector::new(language).detect(text),
            ContentType::Markup => MarkupBoundaryDetector.detect(text),
            ContentType::Plain => ParagraphBoundaryDetector.detect(text),
            ContentType::Unknown => Vec::new(),
        }
    }
}

impl std::fmt::Debug for BoundaryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundaryRegistry")
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Detect boundaries with the default detectors
pub fn detect(text: &str, content_type: ContentType) -> Vec<Boundary> {
    BoundaryRegistry::default().detect(text, content_type)
}

fn sort_and_dedup(mut boundaries: Vec<Boundary>) -> Vec<Boundary> {
    boundaries.sort_by_key(|b| b.offset);
    boundaries.dedup_by_key(|b| b.offset);
    boundaries
}

fn inside_ranges(offset: usize, ranges: &[(usize, usize)]) -> bool {
    let idx = ranges.partition_point(|&(start, _)| start <= offset);
    idx > 0 && offset <= ranges[idx - 1].1
}

fn first_line(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default().trim();
    match line.char_indices().nth(MAX_MATCHED_TEXT) {
        Some((idx, _)) => line[..idx].to_string(),
        None => line.to_string(),
    }
}
