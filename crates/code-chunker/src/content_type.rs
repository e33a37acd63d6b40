use crate::error::{ChunkerError, Result};
use crate::language::Language;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Content-type tag attached to every chunk.
///
/// The tag selects the boundary detector; the language refines it for code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "family", content = "language", rename_all = "lowercase")]
pub enum ContentType {
    /// Source code (functions, classes, brace blocks)
    Code(Language),
    /// Markdown-like documents (headings, fences, lists)
    Markup,
    /// Prose or data without structural syntax
    Plain,
    /// Anything else; no boundaries are detected
    Unknown,
}

const MARKUP_EXTENSIONS: &[&str] = &["md", "mdx", "markdown", "rst", "adoc", "asciidoc", "html", "htm"];

const PLAIN_EXTENSIONS: &[&str] = &[
    "txt", "text", "log", "csv", "json", "yaml", "yml", "toml", "ini", "cfg", "conf", "xml", "env",
];

const UNTYPED_CODE_EXTENSIONS: &[&str] = &[
    "sh", "bash", "zsh", "fish", "ps1", "lua", "dart", "zig", "ex", "exs", "clj", "el", "sql",
    "proto", "tf", "hcl", "css", "scss", "less", "gradle", "groovy", "vue", "svelte",
];

impl ContentType {
    /// Detect content type from file extension
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_lowercase();
        let language = Language::from_extension(&ext);
        if language != Language::Unknown {
            return ContentType::Code(language);
        }
        if MARKUP_EXTENSIONS.contains(&ext.as_str()) {
            ContentType::Markup
        } else if PLAIN_EXTENSIONS.contains(&ext.as_str()) {
            ContentType::Plain
        } else if UNTYPED_CODE_EXTENSIONS.contains(&ext.as_str()) {
            ContentType::Code(Language::Unknown)
        } else {
            ContentType::Unknown
        }
    }

    /// Detect content type from file path; extension-less files are plain text
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some(ext) => Self::from_extension(ext),
            None => ContentType::Plain,
        }
    }

    /// Parse a tag leniently: unrecognized tags map to [`ContentType::Unknown`]
    pub fn from_tag(tag: &str) -> Self {
        Self::parse_tag(tag).unwrap_or(ContentType::Unknown)
    }

    /// Parse a tag such as `code`, `rust`, `code:python`, `markdown`, `plain`, or an extension
    pub fn parse_tag(tag: &str) -> Result<Self> {
        let tag = tag.trim().to_lowercase();
        let parsed = match tag.as_str() {
            "code" => Some(ContentType::Code(Language::Unknown)),
            "markup" | "markdown" | "docs" | "html" => Some(ContentType::Markup),
            "plain" | "text" => Some(ContentType::Plain),
            "unknown" => Some(ContentType::Unknown),
            other => {
                if let Some(lang) = other.strip_prefix("code:") {
                    Some(ContentType::Code(Language::from_name(lang)))
                } else {
                    let by_name = Language::from_name(other);
                    if by_name != Language::Unknown {
                        Some(ContentType::Code(by_name))
                    } else {
                        match Self::from_extension(other.trim_start_matches('.')) {
                            ContentType::Unknown => None,
                            detected => Some(detected),
                        }
                    }
                }
            }
        };

        parsed.ok_or_else(|| ChunkerError::unsupported_content_type(tag))
    }

    /// Family name (`code`, `markup`, `plain`, `unknown`)
    pub const fn family(self) -> &'static str {
        match self {
            ContentType::Code(_) => "code",
            ContentType::Markup => "markup",
            ContentType::Plain => "plain",
            ContentType::Unknown => "unknown",
        }
    }

    /// Language for code content
    pub const fn language(self) -> Option<Language> {
        match self {
            ContentType::Code(lang) => Some(lang),
            _ => None,
        }
    }

    pub const fn is_code(self) -> bool {
        matches!(self, ContentType::Code(_))
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Code(Language::Unknown) => f.write_str("code"),
            ContentType::Code(lang) => write!(f, "code:{}", lang.as_str()),
            other => f.write_str(other.family()),
        }
    }
}
