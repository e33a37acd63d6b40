use corpus_chunker::{token, Chunk};

/// Instructional template sent with every chunk
pub const PROMPT_TEMPLATE: &str = "You are analyzing one part of a larger corpus.\n\
Source: {source}\n\
Part: {part} of {total}\n\
Content type: {content_type}\n\
Lines: {start_line}-{end_line}\n\
\n\
Summarize what this part does, list the entities it defines, and note every reference to other \
files or modules. Respond in plain text.\n\
\n\
--- BEGIN CONTENT ---\n\
{content}\n\
--- END CONTENT ---\n";

/// Tokens reserved for the template and its substituted metadata
pub fn reserved_tokens() -> usize {
    // Source paths and numbers rarely exceed this allowance.
    token::estimate(PROMPT_TEMPLATE) + 128
}

/// Fill the template for `chunk`, which is one of `total` parts of its source
pub fn build_prompt(chunk: &Chunk, total: usize) -> String {
    PROMPT_TEMPLATE
        .replace("{source}", &chunk.source_id)
        .replace("{part}", &(chunk.index + 1).to_string())
        .replace("{total}", &total.to_string())
        .replace("{content_type}", &chunk.content_type.to_string())
        .replace("{start_line}", &chunk.start_line.to_string())
        .replace("{end_line}", &chunk.end_line.to_string())
        .replace("{content}", &chunk.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_chunker::{ContentType, Language, SemanticChunker};

    #[test]
    fn prompt_carries_metadata_and_content() {
        let code = "fn main() {\n    println!(\"hi\");\n}\n";
        let chunks = SemanticChunker::default().chunk(
            code,
            ContentType::Code(Language::Rust),
            Some("src/main.rs"),
        );
        let prompt = build_prompt(&chunks[0], chunks.len());

        assert!(prompt.contains("Source: src/main.rs"));
        assert!(prompt.contains("Part: 1 of 1"));
        assert!(prompt.contains("Content type: code:rust"));
        assert!(prompt.contains(code));
        assert!(token::estimate(&prompt) <= token::estimate(code) + reserved_tokens());
    }
}
