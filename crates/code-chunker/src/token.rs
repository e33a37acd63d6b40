//! Character-ratio token estimation.
//!
//! Estimates are approximations of real tokenizer output; callers must tolerate ±20% error.

/// Characters (bytes) per estimated token
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of `text`. Empty text costs zero tokens.
#[must_use]
pub const fn estimate(text: &str) -> usize {
    estimate_len(text.len())
}

/// Estimate tokens for a span of `len` bytes
#[must_use]
pub const fn estimate_len(len: usize) -> usize {
    len.div_ceil(CHARS_PER_TOKEN)
}

/// Number of bytes that corresponds to `tokens` estimated tokens
#[must_use]
pub const fn tokens_to_chars(tokens: usize) -> usize {
    tokens.saturating_mul(CHARS_PER_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero_tokens() {
        assert_eq!(estimate(""), 0);
    }

    #[test]
    fn rounds_partial_tokens_up() {
        assert_eq!(estimate("a"), 1);
        assert_eq!(estimate("abcd"), 1);
        assert_eq!(estimate("abcde"), 2);
    }

    #[test]
    fn char_conversion_is_inverse_for_whole_tokens() {
        for tokens in [0, 1, 7, 5000, 25_000] {
            assert_eq!(estimate_len(tokens_to_chars(tokens)), tokens);
        }
    }
}
