const MAX_CONCURRENCY: usize = 32;

pub(crate) const CONCURRENCY_ENV: &str = "CORPUS_PREP_MAX_CONCURRENCY";
pub(crate) const FILES_PER_BATCH_ENV: &str = "CORPUS_PREP_MAX_FILES_PER_BATCH";
pub(crate) const SKIP_FAILED_ENV: &str = "CORPUS_PREP_SKIP_FAILED";

/// Available parallelism, clamped to the supported range
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, MAX_CONCURRENCY)
}

pub(crate) fn parse_concurrency(raw: Option<&str>, default_value: usize) -> usize {
    parse_usize(raw, default_value).clamp(1, MAX_CONCURRENCY)
}

pub(crate) fn parse_usize(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
}

pub(crate) fn parse_bool(raw: Option<&str>, default_value: bool) -> bool {
    match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_concurrency_defaults_and_clamps() {
        let default_value = default_concurrency();
        assert_eq!(parse_concurrency(None, default_value), default_value);
        assert_eq!(parse_concurrency(Some(""), default_value), default_value);
        assert_eq!(parse_concurrency(Some("   "), default_value), default_value);
        assert_eq!(parse_concurrency(Some("2"), default_value), 2);
        assert_eq!(parse_concurrency(Some("0"), default_value), 1);
        assert_eq!(parse_concurrency(Some("999"), default_value), MAX_CONCURRENCY);
        assert_eq!(parse_concurrency(Some("abc"), default_value), default_value);
        assert_eq!(parse_concurrency(Some(" 5 "), default_value), 5);
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool(Some("YES"), false));
        assert!(parse_bool(Some(" 1 "), false));
        assert!(!parse_bool(Some("off"), true));
        assert!(parse_bool(Some("maybe"), true));
        assert!(!parse_bool(None, false));
    }
}
