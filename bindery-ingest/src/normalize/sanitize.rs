//! Path-safety sanitization for individual metadata values

/// Make a value safe to use as a single path segment
///
/// - `/ \ : |` become `-`
/// - `"` becomes `'`
/// - `* ? < >` and control characters are removed
/// - whitespace runs collapse to one space, ends are trimmed
pub fn sanitize_path(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '/' | '\\' | ':' | '|' => out.push('-'),
            '"' => out.push('\''),
            '*' | '?' | '<' | '>' => {}
            c if c.is_whitespace() => out.push(' '),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sanitize, then truncate to `max_bytes` keeping the extension
///
/// Truncation respects UTF-8 boundaries. `max_bytes == 0` disables it.
pub fn sanitize_filename(value: &str, max_bytes: usize) -> String {
    let sanitized = sanitize_path(value);
    if max_bytes == 0 || sanitized.len() <= max_bytes {
        return sanitized;
    }

    let (stem, ext) = match sanitized.rfind('.') {
        Some(idx) if idx > 0 => sanitized.split_at(idx),
        _ => (sanitized.as_str(), ""),
    };

    if ext.len() >= max_bytes {
        return truncate_bytes(&sanitized, max_bytes).trim_end().to_string();
    }

    let stem = truncate_bytes(stem, max_bytes - ext.len()).trim_end();
    format!("{}{}", stem, ext)
}

/// Longest prefix of `s` no longer than `max_bytes`
pub fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separators_become_hyphens() {
        assert_eq!(sanitize_path("Title/With:Slashes"), "Title-With-Slashes");
        assert_eq!(sanitize_path("Author\\Name"), "Author-Name");
        assert_eq!(sanitize_path("A|B"), "A-B");
    }

    #[test]
    fn test_quotes_become_apostrophes() {
        assert_eq!(sanitize_path("Author \"Name\""), "Author 'Name'");
    }

    #[test]
    fn test_forbidden_characters_removed() {
        assert_eq!(sanitize_path("What? <Really>*"), "What Really");
        assert_eq!(sanitize_path("tab\there\u{0007}"), "tab here");
        assert_eq!(sanitize_path("  lots   of\n space  "), "lots of space");
    }

    #[test]
    fn test_filename_truncation_keeps_extension() {
        let long = format!("{}.pdf", "a".repeat(300));
        let truncated = sanitize_filename(&long, 255);
        assert_eq!(truncated.len(), 255);
        assert!(truncated.ends_with(".pdf"));

        assert_eq!(sanitize_filename("short.pdf", 255), "short.pdf");
        assert_eq!(sanitize_filename("no limit", 0), "no limit");
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let title = "é".repeat(10);
        let truncated = sanitize_filename(&title, 5);
        assert_eq!(truncated, "éé");
    }
}
