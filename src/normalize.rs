// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Text canonicalization applied before feature extraction and inference
//!
//! Steps, in order: lowercase, strip URL-like substrings, strip HTML-tag-like
//! spans, strip everything that is not a lowercase ASCII letter, digit or
//! whitespace, collapse whitespace. The result contains only `[a-z0-9 ]`
//! with single spaces and no leading/trailing whitespace.

/// Canonicalize raw text. Idempotent; never panics; `""` maps to `""`.
pub fn normalize(text: &str) -> String {
    // Character stripping can surface a fresh `http`/`www.` prefix
    // (e.g. "h.ttp"), so the single pass is iterated to a fixpoint.
    // Each pass only removes characters, so this terminates.
    let mut current = normalize_once(text);
    loop {
        let next = normalize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn normalize_once(text: &str) -> String {
    let lower = text.to_lowercase();
    let chars: Vec<char> = lower.chars().collect();

    let mut kept = String::with_capacity(lower.len());
    let mut i = 0;
    while i < chars.len() {
        if starts_url(&chars[i..]) {
            while i < chars.len() && !chars[i].is_whitespace() {
                i += 1;
            }
            continue;
        }
        if chars[i] == '<' {
            // Only a closed tag is removed; a dangling '<' falls through to
            // the character filter below.
            if let Some(close) = chars[i + 1..].iter().position(|&c| c == '>') {
                i += close + 2;
                continue;
            }
        }
        kept.push(chars[i]);
        i += 1;
    }

    let mut out = String::with_capacity(kept.len());
    let mut pending_space = false;
    for c in kept.chars() {
        if c.is_whitespace() {
            pending_space = true;
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        }
    }
    out
}

fn starts_url(chars: &[char]) -> bool {
    starts_with(chars, &['h', 't', 't', 'p']) || starts_with(chars, &['w', 'w', 'w', '.'])
}

fn starts_with(chars: &[char], prefix: &[char]) -> bool {
    chars.len() >= prefix.len() && chars[..prefix.len()] == *prefix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_example() {
        assert_eq!(
            normalize("Visit http://example.com for MORE!!!"),
            "visit for more"
        );
    }

    #[test]
    fn test_lowercases_and_strips_punctuation() {
        assert_eq!(normalize("Hello, World! 123"), "hello world 123");
    }

    #[test]
    fn test_removes_urls() {
        assert_eq!(normalize("see https://a.b/c?d=1 now"), "see now");
        assert_eq!(normalize("go to www.example.org today"), "go to today");
        // URL start glued to a preceding token
        assert_eq!(normalize("linkhttp://x.y trailing"), "link trailing");
    }

    #[test]
    fn test_removes_html_tags() {
        assert_eq!(normalize("a <b>bold</b> claim"), "a bold claim");
        assert_eq!(normalize("broken < tag stays"), "broken tag stays");
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(normalize("  a \t b \n\n c  "), "a b c");
    }

    #[test]
    fn test_empty_and_degenerate_inputs() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize("!!!"), "");
        assert_eq!(normalize("http://only-a-url.com"), "");
    }

    #[test]
    fn test_non_ascii_is_dropped() {
        assert_eq!(normalize("café ☕ naïve"), "caf nave");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "Visit http://example.com for MORE!!!",
            "a <b>bold</b> claim",
            "h.ttp glued prefix",
            "w,ww. another pathological case",
            "plain text already normal",
            "",
            "  MIXED Case \t with\nnoise?!  ",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_no_url_tokens_survive() {
        let inputs = [
            "pre http://a.b post",
            "pre https://a.b post",
            "pre www.a.b post",
            "httpx alone",
        ];
        for input in inputs {
            let out = normalize(input);
            for token in out.split_whitespace() {
                assert!(!token.starts_with("http"), "url survived in {out:?}");
                assert!(!token.starts_with("www"), "url survived in {out:?}");
            }
        }
    }
}
