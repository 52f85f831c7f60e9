//! Glob-style pattern matching for LIKE conditions.

/// Matches `text` against a glob pattern.
///
/// `*` matches any sequence of characters including the empty one, `?`
/// matches exactly one character, and `\*` / `\?` match the literal
/// characters. Matching is case-sensitive and greedy with backtracking,
/// O(|pattern| * |text|) in the worst case.
#[must_use]
pub fn like_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_from(&pattern, &text)
}

fn match_from(mut pattern: &[char], mut text: &[char]) -> bool {
    while let Some(&p) = pattern.first() {
        match p {
            '*' => {
                // Collapse consecutive wildcards; a trailing one matches
                // the whole remainder.
                while pattern.first() == Some(&'*') {
                    pattern = &pattern[1..];
                }
                if pattern.is_empty() {
                    return true;
                }
                while !text.is_empty() {
                    if match_from(pattern, text) {
                        return true;
                    }
                    text = &text[1..];
                }
                return match_from(pattern, text);
            }
            '?' => {
                if text.is_empty() {
                    return false;
                }
                pattern = &pattern[1..];
                text = &text[1..];
            }
            '\\' if matches!(pattern.get(1), Some('*') | Some('?')) => {
                if text.first() != pattern.get(1) {
                    return false;
                }
                pattern = &pattern[2..];
                text = &text[1..];
            }
            _ => {
                if text.first() != Some(&p) {
                    return false;
                }
                pattern = &pattern[1..];
                text = &text[1..];
            }
        }
    }
    text.is_empty()
}
