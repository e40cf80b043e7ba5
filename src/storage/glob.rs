//! Glob Patterns for KEYS and SCAN MATCH
//!
//! Supports `*`, `?`, `[abc]`, `[^abc]`, `[a-z]` and `\` escapes, matched
//! over raw key bytes.

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: Vec<u8>,
    match_all: bool,
}

impl GlobPattern {
    pub fn new(pattern: &[u8]) -> Self {
        Self {
            pattern: pattern.to_vec(),
            match_all: pattern == b"*",
        }
    }

    pub fn matches(&self, text: &[u8]) -> bool {
        self.match_all || Self::matches_from(&self.pattern, text)
    }

    fn matches_from(mut pattern: &[u8], mut text: &[u8]) -> bool {
        while let Some(&p) = pattern.first() {
            match p {
                b'*' => {
                    while pattern.first() == Some(&b'*') {
                        pattern = &pattern[1..];
                    }
                    if pattern.is_empty() {
                        return true;
                    }
                    return (0..=text.len()).any(|i| Self::matches_from(pattern, &text[i..]));
                }
                b'?' => {
                    if text.is_empty() {
                        return false;
                    }
                    pattern = &pattern[1..];
                    text = &text[1..];
                }
                b'[' => {
                    let Some(&c) = text.first() else {
                        return false;
                    };
                    let (matched, rest) = Self::match_class(&pattern[1..], c);
                    if !matched {
                        return false;
                    }
                    pattern = rest;
                    text = &text[1..];
                }
                b'\\' if pattern.len() > 1 => {
                    if text.first() != Some(&pattern[1]) {
                        return false;
                    }
                    pattern = &pattern[2..];
                    text = &text[1..];
                }
                literal => {
                    if text.first() != Some(&literal) {
                        return false;
                    }
                    pattern = &pattern[1..];
                    text = &text[1..];
                }
            }
        }
        text.is_empty()
    }

    /// Matches `c` against a class body (after the `[`), returning the
    /// result and the pattern following the closing `]`.
    fn match_class(class: &[u8], c: u8) -> (bool, &[u8]) {
        let (negate, mut i) = match class.first() {
            Some(b'^') => (true, 1),
            _ => (false, 0),
        };
        let mut matched = false;

        while i < class.len() && class[i] != b']' {
            if class[i] == b'\\' && i + 1 < class.len() {
                matched |= class[i + 1] == c;
                i += 2;
            } else if i + 2 < class.len() && class[i + 1] == b'-' && class[i + 2] != b']' {
                let (lo, hi) = if class[i] <= class[i + 2] {
                    (class[i], class[i + 2])
                } else {
                    (class[i + 2], class[i])
                };
                matched |= (lo..=hi).contains(&c);
                i += 3;
            } else {
                matched |= class[i] == c;
                i += 1;
            }
        }

        // unterminated class: treat the rest as the class body
        let rest = if i < class.len() { &class[i + 1..] } else { &[][..] };
        (matched != negate, rest)
    }
}
