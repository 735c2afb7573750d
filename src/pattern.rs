use regex::Regex;

use crate::error::Result;

/// A store-style glob filter (`*`, `?`, `[abc]`, `[^a-z]`, `\` escapes).
#[derive(Debug, Clone)]
pub struct KeyPattern {
    source: String,
    regex: Regex,
}

impl KeyPattern {
    pub fn compile(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&glob_to_regex(pattern))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::from("(?s)^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => push_literal(&mut out, escaped),
                None => out.push_str(r"\\"),
            },
            '[' => {
                let mut raw = String::from("[");
                let negated = chars.peek() == Some(&'^');
                if negated {
                    chars.next();
                    raw.push('^');
                }

                // (char, escaped)
                let mut items: Vec<(char, bool)> = Vec::new();
                let mut closed = false;
                while let Some(n) = chars.next() {
                    raw.push(n);
                    match n {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            if let Some(e) = chars.next() {
                                raw.push(e);
                                items.push((e, true));
                            }
                        }
                        other => items.push((other, false)),
                    }
                }

                if closed && !items.is_empty() {
                    out.push('[');
                    if negated {
                        out.push('^');
                    }
                    push_class_items(&mut out, &items);
                    out.push(']');
                } else {
                    // Unclosed or empty class: match the text literally
                    for r in raw.chars() {
                        push_literal(&mut out, r);
                    }
                }
            }
            other => push_literal(&mut out, other),
        }
    }

    out.push('$');
    out
}

fn push_literal(out: &mut String, c: char) {
    let mut buf = [0u8; 4];
    out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}

/// Emit class members. `x-y` is a range with its ends put in order, so
/// `[z-a]` means the same as `[a-z]`. A `-` that has no member on both sides
/// is literal.
fn push_class_items(class: &mut String, items: &[(char, bool)]) {
    let mut i = 0;
    while i < items.len() {
        let (c, _) = items[i];
        match (items.get(i + 1), items.get(i + 2)) {
            (Some(&('-', false)), Some(&(end, _))) => {
                let (lo, hi) = if c <= end { (c, end) } else { (end, c) };
                push_class_literal(class, lo);
                class.push('-');
                push_class_literal(class, hi);
                i += 3;
            }
            _ => {
                push_class_literal(class, c);
                i += 1;
            }
        }
    }
}

fn push_class_literal(class: &mut String, c: char) {
    if matches!(c, '\\' | ']' | '[' | '^' | '-' | '&' | '~') {
        class.push('\\');
    }
    class.push(c);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, key: &str) -> bool {
        KeyPattern::compile(pattern).expect("compile").matches(key)
    }

    #[test]
    fn test_star_and_question() {
        assert!(matches("*", "anything:at:all"));
        assert!(matches("*", ""));
        assert!(matches("user:*", "user:1:profile"));
        assert!(!matches("user:*", "session:1"));
        assert!(matches("user:?", "user:7"));
        assert!(!matches("user:?", "user:77"));
    }

    #[test]
    fn test_character_classes() {
        assert!(matches("h[ae]llo", "hallo"));
        assert!(matches("h[ae]llo", "hello"));
        assert!(!matches("h[ae]llo", "hillo"));
        assert!(matches("h[^e]llo", "hallo"));
        assert!(!matches("h[^e]llo", "hello"));
        assert!(matches("key[0-9]", "key5"));
        assert!(!matches("key[0-9]", "keyx"));
    }

    #[test]
    fn test_reversed_range_is_normalized() {
        assert!(KeyPattern::compile("[z-a]").is_ok());
        assert!(matches("[z-a]", "m"));
        assert!(!matches("[z-a]", "M"));
        assert!(matches("key[9-0]", "key5"));
        assert!(!matches("key[^9-0]", "key5"));
    }

    #[test]
    fn test_class_dash_and_escapes() {
        assert!(matches("[-a]", "-"));
        assert!(matches("[a-]", "-"));
        assert!(!matches("[a-]", "b"));
        assert!(matches(r"[a\-z]", "-"));
        assert!(!matches(r"[a\-z]", "m"));
        assert!(matches(r"[\]]", "]"));
    }

    #[test]
    fn test_escapes_and_regex_metacharacters() {
        assert!(matches(r"a\*b", "a*b"));
        assert!(!matches(r"a\*b", "axxb"));
        assert!(matches("cache.(v1)", "cache.(v1)"));
        assert!(!matches("cache.(v1)", "cacheX(v1)"));
        assert!(matches("a+b", "a+b"));
    }

    #[test]
    fn test_unclosed_class_is_literal() {
        assert!(matches("a[bc", "a[bc"));
        assert!(!matches("a[bc", "ab"));
    }
}
