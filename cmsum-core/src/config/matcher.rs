//! Key–value matchers for PHP configuration files.
//!
//! Each matcher recognizes one assignment layout and returns the assigned
//! string literal, unescaped. Matchers are independent: a miss never affects
//! another key. Assignments inside `//`, `#` or `/* */` comments are skipped.

use regex::Regex;

/// Finds the value assigned to one configuration key in raw text.
pub trait KeyMatcher: Send + Sync {
    /// Returns the first live assigned value, or `None` when the key is absent.
    fn find(&self, text: &str) -> Option<String>;
}

/// PHP single- or double-quoted string literal; group 1 or group 2.
const PHP_STRING: &str = r#"(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")"#;

/// Regex-backed matcher for a PHP assignment layout.
#[derive(Debug, Clone)]
pub struct PhpAssignment {
    regex: Regex,
}

impl PhpAssignment {
    /// `define('KEY', 'value');` (WordPress constants)
    pub fn define(key: &str) -> Self {
        Self::compile(&format!(
            r#"define\(\s*['"]{}['"]\s*,\s*{}\s*\)"#,
            regex::escape(key),
            PHP_STRING
        ))
    }

    /// `public $name = 'value';` or `var $name = 'value';` (class properties)
    pub fn property(name: &str) -> Self {
        Self::compile(&format!(
            r"(?:public|var)\s+\${}\s*=\s*{}\s*;",
            regex::escape(name),
            PHP_STRING
        ))
    }

    /// `$name = 'value';` (global variables)
    pub fn variable(name: &str) -> Self {
        Self::compile(&format!(
            r"\${}\s*=\s*{}\s*;",
            regex::escape(name),
            PHP_STRING
        ))
    }

    fn compile(pattern: &str) -> Self {
        // Keys are compile-time constants escaped above, so the pattern is always valid.
        #[allow(clippy::expect_used)]
        let regex = Regex::new(pattern).expect("Invalid PHP assignment pattern");
        Self { regex }
    }
}

impl KeyMatcher for PhpAssignment {
    fn find(&self, text: &str) -> Option<String> {
        let captures = self
            .regex
            .captures_iter(text)
            .find(|c| c.get(0).is_some_and(|m| !is_commented(text, m.start())))?;
        if let Some(single) = captures.get(1) {
            return Some(unescape_single_quoted(single.as_str()));
        }
        captures
            .get(2)
            .map(|double| unescape_double_quoted(double.as_str()))
    }
}

/// Returns true when `offset` lies inside a PHP comment.
///
/// Block comments are tracked from the start of the text; line comments
/// from the start of the line. Comment markers inside string literals are
/// ignored.
fn is_commented(text: &str, offset: usize) -> bool {
    let mut chars = text[..offset].chars().peekable();
    let mut in_block = false;
    let mut in_line = false;
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if in_block {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block = false;
            }
            continue;
        }
        if in_line {
            if c == '\n' {
                in_line = false;
            }
            continue;
        }
        if let Some(q) = quote {
            if c == '\\' {
                chars.next();
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '#' => in_line = true,
            '/' if chars.peek() == Some(&'/') => in_line = true,
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                in_block = true;
            }
            _ => {}
        }
    }
    in_block || in_line
}

/// PHP single-quoted strings only escape `\'` and `\\`.
fn unescape_single_quoted(raw: &str) -> String {
    unescape(raw, &['\'', '\\'])
}

fn unescape_double_quoted(raw: &str) -> String {
    unescape(raw, &['"', '\\', '$'])
}

fn unescape(raw: &str, escapable: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\'
            && let Some(&next) = chars.peek()
            && escapable.contains(&next)
        {
            out.push(next);
            chars.next();
            continue;
        }
        out.push(c);
    }
    out
}
