//! Recipe declaration scanning
//!
//! Finds `NAME="..."` and `NAME+="..."` assignments in recipe text, following
//! quoted values across lines, and splits a value into tokens.

use crate::error::{ParseError, ParseErrorKind};
use regex::Regex;
use std::sync::OnceLock;

/// One quoted assignment found in a recipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Variable name, without assignment punctuation
    pub name: String,
    /// `+=` rather than `=`
    pub append: bool,
    /// Raw value between the quotes, newlines preserved
    pub value: String,
    /// 1-based line where the declaration starts
    pub line: usize,
}

impl Declaration {
    /// Whitespace-separated tokens of the value
    pub fn tokens(&self) -> Vec<String> {
        tokenize(&self.value)
    }
}

fn declaration_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*(?:export\s+|local\s+)?([A-Za-z_][A-Za-z0-9_]*)(\+)?="(.*)$"#)
            .expect("invalid declaration pattern")
    })
}

/// Scan recipe text for quoted declarations, in source order
pub fn declarations(text: &str) -> Result<Vec<Declaration>, ParseError> {
    let mut found = Vec::new();
    let mut lines = text.lines().enumerate();

    while let Some((idx, raw_line)) = lines.next() {
        let line = strip_comment(raw_line);
        let Some(caps) = declaration_start().captures(line) else {
            continue;
        };

        let name = caps[1].to_string();
        let append = caps.get(2).is_some();
        let rest = caps.get(3).map_or("", |m| m.as_str());
        let start_line = idx + 1;

        if let Some(end) = find_unescaped_quote(rest) {
            found.push(Declaration {
                name,
                append,
                value: rest[..end].to_string(),
                line: start_line,
            });
            continue;
        }

        let mut value = rest.to_string();
        let mut closed = false;
        for (_, next_raw) in lines.by_ref() {
            let next = strip_comment(next_raw).trim_end();
            value.push('\n');
            if ends_with_unescaped_quote(next) {
                value.push_str(&next[..next.len() - 1]);
                closed = true;
                break;
            }
            value.push_str(next);
        }

        if !closed {
            return Err(ParseError::new(
                ParseErrorKind::UnterminatedDeclaration,
                start_line,
            )
            .in_declaration(name));
        }

        found.push(Declaration {
            name,
            append,
            value,
            line: start_line,
        });
    }

    Ok(found)
}

/// Split a declaration value into tokens
///
/// Newlines and quote characters count as whitespace; empty tokens are dropped.
pub fn tokenize(value: &str) -> Vec<String> {
    value
        .replace(['\n', '"'], " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Drop a trailing shell comment
///
/// A `#` starts a comment only when unescaped and at the start of a word.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'#' && !is_escaped(bytes, i) && (i == 0 || bytes[i - 1].is_ascii_whitespace()) {
            return &line[..i];
        }
    }
    line
}

fn is_escaped(bytes: &[u8], idx: usize) -> bool {
    let mut backslashes = 0;
    let mut i = idx;
    while i > 0 && bytes[i - 1] == b'\\' {
        backslashes += 1;
        i -= 1;
    }
    backslashes % 2 == 1
}

fn find_unescaped_quote(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    (0..bytes.len()).find(|&i| bytes[i] == b'"' && !is_escaped(bytes, i))
}

fn ends_with_unescaped_quote(s: &str) -> bool {
    let bytes = s.as_bytes();
    !bytes.is_empty() && bytes[bytes.len() - 1] == b'"' && !is_escaped(bytes, bytes.len() - 1)
}
