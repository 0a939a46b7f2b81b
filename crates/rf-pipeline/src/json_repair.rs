//! Tolerant JSON parsing for generative output.
//!
//! Models wrap JSON in code fences, leave trailing commas, and sprinkle
//! `//` or `/* */` comments. [`parse_lenient`] tries a strict parse first,
//! then applies [`cleanup`] once and tries again.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use rf_core::{Error, Result};

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\s*```\s*$")
        .expect("static code fence pattern is valid")
});

/// Parse `text` as JSON, cleaning it up once if the strict parse fails.
pub fn parse_lenient(text: &str) -> Result<Value> {
    match serde_json::from_str(text.trim()) {
        Ok(value) => Ok(value),
        Err(strict_err) => {
            let cleaned = cleanup(text);
            serde_json::from_str(&cleaned).map_err(|e| {
                tracing::debug!("Strict parse failed ({strict_err}); cleanup did not help");
                Error::Parse(format!("invalid JSON after cleanup: {e}"))
            })
        }
    }
}

/// Remove common formatting noise around and inside a JSON document.
pub fn cleanup(text: &str) -> String {
    let unfenced = strip_code_fence(text);
    let body = outermost_json(unfenced);
    let without_comments = strip_comments(body);
    strip_trailing_commas(&without_comments)
}

fn strip_code_fence(text: &str) -> &str {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => text.trim(),
    }
}

/// Slice from the first opening bracket to the last closing bracket, dropping
/// chatter before and after the document.
fn outermost_json(text: &str) -> &str {
    let start = text.find(['{', '[']);
    let end = text.rfind(['}', ']']);
    match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => text,
    }
}

/// Drop `//` line comments and `/* */` block comments outside strings.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Drop commas that directly precede a closing bracket, outside strings.
fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}
