//! Template rendering: `{{.name}}` placeholder substitution.
//!
//! The renderer is a pure substitutor, not an expression language. Besides
//! placeholders it understands exactly one other action form, the literal
//! escape `{{"text"}}`, which emits `text` verbatim; imported content uses
//! it to round-trip literal double braces. Any other `{{` run passes
//! through untouched.

use crate::error::Error;
use crate::project::{Coordinate, Properties};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};

/// Renders a template against resolved properties.
///
/// Placeholder names match `[A-Za-z0-9_]+`. A placeholder without a matching
/// property fails with a rendering error unless listed in `allow_missing`,
/// in which case it is left in place.
///
/// # Errors
///
/// Returns an error naming the first unknown placeholder.
pub fn render(
    coordinate: &Coordinate,
    template: &str,
    properties: &Properties,
    allow_missing: &HashSet<String>,
) -> Result<String, Error> {
    let mut result = String::with_capacity(template.len());
    let mut remaining = template;

    while let Some(start) = remaining.find("{{") {
        result.push_str(&remaining[..start]);
        let after_open = &remaining[start + 2..];

        if let Some((name, rest)) = parse_placeholder(after_open) {
            match properties.get(name) {
                Some(value) => result.push_str(&property_to_string(value)),
                None if allow_missing.contains(name) => {
                    result.push_str("{{.");
                    result.push_str(name);
                    result.push_str("}}");
                }
                None => return Err(Error::missing_template_var(coordinate, name)),
            }
            remaining = rest;
        } else if let Some((literal, rest)) = parse_literal(after_open) {
            result.push_str(&literal);
            remaining = rest;
        } else {
            // Not an action we know, pass the braces through
            result.push_str("{{");
            remaining = after_open;
        }
    }

    result.push_str(remaining);
    Ok(result)
}

/// Extracts the set of placeholder names a template declares.
///
/// Used by validation to check template/parameter agreement and as the
/// inverse of [`render`]: rendering then extracting yields exactly the
/// placeholders that had no substitution.
#[must_use]
pub fn placeholders(template: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut remaining = template;

    while let Some(start) = remaining.find("{{") {
        let after_open = &remaining[start + 2..];
        if let Some((name, rest)) = parse_placeholder(after_open) {
            names.insert(name.to_string());
            remaining = rest;
        } else if let Some((_, rest)) = parse_literal(after_open) {
            remaining = rest;
        } else {
            remaining = after_open;
        }
    }

    names
}

/// Tries to parse `.name}}` at the start of `input`. Returns the name and
/// the remainder after the closing braces.
fn parse_placeholder(input: &str) -> Option<(&str, &str)> {
    let body = input.strip_prefix('.')?;
    let end = body.find("}}")?;
    let name = &body[..end];
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return None;
    }
    Some((name, &body[end + 2..]))
}

/// Tries to parse `"literal"}}` at the start of `input`. Handles `\"` and
/// `\\` escapes inside the literal.
fn parse_literal(input: &str) -> Option<(String, &str)> {
    let body = input.strip_prefix('"')?;
    let mut literal = String::new();
    let mut chars = body.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                literal.push(escaped);
            }
            '"' => {
                let rest = body[i + 1..].strip_prefix("}}")?;
                return Some((literal, rest));
            }
            _ => literal.push(c),
        }
    }

    None
}

/// Converts a resolved property value to its substitution text.
///
/// Strings substitute raw (escaping happened at resolve time); everything
/// else substitutes as compact JSON.
#[must_use]
pub fn property_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
