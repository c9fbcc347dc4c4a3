//! Literal syntax for leaf values.
//!
//! Leaves cross the wire as source-literal text: strings are JSON-quoted,
//! numbers use the shortest round-trip form (`3`, `0.5`, `1e+21`, `NaN`,
//! `-Infinity`), regular expressions render as `/source/flags`.
//! [`parse_leaf`] is the inverse used when replaying descriptors.

use regex::RegexBuilder;

use crate::error::{Error, Result};
use crate::value::{RegexLiteral, Value};

pub fn render_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return n.to_string();
    }
    // Exponent form, with an explicit sign on positive exponents.
    let text = format!("{n:e}");
    match text.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
        _ => text,
    }
}

/// Render a scalar. Returns `None` for object references.
pub fn render_leaf(value: &Value) -> Option<String> {
    Some(match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => render_number(*n),
        Value::String(s) => serde_json::to_string(s).unwrap_or_else(|_| format!("{s:?}")),
        Value::Regex(re) => re.to_string(),
        Value::Object(_) => return None,
    })
}

/// Parse literal text produced by [`render_leaf`] back into a scalar.
pub fn parse_leaf(text: &str) -> Result<Value> {
    match text {
        "undefined" => return Ok(Value::Undefined),
        "null" => return Ok(Value::Null),
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        "NaN" => return Ok(Value::Number(f64::NAN)),
        "Infinity" => return Ok(Value::Number(f64::INFINITY)),
        "-Infinity" => return Ok(Value::Number(f64::NEG_INFINITY)),
        _ => {}
    }
    if text.starts_with('"') {
        return serde_json::from_str::<String>(text)
            .map(Value::String)
            .map_err(|e| Error::InvalidDescriptor(format!("bad string literal: {e}")));
    }
    if let Some(rest) = text.strip_prefix('/') {
        let end = rest
            .rfind('/')
            .ok_or_else(|| Error::InvalidDescriptor(format!("bad regex literal: {text}")))?;
        return Ok(Value::Regex(RegexLiteral {
            source: rest[..end].to_string(),
            flags: rest[end + 1..].to_string(),
        }));
    }
    text.parse::<f64>()
        .map(Value::Number)
        .map_err(|_| Error::InvalidDescriptor(format!("bad leaf literal: {text}")))
}

/// Build a regex literal, checking that the pattern compiles.
///
/// Flags `i`, `m`, `s` and `x` affect validation; `g`, `u` and `y` are
/// accepted and carried through untouched.
pub fn regex_literal(source: &str, flags: &str) -> Result<RegexLiteral> {
    let mut builder = RegexBuilder::new(source);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            'g' | 'u' | 'y' => &mut builder,
            other => return Err(Error::EvalFailed(format!("invalid regex flag: {other}"))),
        };
    }
    builder
        .build()
        .map_err(|e| Error::EvalFailed(format!("invalid regex: {e}")))?;
    Ok(RegexLiteral {
        source: source.to_string(),
        flags: flags.to_string(),
    })
}
