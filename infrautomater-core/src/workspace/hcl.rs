//! HCL literal encoding for values interpolated into generated files

use std::fmt::Write;

/// Encode `value` as a double-quoted HCL string literal.
///
/// Escapes quotes, backslashes and control characters, and neutralises
/// `${` / `%{` so request input can never open an interpolation or a
/// template directive.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');

    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04X}", c as u32);
            }
            c => out.push(c),
        }
    }

    out.push('"');
    out
}

/// A value written to the variables file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HclValue {
    Str(String),
    Bool(bool),
    Int(i64),
}

impl HclValue {
    /// Render as an HCL expression
    pub fn render(&self) -> String {
        match self {
            HclValue::Str(s) => quote(s),
            HclValue::Bool(b) => b.to_string(),
            HclValue::Int(n) => n.to_string(),
        }
    }

    /// Terraform type constraint for the matching variable block
    pub fn type_name(&self) -> &'static str {
        match self {
            HclValue::Str(_) => "string",
            HclValue::Bool(_) => "bool",
            HclValue::Int(_) => "number",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HclValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for HclValue {
    fn from(value: &str) -> Self {
        HclValue::Str(value.to_string())
    }
}

impl From<String> for HclValue {
    fn from(value: String) -> Self {
        HclValue::Str(value)
    }
}

impl From<bool> for HclValue {
    fn from(value: bool) -> Self {
        HclValue::Bool(value)
    }
}

impl From<i64> for HclValue {
    fn from(value: i64) -> Self {
        HclValue::Int(value)
    }
}
