//! Typed results returned by the gateway.
//!
//! The gateway only ever answers with text. [`Reply`] is that text after
//! coercion: nothing, a single scalar, an ordered list, or an ordered
//! key/value mapping built from an evenly sized list.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

/// A single value: numeric text becomes a number, everything else stays text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    String(String),
}

impl Scalar {
    /// Coerce text into a scalar, parsing it as a number when the whole
    /// (whitespace-trimmed) text is numeric.
    pub fn from_text(text: &str) -> Self {
        parse_number(text).map_or_else(|| Self::String(text.to_owned()), Self::Number)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Number(_) => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// The result of a gateway operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    /// No value.
    None,
    Scalar(Scalar),
    List(Vec<Scalar>),
    /// Insertion-ordered mapping with unique keys.
    Map(IndexMap<String, Scalar>),
}

impl Reply {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Build a reply from a command's response body.
    ///
    /// Trailing newlines are stripped; an empty body is [`Reply::None`].
    pub(crate) fn from_body(body: &str) -> Self {
        let text = body.trim_end_matches(['\n', '\r']);
        if text.is_empty() {
            Self::None
        } else {
            Self::Scalar(Scalar::from_text(text))
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Scalar(s) => write!(f, "{s}"),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str("\n")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Self::Map(entries) => {
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str("\n")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                Ok(())
            }
        }
    }
}

/// Parse text as a finite number, allowing only sign, digit, point and
/// exponent characters so that words like `inf` or `NaN` stay text.
fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty()
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
        || !trimmed.chars().any(|c| c.is_ascii_digit())
    {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}
