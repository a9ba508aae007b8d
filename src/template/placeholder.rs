//! Placeholder syntax shared by layer values and numeric timing fields.
//!
//! `{key}` names a record field. `{{` and `}}` produce literal braces. A value that consists of
//! exactly one placeholder binds the field's value as-is; anything else is interpolated into a
//! string.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::foundation::error::{VidstampError, VidstampResult};

/// One piece of a parsed value string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    /// Text with escapes already resolved.
    Literal(String),
    /// A `{key}` reference.
    Key(String),
}

/// Split `s` into literal text and placeholder keys.
pub fn parse_segments(s: &str) -> VidstampResult<Vec<Segment>> {
    let mut out = Vec::new();
    let mut lit = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                lit.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                lit.push('}');
            }
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for k in chars.by_ref() {
                    if k == '}' {
                        closed = true;
                        break;
                    }
                    if k == '{' {
                        return Err(VidstampError::template(format!(
                            "nested '{{' in placeholder of '{s}'"
                        )));
                    }
                    key.push(k);
                }
                if !closed {
                    return Err(VidstampError::template(format!(
                        "unclosed placeholder in '{s}'"
                    )));
                }
                let key = key.trim();
                if key.is_empty() {
                    return Err(VidstampError::template(format!(
                        "empty placeholder key in '{s}'"
                    )));
                }
                if !lit.is_empty() {
                    out.push(Segment::Literal(std::mem::take(&mut lit)));
                }
                out.push(Segment::Key(key.to_string()));
            }
            '}' => {
                return Err(VidstampError::template(format!(
                    "unmatched '}}' in '{s}' (use '}}}}' for a literal brace)"
                )));
            }
            _ => lit.push(c),
        }
    }

    if !lit.is_empty() {
        out.push(Segment::Literal(lit));
    }
    Ok(out)
}

/// A layer value: literal text, a single placeholder, or text with embedded placeholders.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValueRef {
    /// No placeholders.
    Literal(String),
    /// Exactly one `{key}` and nothing else.
    Placeholder(String),
    /// Text mixed with placeholders.
    Interpolated(Vec<Segment>),
}

impl ValueRef {
    /// Parse template text, rejecting unbalanced braces and empty keys.
    pub fn parse(s: &str) -> VidstampResult<Self> {
        let segments = parse_segments(s)?;
        if let [Segment::Key(k)] = segments.as_slice() {
            return Ok(Self::Placeholder(k.clone()));
        }
        if segments.iter().all(|s| matches!(s, Segment::Literal(_))) {
            return Ok(Self::Literal(
                segments.into_iter().map(segment_text).collect(),
            ));
        }
        Ok(Self::Interpolated(segments))
    }

    /// Placeholder keys referenced by this value, in order of appearance.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Self::Literal(_) => Vec::new(),
            Self::Placeholder(k) => vec![k.as_str()],
            Self::Interpolated(segs) => segs
                .iter()
                .filter_map(|s| match s {
                    Segment::Key(k) => Some(k.as_str()),
                    Segment::Literal(_) => None,
                })
                .collect(),
        }
    }
}

fn segment_text(s: Segment) -> String {
    match s {
        Segment::Literal(t) | Segment::Key(t) => t,
    }
}

fn escape_braces(s: &str) -> String {
    s.replace('{', "{{").replace('}', "}}")
}

impl TryFrom<String> for ValueRef {
    type Error = VidstampError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ValueRef> for String {
    fn from(value: ValueRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(s) => f.write_str(&escape_braces(s)),
            Self::Placeholder(k) => write!(f, "{{{k}}}"),
            Self::Interpolated(segs) => {
                for s in segs {
                    match s {
                        Segment::Literal(t) => f.write_str(&escape_braces(t))?,
                        Segment::Key(k) => write!(f, "{{{k}}}")?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// A numeric field: a literal number or a `{key}` placeholder resolved per record.
#[derive(Clone, Debug, PartialEq)]
pub enum NumberRef {
    /// Fixed value.
    Literal(f64),
    /// Record field holding the value.
    Placeholder(String),
}

impl Default for NumberRef {
    fn default() -> Self {
        Self::Literal(0.0)
    }
}

impl NumberRef {
    /// Placeholder key, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Literal(_) => None,
            Self::Placeholder(k) => Some(k),
        }
    }
}

impl Serialize for NumberRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Literal(n) => serializer.serialize_f64(*n),
            Self::Placeholder(k) => serializer.serialize_str(&format!("{{{k}}}")),
        }
    }
}

impl<'de> Deserialize<'de> for NumberRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Num(f64),
            Str(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Num(n) => Ok(Self::Literal(n)),
            Repr::Str(s) => match ValueRef::parse(&s).map_err(serde::de::Error::custom)? {
                ValueRef::Placeholder(k) => Ok(Self::Placeholder(k)),
                _ => Err(serde::de::Error::custom(format!(
                    "expected a number or a single '{{key}}' placeholder, got '{s}'"
                ))),
            },
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/template/placeholder.rs"]
mod tests;
