//! Literal nodes and their value kinds

use std::fmt;

use crate::error::{EngineError, EngineResult};

/// Kind tag stored with every literal payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LiteralKind {
    String = 1,
    Uri = 2,
    Byte = 3,
    Short = 4,
    Integer = 5,
    Long = 6,
    Float = 7,
    Double = 8,
}

impl LiteralKind {
    /// Returns the on-disk tag byte
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parses an on-disk tag byte
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(LiteralKind::String),
            2 => Some(LiteralKind::Uri),
            3 => Some(LiteralKind::Byte),
            4 => Some(LiteralKind::Short),
            5 => Some(LiteralKind::Integer),
            6 => Some(LiteralKind::Long),
            7 => Some(LiteralKind::Float),
            8 => Some(LiteralKind::Double),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LiteralKind::String => "string",
            LiteralKind::Uri => "uri",
            LiteralKind::Byte => "byte",
            LiteralKind::Short => "short",
            LiteralKind::Integer => "integer",
            LiteralKind::Long => "long",
            LiteralKind::Float => "float",
            LiteralKind::Double => "double",
        }
    }
}

impl fmt::Display for LiteralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed view of a literal payload.
///
/// Numeric kinds hold their decimal text form; `Byte` holds a single raw byte.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Text(String),
    Byte(u8),
    Short(i16),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

/// Leaf node holding an immutable byte payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal {
    kind: LiteralKind,
    content: Option<Vec<u8>>,
}

impl Literal {
    /// Creates a literal with the given kind and payload
    pub fn new(kind: LiteralKind, content: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            content: Some(content.into()),
        }
    }

    /// Creates a string literal
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(LiteralKind::String, content.into().into_bytes())
    }

    /// Creates a literal whose payload is filled in later.
    ///
    /// Encoding it before `set_content` fails.
    pub fn pending(kind: LiteralKind) -> Self {
        Self {
            kind,
            content: None,
        }
    }

    pub fn kind(&self) -> LiteralKind {
        self.kind
    }

    /// Raw payload, `None` while pending
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    pub fn set_content(&mut self, kind: LiteralKind, content: impl Into<Vec<u8>>) {
        self.kind = kind;
        self.content = Some(content.into());
    }

    /// Payload as text, replacing invalid UTF-8
    pub fn as_text(&self) -> Option<String> {
        self.content
            .as_ref()
            .map(|c| String::from_utf8_lossy(c).into_owned())
    }

    /// Interprets the payload according to its kind.
    pub fn value(&self) -> EngineResult<LiteralValue> {
        let content = self
            .content
            .as_deref()
            .ok_or_else(|| EngineError::invalid_node("literal content required"))?;

        if self.kind == LiteralKind::Byte {
            return match content {
                [b] => Ok(LiteralValue::Byte(*b)),
                _ => Err(EngineError::invalid_node(format!(
                    "byte literal must hold exactly one byte, got {}",
                    content.len()
                ))),
            };
        }

        let text = std::str::from_utf8(content)
            .map_err(|e| EngineError::invalid_node(format!("literal is not UTF-8: {}", e)))?;
        let parse_err = |e: &dyn fmt::Display| {
            EngineError::invalid_node(format!("invalid {} literal '{}': {}", self.kind, text, e))
        };

        let value = match self.kind {
            LiteralKind::String | LiteralKind::Uri => LiteralValue::Text(text.to_string()),
            LiteralKind::Short => LiteralValue::Short(text.trim().parse().map_err(|e| parse_err(&e))?),
            LiteralKind::Integer => {
                LiteralValue::Integer(text.trim().parse().map_err(|e| parse_err(&e))?)
            }
            LiteralKind::Long => LiteralValue::Long(text.trim().parse().map_err(|e| parse_err(&e))?),
            LiteralKind::Float => LiteralValue::Float(text.trim().parse().map_err(|e| parse_err(&e))?),
            LiteralKind::Double => {
                LiteralValue::Double(text.trim().parse().map_err(|e| parse_err(&e))?)
            }
            LiteralKind::Byte => unreachable!("handled above"),
        };
        Ok(value)
    }
}

impl From<LiteralValue> for Literal {
    fn from(value: LiteralValue) -> Self {
        match value {
            LiteralValue::Text(s) => Literal::text(s),
            LiteralValue::Byte(b) => Literal::new(LiteralKind::Byte, vec![b]),
            LiteralValue::Short(v) => Literal::new(LiteralKind::Short, v.to_string()),
            LiteralValue::Integer(v) => Literal::new(LiteralKind::Integer, v.to_string()),
            LiteralValue::Long(v) => Literal::new(LiteralKind::Long, v.to_string()),
            LiteralValue::Float(v) => Literal::new(LiteralKind::Float, v.to_string()),
            LiteralValue::Double(v) => Literal::new(LiteralKind::Double, v.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_bytes() {
        for b in 1..=8u8 {
            let kind = LiteralKind::from_byte(b).unwrap();
            assert_eq!(kind.as_byte(), b);
        }
        assert!(LiteralKind::from_byte(0).is_none());
        assert!(LiteralKind::from_byte(9).is_none());
    }

    #[test]
    fn test_typed_values() {
        let lit: Literal = LiteralValue::Integer(-42).into();
        assert_eq!(lit.kind(), LiteralKind::Integer);
        assert_eq!(lit.value().unwrap(), LiteralValue::Integer(-42));

        let lit: Literal = LiteralValue::Byte(7).into();
        assert_eq!(lit.content(), Some(&[7u8][..]));
        assert_eq!(lit.value().unwrap(), LiteralValue::Byte(7));

        let lit = Literal::new(LiteralKind::Double, "2.5");
        assert_eq!(lit.value().unwrap(), LiteralValue::Double(2.5));
    }

    #[test]
    fn test_bad_numeric_literal() {
        let lit = Literal::new(LiteralKind::Short, "99999");
        assert!(lit.value().is_err());
    }

    #[test]
    fn test_pending_literal() {
        let mut lit = Literal::pending(LiteralKind::String);
        assert!(lit.content().is_none());
        assert!(lit.value().is_err());

        lit.set_content(LiteralKind::Uri, "http://example.org");
        assert_eq!(lit.kind(), LiteralKind::Uri);
        assert_eq!(lit.as_text().unwrap(), "http://example.org");
    }
}
