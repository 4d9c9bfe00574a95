//! Lenient parsing of JSON-like text fields.
//!
//! Nested API fields sometimes arrive as text: strict JSON, JSON written
//! with single quotes, or Python literal syntax (`'a'`, `True`, `None`,
//! tuples). [`parse_relaxed_json`] tries, in order:
//!
//! 1. strict JSON
//! 2. JSON after replacing every `'` with `"`
//! 3. a literal parser accepting both JSON and Python literal syntax

use market_warehouse_core::{RawRecord, RawValue};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelaxedJsonError {
    #[error("empty input")]
    Empty,

    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
}

/// Parses `text` as JSON or a Python-style literal.
///
/// # Errors
///
/// Returns an error when no strategy accepts the text.
pub fn parse_relaxed_json(text: &str) -> Result<RawValue, RelaxedJsonError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(RelaxedJsonError::Empty);
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return Ok(RawValue::from(value));
    }
    if trimmed.contains('\'') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&trimmed.replace('\'', "\"")) {
            return Ok(RawValue::from(value));
        }
    }
    LiteralParser::new(trimmed).parse_document()
}

/// Decodes a possibly text-encoded nested field.
///
/// Strings go through [`parse_relaxed_json`]; other non-null values are
/// returned unchanged. Missing, null and unparseable values yield `None`.
#[must_use]
pub fn parse_field(value: Option<&RawValue>) -> Option<RawValue> {
    match value? {
        RawValue::Null => None,
        RawValue::String(text) => match parse_relaxed_json(text) {
            Ok(RawValue::Null) => None,
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::debug!(error = %e, "Unparseable nested field");
                None
            }
        },
        other => Some(other.clone()),
    }
}

/// Deepest nesting of lists and mappings the literal parser accepts.
const MAX_DEPTH: usize = 128;

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl LiteralParser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            depth: 0,
        }
    }

    fn parse_document(mut self) -> Result<RawValue, RelaxedJsonError> {
        let value = self.parse_value()?;
        self.skip_whitespace();
        if self.pos < self.chars.len() {
            return Err(self.error("trailing characters"));
        }
        Ok(value)
    }

    fn error(&self, message: impl Into<String>) -> RelaxedJsonError {
        RelaxedJsonError::Syntax {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: char) -> Result<(), RelaxedJsonError> {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    fn parse_value(&mut self) -> Result<RawValue, RelaxedJsonError> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some('[') => self.nested(|p| p.parse_sequence('[', ']')),
            Some('(') => self.nested(|p| p.parse_sequence('(', ')')),
            Some('{') => self.nested(Self::parse_mapping),
            Some(q @ ('\'' | '"')) => self.parse_string(q).map(RawValue::String),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_ascii_alphabetic() => self.parse_keyword(),
            Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
        }
    }

    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<RawValue, RelaxedJsonError>,
    ) -> Result<RawValue, RelaxedJsonError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(format!("nesting deeper than {MAX_DEPTH}")));
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn parse_sequence(&mut self, open: char, close: char) -> Result<RawValue, RelaxedJsonError> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(RawValue::List(items));
            }
            items.push(self.parse_value()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(c) if c == close => {}
                _ => return Err(self.error(format!("expected ',' or '{close}'"))),
            }
        }
    }

    fn parse_mapping(&mut self) -> Result<RawValue, RelaxedJsonError> {
        self.expect('{')?;
        let mut map = RawRecord::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(RawValue::Map(map));
            }
            let key = self
                .parse_value()?
                .as_key()
                .ok_or_else(|| self.error("mapping keys must be scalars"))?;
            self.expect(':')?;
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {}
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn parse_string(&mut self, quote: char) -> Result<String, RelaxedJsonError> {
        self.pos += 1;
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                c if c == quote => return Ok(out),
                '\\' => {
                    let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                    self.pos += 1;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        'u' => out.push(self.parse_unicode_escape()?),
                        other => out.push(other),
                    }
                }
                c => out.push(c),
            }
        }
        Err(self.error("unterminated string"))
    }

    fn parse_unicode_escape(&mut self) -> Result<char, RelaxedJsonError> {
        let end = self.pos + 4;
        if end > self.chars.len() {
            return Err(self.error("truncated \\u escape"));
        }
        let hex: String = self.chars[self.pos..end].iter().collect();
        let code = u32::from_str_radix(&hex, 16).map_err(|_| self.error("invalid \\u escape"))?;
        self.pos = end;
        Ok(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn parse_number(&mut self) -> Result<RawValue, RelaxedJsonError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E' | '_'))
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();

        if let Ok(i) = text.parse::<i64>() {
            return Ok(RawValue::Int(i));
        }
        text.parse::<f64>()
            .map(RawValue::Float)
            .map_err(|_| RelaxedJsonError::Syntax {
                offset: start,
                message: format!("invalid number '{text}'"),
            })
    }

    fn parse_keyword(&mut self) -> Result<RawValue, RelaxedJsonError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" | "true" => Ok(RawValue::Bool(true)),
            "False" | "false" => Ok(RawValue::Bool(false)),
            "None" | "null" => Ok(RawValue::Null),
            _ => Err(RelaxedJsonError::Syntax {
                offset: start,
                message: format!("unknown literal '{word}'"),
            }),
        }
    }
}
