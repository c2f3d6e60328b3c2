//! Literal grammar - Permissive fallback for model output that is not JSON
//!
//! Accepts data literals only:
//! - mappings `{...}`, sequences `[...]` and tuples `(...)`
//! - single, double and triple quoted strings, `r`/`u` prefixes, adjacent concatenation
//! - integers (decimal, hex, octal, binary, `_` separators), floats, unary `+`/`-`
//! - `True`/`False`/`None` and `true`/`false`/`null`
//! - trailing commas and `#` comments
//!
//! Names, calls, operators and every other expression form are rejected, so nothing
//! in the model output is ever evaluated.

use serde_json::{Map, Number, Value};
use thiserror::Error;

use super::value_type_name;

/// Deepest nesting of mappings/sequences accepted
pub const MAX_NESTING: usize = 128;

/// Literal parse failure with its position in the input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (line {line}, column {column})")]
pub struct LiteralError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl LiteralError {
    fn at(input: &str, offset: usize, message: impl Into<String>) -> Self {
        let before = &input[..offset.min(input.len())];
        let line = before.matches('\n').count() + 1;
        let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;

        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Parse a data literal into an untyped value
pub fn parse_literal(input: &str) -> Result<Value, LiteralError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
    };

    let value = parser.parse_value(0)?;
    if !matches!(parser.current(), Token::Eof) {
        return Err(parser.error("unexpected content after literal"));
    }

    Ok(value)
}

/// Token type
#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// String literal, escapes resolved
    Str(String),
    /// Unsigned integer magnitude
    Integer(u64),
    /// Float literal
    Float(f64),
    /// Bare word
    Ident(String),
    /// Punctuation
    Punct(char),
    /// End of input
    Eof,
}

struct Lexer<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).map(|&(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map_or(self.input.len(), |&(offset, _)| offset)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> LiteralError {
        LiteralError::at(self.input, offset, message)
    }

    fn tokenize(mut self) -> Result<Vec<(Token, usize)>, LiteralError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_trivia();
            let start = self.offset();

            let Some(c) = self.peek() else {
                tokens.push((Token::Eof, start));
                return Ok(tokens);
            };

            let token = match c {
                '{' | '}' | '[' | ']' | '(' | ')' | ':' | ',' | '+' | '-' => {
                    self.bump();
                    Token::Punct(c)
                }
                '\'' | '"' => self.string(false)?,
                '0'..='9' => self.number()?,
                '.' if self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => self.number()?,
                'r' | 'R' | 'u' | 'U' if matches!(self.peek_at(1), Some('\'' | '"')) => {
                    self.bump();
                    self.string(matches!(c, 'r' | 'R'))?
                }
                c if c.is_alphabetic() || c == '_' => self.ident(),
                other => {
                    return Err(self.error(start, format!("unexpected character '{}'", other)));
                }
            };

            tokens.push((token, start));
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c == '#' {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.bump();
                }
            } else if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn ident(&mut self) -> Token {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        Token::Ident(name)
    }

    fn string(&mut self, raw: bool) -> Result<Token, LiteralError> {
        let start = self.offset();
        let Some(quote) = self.bump() else {
            return Err(self.error(start, "unterminated string literal"));
        };

        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }

        let mut value = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error(start, "unterminated string literal"));
            };

            match c {
                c if c == quote => {
                    if !triple {
                        break;
                    }
                    if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                        self.bump();
                        self.bump();
                        break;
                    }
                    value.push(c);
                }
                '\n' if !triple => {
                    return Err(self.error(start, "unterminated string literal"));
                }
                '\\' if raw => {
                    // An escaped quote still does not close a raw string
                    value.push('\\');
                    if let Some(next) = self.bump() {
                        value.push(next);
                    }
                }
                '\\' => self.escape(&mut value)?,
                c => value.push(c),
            }
        }

        Ok(Token::Str(value))
    }

    fn escape(&mut self, out: &mut String) -> Result<(), LiteralError> {
        let offset = self.offset();
        let Some(c) = self.bump() else {
            return Err(self.error(offset, "unterminated string literal"));
        };

        match c {
            // Line continuation
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            'a' => out.push('\u{7}'),
            '0'..='7' => {
                let mut code = c.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek().and_then(|d| d.to_digit(8)) {
                        Some(digit) => {
                            code = code * 8 + digit;
                            self.bump();
                        }
                        None => break,
                    }
                }
                out.push(self.code_point(offset, code)?);
            }
            'x' => {
                let code = self.hex_digits(offset, 2)?;
                out.push(self.code_point(offset, code)?);
            }
            'u' => {
                let code = self.hex_digits(offset, 4)?;
                out.push(self.code_point(offset, code)?);
            }
            'U' => {
                let code = self.hex_digits(offset, 8)?;
                out.push(self.code_point(offset, code)?);
            }
            // Unknown escapes keep the backslash
            other => {
                out.push('\\');
                out.push(other);
            }
        }

        Ok(())
    }

    fn hex_digits(&mut self, offset: usize, count: usize) -> Result<u32, LiteralError> {
        let mut code = 0u32;
        for _ in 0..count {
            let digit = self
                .peek()
                .and_then(|d| d.to_digit(16))
                .ok_or_else(|| self.error(offset, "truncated escape sequence"))?;
            code = code * 16 + digit;
            self.bump();
        }
        Ok(code)
    }

    fn code_point(&self, offset: usize, code: u32) -> Result<char, LiteralError> {
        char::from_u32(code)
            .ok_or_else(|| self.error(offset, format!("invalid code point {:#x} in escape sequence", code)))
    }

    fn number(&mut self) -> Result<Token, LiteralError> {
        let start = self.offset();
        let mut text = String::new();

        let radix = match (self.peek(), self.peek_at(1)) {
            (Some('0'), Some('x' | 'X')) => 16,
            (Some('0'), Some('o' | 'O')) => 8,
            (Some('0'), Some('b' | 'B')) => 2,
            _ => 10,
        };

        if radix != 10 {
            self.bump();
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_digit(radix) {
                    text.push(c);
                } else if c != '_' {
                    break;
                }
                self.bump();
            }
            self.reject_suffix(start)?;
            if text.is_empty() {
                return Err(self.error(start, "invalid numeric literal"));
            }
            return u64::from_str_radix(&text, radix)
                .map(Token::Integer)
                .map_err(|_| self.error(start, "integer literal out of range"));
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => text.push(c),
                '_' => {}
                '.' if !is_float => {
                    is_float = true;
                    text.push(c);
                }
                'e' | 'E' => {
                    is_float = true;
                    text.push(c);
                    self.bump();
                    if let Some(sign @ ('+' | '-')) = self.peek() {
                        text.push(sign);
                        self.bump();
                    }
                    continue;
                }
                _ => break,
            }
            self.bump();
        }
        self.reject_suffix(start)?;

        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| self.error(start, "invalid numeric literal"))?;
            if !value.is_finite() {
                return Err(self.error(start, "float literal out of range"));
            }
            Ok(Token::Float(value))
        } else {
            text.parse()
                .map(Token::Integer)
                .map_err(|_| self.error(start, "integer literal out of range"))
        }
    }

    /// Numbers may not run straight into letters (`5j`, `0x1g`, `12abc`)
    fn reject_suffix(&self, start: usize) -> Result<(), LiteralError> {
        if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            return Err(self.error(start, "invalid numeric literal"));
        }
        Ok(())
    }
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser<'_> {
    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].0
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].1
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError::at(self.input, self.offset(), message)
    }

    fn eat(&mut self, punct: char) -> bool {
        if *self.current() == Token::Punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: char) -> Result<(), LiteralError> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", punct)))
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<Value, LiteralError> {
        if depth > MAX_NESTING {
            return Err(self.error(format!("nesting exceeds {} levels", MAX_NESTING)));
        }

        match self.current().clone() {
            Token::Punct('{') => {
                self.advance();
                self.parse_mapping(depth)
            }
            Token::Punct('[') => {
                self.advance();
                let mut items = Vec::new();
                self.parse_items(&mut items, ']', depth)?;
                Ok(Value::Array(items))
            }
            Token::Punct('(') => {
                self.advance();
                self.parse_parenthesized(depth)
            }
            Token::Punct('+' | '-') => self.parse_signed(),
            Token::Str(first) => {
                self.advance();
                let mut text = first;
                while let Token::Str(next) = self.current() {
                    text.push_str(next);
                    self.advance();
                }
                Ok(Value::String(text))
            }
            Token::Integer(magnitude) => {
                let offset = self.offset();
                self.advance();
                integer_value(magnitude, false)
                    .ok_or_else(|| LiteralError::at(self.input, offset, "integer literal out of range"))
            }
            Token::Float(value) => {
                self.advance();
                Ok(float_value(value))
            }
            Token::Ident(name) => {
                let value = match name.as_str() {
                    "True" | "true" => Value::Bool(true),
                    "False" | "false" => Value::Bool(false),
                    "None" | "null" => Value::Null,
                    other => {
                        return Err(self.error(format!("names are not allowed in literals: '{}'", other)));
                    }
                };
                self.advance();
                Ok(value)
            }
            Token::Punct(c) => Err(self.error(format!("unexpected '{}'", c))),
            Token::Eof => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_mapping(&mut self, depth: usize) -> Result<Value, LiteralError> {
        let mut map = Map::new();

        loop {
            if self.eat('}') {
                return Ok(Value::Object(map));
            }

            let key_offset = self.offset();
            let key = self.parse_value(depth + 1)?;
            if matches!(self.current(), Token::Punct(',' | '}')) {
                return Err(self.error("set literals are not supported"));
            }
            let Value::String(key) = key else {
                return Err(LiteralError::at(
                    self.input,
                    key_offset,
                    format!("mapping keys must be strings, found {}", value_type_name(&key)),
                ));
            };

            self.expect(':')?;
            let value = self.parse_value(depth + 1)?;
            map.insert(key, value);

            if self.eat('}') {
                return Ok(Value::Object(map));
            }
            self.expect(',')?;
        }
    }

    /// Comma separated values up to `close`, trailing comma allowed
    fn parse_items(&mut self, items: &mut Vec<Value>, close: char, depth: usize) -> Result<(), LiteralError> {
        loop {
            if self.eat(close) {
                return Ok(());
            }
            items.push(self.parse_value(depth + 1)?);
            if self.eat(close) {
                return Ok(());
            }
            self.expect(',')?;
        }
    }

    /// `()` and `(a, b)` are tuples, `(a)` is just `a`
    fn parse_parenthesized(&mut self, depth: usize) -> Result<Value, LiteralError> {
        if self.eat(')') {
            return Ok(Value::Array(Vec::new()));
        }

        let first = self.parse_value(depth + 1)?;
        if self.eat(')') {
            return Ok(first);
        }
        self.expect(',')?;

        let mut items = vec![first];
        self.parse_items(&mut items, ')', depth)?;
        Ok(Value::Array(items))
    }

    fn parse_signed(&mut self) -> Result<Value, LiteralError> {
        let mut negative = false;
        loop {
            match self.current() {
                Token::Punct('-') => negative = !negative,
                Token::Punct('+') => {}
                _ => break,
            }
            self.advance();
        }

        let offset = self.offset();
        match *self.current() {
            Token::Integer(magnitude) => {
                self.advance();
                integer_value(magnitude, negative)
                    .ok_or_else(|| LiteralError::at(self.input, offset, "integer literal out of range"))
            }
            Token::Float(value) => {
                self.advance();
                Ok(float_value(if negative { -value } else { value }))
            }
            _ => Err(self.error("unary operators apply only to numbers")),
        }
    }
}

fn integer_value(magnitude: u64, negative: bool) -> Option<Value> {
    if !negative {
        return Some(Value::from(magnitude));
    }
    match i64::try_from(magnitude) {
        Ok(m) => Some(Value::from(-m)),
        Err(_) if magnitude == i64::MIN.unsigned_abs() => Some(Value::from(i64::MIN)),
        Err(_) => None,
    }
}

fn float_value(value: f64) -> Value {
    // Finite by construction, see Lexer::number
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}
