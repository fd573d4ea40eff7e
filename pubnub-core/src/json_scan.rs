//! Minimal, private, bounded JSON scanner.
//!
//! §4.6/§9 explicitly rule out pulling a general JSON object model into
//! the core ("implement a small scanner that recognizes top-level
//! arrays/objects and the specific key set per endpoint"). This module
//! is that scanner: just enough recursive descent to walk the handful
//! of stereotyped envelope shapes the service sends, never exposed
//! outside `parser.rs`, and never used to build a user-facing value
//! type (message payloads stay raw `&str`/`String` per §4.6).

#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    Null,
    Bool(bool),
    /// Kept as the raw numeric literal text — avoids float-precision
    /// loss on 17-digit timetokens.
    Number(&'a str),
    String(String),
    Array(Vec<Value<'a>>),
    Object(Vec<(String, Value<'a>)>),
}

impl<'a> Value<'a> {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value<'a>]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value<'a>> {
        match self {
            Value::Object(fields) => fields.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn index(&self, i: usize) -> Option<&Value<'a>> {
        self.as_array().and_then(|items| items.get(i))
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Number(n) => n.parse().ok(),
            _ => None,
        }
    }

    /// Re-serialize to compact JSON text. Used only to hand a message
    /// payload/metadata sub-value back to the caller untouched — the
    /// core never interprets what is inside (§4.6: "not decoded").
    pub fn to_json(&self) -> String {
        let mut out = String::new();
        self.write_json(&mut out);
        out
    }

    fn write_json(&self, out: &mut String) {
        match self {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Number(n) => out.push_str(n),
            Value::String(s) => {
                out.push('"');
                for c in s.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        '\t' => out.push_str("\\t"),
                        '\r' => out.push_str("\\r"),
                        c => out.push(c),
                    }
                }
                out.push('"');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_json(out);
                }
                out.push(']');
            }
            Value::Object(fields) => {
                out.push('{');
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    Value::String(key.clone()).write_json(out);
                    out.push(':');
                    value.write_json(out);
                }
                out.push('}');
            }
        }
    }
}

/// Parse errors are collapsed to a single unit error by `parser.rs`
/// (the `format-error` class); no diagnostic detail is needed beyond
/// "this wasn't well-formed JSON".
#[derive(Debug)]
pub struct ScanError;

pub fn parse(input: &str) -> Result<Value<'_>, ScanError> {
    let mut scanner = Scanner {
        bytes: input.as_bytes(),
        pos: 0,
    };
    scanner.skip_ws();
    let value = scanner.parse_value()?;
    scanner.skip_ws();
    Ok(value)
}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, b: u8) -> Result<(), ScanError> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            Err(ScanError)
        }
    }

    fn parse_value(&mut self) -> Result<Value<'a>, ScanError> {
        self.skip_ws();
        match self.peek().ok_or(ScanError)? {
            b'{' => self.parse_object(),
            b'[' => self.parse_array(),
            b'"' => Ok(Value::String(self.parse_string()?)),
            b't' => self.parse_literal("true", Value::Bool(true)),
            b'f' => self.parse_literal("false", Value::Bool(false)),
            b'n' => self.parse_literal("null", Value::Null),
            b'-' | b'0'..=b'9' => self.parse_number(),
            _ => Err(ScanError),
        }
    }

    fn parse_literal(&mut self, text: &str, value: Value<'a>) -> Result<Value<'a>, ScanError> {
        let end = self.pos + text.len();
        if self.bytes.get(self.pos..end) == Some(text.as_bytes()) {
            self.pos = end;
            Ok(value)
        } else {
            Err(ScanError)
        }
    }

    fn parse_number(&mut self) -> Result<Value<'a>, ScanError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-')) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(ScanError);
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).map_err(|_| ScanError)?;
        Ok(Value::Number(text))
    }

    fn parse_string(&mut self) -> Result<String, ScanError> {
        self.expect(b'"')?;
        let mut out = String::new();
        loop {
            let b = self.peek().ok_or(ScanError)?;
            self.pos += 1;
            match b {
                b'"' => break,
                b'\\' => {
                    let esc = self.peek().ok_or(ScanError)?;
                    self.pos += 1;
                    match esc {
                        b'"' => out.push('"'),
                        b'\\' => out.push('\\'),
                        b'/' => out.push('/'),
                        b'n' => out.push('\n'),
                        b't' => out.push('\t'),
                        b'r' => out.push('\r'),
                        b'b' => out.push('\u{8}'),
                        b'f' => out.push('\u{c}'),
                        b'u' => {
                            let hex = self
                                .bytes
                                .get(self.pos..self.pos + 4)
                                .ok_or(ScanError)?;
                            let hex = std::str::from_utf8(hex).map_err(|_| ScanError)?;
                            let code = u32::from_str_radix(hex, 16).map_err(|_| ScanError)?;
                            out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                            self.pos += 4;
                        }
                        _ => return Err(ScanError),
                    }
                }
                _ => {
                    // Re-walk as UTF-8 rather than byte-at-a-time for
                    // multi-byte sequences.
                    let start = self.pos - 1;
                    let mut end = self.pos;
                    while end < self.bytes.len() && self.bytes[end] & 0xC0 == 0x80 {
                        end += 1;
                    }
                    let chunk = std::str::from_utf8(&self.bytes[start..end]).map_err(|_| ScanError)?;
                    out.push_str(chunk);
                    self.pos = end;
                }
            }
        }
        Ok(out)
    }

    fn parse_array(&mut self) -> Result<Value<'a>, ScanError> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Value::Array(items));
        }
        loop {
            items.push(self.parse_value()?);
            self.skip_ws();
            match self.peek().ok_or(ScanError)? {
                b',' => {
                    self.pos += 1;
                }
                b']' => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(ScanError),
            }
        }
        Ok(Value::Array(items))
    }

    fn parse_object(&mut self) -> Result<Value<'a>, ScanError> {
        self.expect(b'{')?;
        let mut fields = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Value::Object(fields));
        }
        loop {
            self.skip_ws();
            let key = self.parse_string()?;
            self.skip_ws();
            self.expect(b':')?;
            let value = self.parse_value()?;
            fields.push((key, value));
            self.skip_ws();
            match self.peek().ok_or(ScanError)? {
                b',' => {
                    self.pos += 1;
                }
                b'}' => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(ScanError),
            }
        }
        Ok(Value::Object(fields))
    }
}
