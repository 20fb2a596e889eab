//! Incremental JSON event reader.
//!
//! Pulls one event at a time from a `BufRead`, never reading past the bytes
//! needed for that event. Tracks the path of the current value so callers can
//! match positions like `/header/created_at` without building a tree.
//!
//! # DoS Protection
//!
//! - Max nesting depth (`ReadLimits::max_json_depth`)
//! - Max string length in bytes (`ReadLimits::max_string_len`)

use std::io::BufRead;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("syntax error at byte {offset}: {message}")]
    Syntax { offset: u64, message: String },

    #[error("unexpected end of input at byte {offset}")]
    UnexpectedEof { offset: u64 },

    #[error("nesting depth {depth} exceeds maximum {max}")]
    TooDeep { depth: usize, max: usize },

    #[error("string of {length} bytes exceeds maximum {max}")]
    StringTooLong { length: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    Key(String),
    Str(String),
    /// Number, `true`, `false` or `null`, as written.
    Scalar(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seg {
    Key(String),
    Index(usize),
}

impl Seg {
    pub fn is_key(&self, key: &str) -> bool {
        matches!(self, Seg::Key(k) if k == key)
    }
}

/// True if `path` is exactly the object keys `keys`.
pub fn path_is(path: &[Seg], keys: &[&str]) -> bool {
    path.len() == keys.len() && path_starts_with(path, keys)
}

pub fn path_starts_with(path: &[Seg], keys: &[&str]) -> bool {
    path.len() >= keys.len() && path.iter().zip(keys).all(|(s, k)| s.is_key(k))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Value,
    ValueOrEnd,
    KeyOrEnd,
    Key,
    Colon,
    CommaOrEnd,
    Done,
}

pub struct JsonEvents<R> {
    reader: R,
    offset: u64,
    kinds: Vec<Kind>,
    path: Vec<Seg>,
    pending_push: Option<Kind>,
    expect: Expect,
    max_depth: usize,
    max_string: usize,
}

impl<R: BufRead> JsonEvents<R> {
    pub fn new(reader: R, max_depth: usize, max_string: usize) -> Self {
        Self {
            reader,
            offset: 0,
            kinds: Vec::new(),
            path: Vec::new(),
            pending_push: None,
            expect: Expect::Value,
            max_depth,
            max_string,
        }
    }

    /// Path of the value the last event concerns. For `Key` events the key is
    /// the last segment; for `End*` events it is the closed container's path.
    pub fn path(&self) -> &[Seg] {
        &self.path
    }

    pub fn path_is(&self, keys: &[&str]) -> bool {
        path_is(&self.path, keys)
    }

    fn syntax(&self, message: impl Into<String>) -> ScanError {
        ScanError::Syntax {
            offset: self.offset,
            message: message.into(),
        }
    }

    fn peek(&mut self) -> Result<Option<u8>, ScanError> {
        let buf = self.reader.fill_buf()?;
        Ok(buf.first().copied())
    }

    fn bump(&mut self) {
        self.reader.consume(1);
        self.offset += 1;
    }

    fn next_byte(&mut self) -> Result<u8, ScanError> {
        match self.peek()? {
            Some(b) => {
                self.bump();
                Ok(b)
            }
            None => Err(ScanError::UnexpectedEof {
                offset: self.offset,
            }),
        }
    }

    fn skip_whitespace(&mut self) -> Result<Option<u8>, ScanError> {
        loop {
            match self.peek()? {
                Some(b' ' | b'\t' | b'\n' | b'\r') => self.bump(),
                other => return Ok(other),
            }
        }
    }

    fn push(&mut self, kind: Kind) -> Result<(), ScanError> {
        if self.kinds.len() >= self.max_depth {
            return Err(ScanError::TooDeep {
                depth: self.kinds.len() + 1,
                max: self.max_depth,
            });
        }
        self.kinds.push(kind);
        self.path.push(match kind {
            Kind::Object => Seg::Key(String::new()),
            Kind::Array => Seg::Index(0),
        });
        Ok(())
    }

    fn pop(&mut self) {
        self.kinds.pop();
        self.path.pop();
        self.after_value();
    }

    fn after_value(&mut self) {
        self.expect = if self.kinds.is_empty() {
            Expect::Done
        } else {
            Expect::CommaOrEnd
        };
    }

    /// Next event, or `None` once the top-level value is complete.
    pub fn next_event(&mut self) -> Result<Option<Event>, ScanError> {
        if let Some(kind) = self.pending_push.take() {
            self.push(kind)?;
        }
        loop {
            let Some(b) = self.skip_whitespace()? else {
                return if self.expect == Expect::Done {
                    Ok(None)
                } else {
                    Err(ScanError::UnexpectedEof {
                        offset: self.offset,
                    })
                };
            };
            match self.expect {
                Expect::Done => return Ok(None),
                Expect::Colon => {
                    if b != b':' {
                        return Err(self.syntax("expected ':'"));
                    }
                    self.bump();
                    self.expect = Expect::Value;
                }
                Expect::CommaOrEnd => match (b, self.kinds.last().copied()) {
                    (b',', Some(Kind::Object)) => {
                        self.bump();
                        self.expect = Expect::Key;
                    }
                    (b',', Some(Kind::Array)) => {
                        self.bump();
                        if let Some(Seg::Index(i)) = self.path.last_mut() {
                            *i += 1;
                        }
                        self.expect = Expect::Value;
                    }
                    (b'}', Some(Kind::Object)) => {
                        self.bump();
                        self.pop();
                        return Ok(Some(Event::EndObject));
                    }
                    (b']', Some(Kind::Array)) => {
                        self.bump();
                        self.pop();
                        return Ok(Some(Event::EndArray));
                    }
                    _ => return Err(self.syntax("expected ',' or end of container")),
                },
                Expect::KeyOrEnd | Expect::Key => {
                    if b == b'}' && self.expect == Expect::KeyOrEnd {
                        self.bump();
                        self.pop();
                        return Ok(Some(Event::EndObject));
                    }
                    if b != b'"' {
                        return Err(self.syntax("expected object key"));
                    }
                    let key = self.string()?;
                    if let Some(last) = self.path.last_mut() {
                        *last = Seg::Key(key.clone());
                    }
                    self.expect = Expect::Colon;
                    return Ok(Some(Event::Key(key)));
                }
                Expect::ValueOrEnd | Expect::Value => {
                    if b == b']' && self.expect == Expect::ValueOrEnd {
                        self.bump();
                        self.pop();
                        return Ok(Some(Event::EndArray));
                    }
                    return self.value(b).map(Some);
                }
            }
        }
    }

    fn value(&mut self, b: u8) -> Result<Event, ScanError> {
        match b {
            b'{' => {
                self.bump();
                self.pending_push = Some(Kind::Object);
                self.expect = Expect::KeyOrEnd;
                Ok(Event::StartObject)
            }
            b'[' => {
                self.bump();
                self.pending_push = Some(Kind::Array);
                self.expect = Expect::ValueOrEnd;
                Ok(Event::StartArray)
            }
            b'"' => {
                let s = self.string()?;
                self.after_value();
                Ok(Event::Str(s))
            }
            b'-' | b'0'..=b'9' | b't' | b'f' | b'n' => {
                let token = self.scalar()?;
                self.after_value();
                Ok(Event::Scalar(token))
            }
            other => Err(self.syntax(format!("unexpected byte 0x{:02x}", other))),
        }
    }

    fn scalar(&mut self) -> Result<String, ScanError> {
        let mut token = String::new();
        while let Some(b) = self.peek()? {
            if matches!(b, b',' | b'}' | b']' | b' ' | b'\t' | b'\n' | b'\r') {
                break;
            }
            if token.len() >= 64 {
                return Err(self.syntax("scalar token too long"));
            }
            token.push(char::from(b));
            self.bump();
        }
        let valid = match token.as_str() {
            "true" | "false" | "null" => true,
            t => {
                t.bytes()
                    .all(|c| c.is_ascii_digit() || matches!(c, b'-' | b'+' | b'.' | b'e' | b'E'))
                    && t.bytes().any(|c| c.is_ascii_digit())
            }
        };
        if valid {
            Ok(token)
        } else {
            Err(self.syntax(format!("invalid literal '{}'", token)))
        }
    }

    fn hex4(&mut self) -> Result<u32, ScanError> {
        let mut v = 0u32;
        for _ in 0..4 {
            let b = self.next_byte()?;
            let d = char::from(b)
                .to_digit(16)
                .ok_or_else(|| self.syntax("invalid unicode escape"))?;
            v = v * 16 + d;
        }
        Ok(v)
    }

    fn string(&mut self) -> Result<String, ScanError> {
        // Opening quote.
        self.bump();
        let mut out: Vec<u8> = Vec::new();
        loop {
            if out.len() > self.max_string {
                return Err(ScanError::StringTooLong {
                    length: out.len(),
                    max: self.max_string,
                });
            }
            match self.next_byte()? {
                b'"' => break,
                b'\\' => {
                    let decoded = match self.next_byte()? {
                        b'"' => '"',
                        b'\\' => '\\',
                        b'/' => '/',
                        b'b' => '\x08',
                        b'f' => '\x0C',
                        b'n' => '\n',
                        b'r' => '\r',
                        b't' => '\t',
                        b'u' => {
                            let cp = self.hex4()?;
                            let scalar = if (0xD800..=0xDBFF).contains(&cp) {
                                if self.next_byte()? != b'\\' || self.next_byte()? != b'u' {
                                    return Err(self.syntax("lone high surrogate"));
                                }
                                let low = self.hex4()?;
                                if !(0xDC00..=0xDFFF).contains(&low) {
                                    return Err(self.syntax("invalid low surrogate"));
                                }
                                0x10000 + ((cp - 0xD800) << 10) + (low - 0xDC00)
                            } else {
                                cp
                            };
                            char::from_u32(scalar)
                                .ok_or_else(|| self.syntax("invalid unicode scalar"))?
                        }
                        other => {
                            return Err(self.syntax(format!(
                                "invalid escape '\\{}'",
                                char::from(other)
                            )))
                        }
                    };
                    let mut tmp = [0u8; 4];
                    out.extend_from_slice(decoded.encode_utf8(&mut tmp).as_bytes());
                }
                b if b < 0x20 => return Err(self.syntax("control character in string")),
                b => out.push(b),
            }
        }
        String::from_utf8(out).map_err(|_| self.syntax("invalid UTF-8 in string"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn events(input: &str) -> Result<Vec<Event>, ScanError> {
        let mut scanner = JsonEvents::new(Cursor::new(input.as_bytes()), 64, 1024);
        let mut out = Vec::new();
        while let Some(e) = scanner.next_event()? {
            out.push(e);
        }
        Ok(out)
    }

    #[test]
    fn emits_events_in_order() {
        let got = events(r#"{"a": [1, "xA"], "b": {}, "c": null}"#).unwrap();
        assert_eq!(
            got,
            vec![
                Event::StartObject,
                Event::Key("a".into()),
                Event::StartArray,
                Event::Scalar("1".into()),
                Event::Str("xA".into()),
                Event::EndArray,
                Event::Key("b".into()),
                Event::StartObject,
                Event::EndObject,
                Event::Key("c".into()),
                Event::Scalar("null".into()),
                Event::EndObject,
            ]
        );
    }

    #[test]
    fn tracks_value_paths() {
        let input = r#"{"header": {"created_at": "2024-01-01T00:00:00Z"}, "list": [{"k": "v"}]}"#;
        let mut scanner = JsonEvents::new(Cursor::new(input.as_bytes()), 64, 1024);
        let mut seen_date = false;
        let mut seen_k = false;
        while let Some(e) = scanner.next_event().unwrap() {
            if let Event::Str(s) = &e {
                if scanner.path_is(&["header", "created_at"]) {
                    assert_eq!(s, "2024-01-01T00:00:00Z");
                    seen_date = true;
                }
                if scanner.path().len() == 3 && scanner.path()[1] == Seg::Index(0) {
                    seen_k = true;
                }
            }
        }
        assert!(seen_date && seen_k);
    }

    #[test]
    fn stops_without_reading_the_rest() {
        let input = br#"{"profile": "AIP-1.0", "rest": garbage that is never parsed"#;
        let mut cursor = Cursor::new(&input[..]);
        let mut scanner = JsonEvents::new(&mut cursor, 64, 1024);
        assert_eq!(scanner.next_event().unwrap(), Some(Event::StartObject));
        assert_eq!(scanner.next_event().unwrap(), Some(Event::Key("profile".into())));
        assert_eq!(scanner.next_event().unwrap(), Some(Event::Str("AIP-1.0".into())));
        drop(scanner);
        assert!(cursor.position() < input.len() as u64);
    }

    #[test]
    fn rejects_malformed_and_deep_input() {
        assert!(matches!(events(r#"{"a" 1}"#), Err(ScanError::Syntax { .. })));
        assert!(matches!(events(r#"{"a": tru}"#), Err(ScanError::Syntax { .. })));
        assert!(matches!(events(r#"{"a": "#), Err(ScanError::UnexpectedEof { .. })));
        let deep = "[".repeat(65) + &"]".repeat(65);
        assert!(matches!(events(&deep), Err(ScanError::TooDeep { .. })));
    }

    #[test]
    fn decodes_surrogate_pairs() {
        assert_eq!(
            events(r#"["\ud83d\ude00"]"#).unwrap()[1],
            Event::Str("\u{1F600}".into())
        );
    }
}
