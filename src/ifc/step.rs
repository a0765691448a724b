//! ISO 10303-21 (STEP physical file) reader.
//!
//! Parses the clear-text encoding used by IFC files into header records and data
//! instances. Only the syntax is handled here; schema knowledge lives in
//! [`super::schema`].

use std::fmt;

use crate::{Error, Result};

/// A single attribute value of a STEP instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `$`: attribute not set.
    Null,
    /// `*`: value derived by the schema.
    Derived,
    /// Integer literal.
    Integer(i64),
    /// Real literal.
    Real(f64),
    /// Decoded string literal.
    String(String),
    /// Enumeration literal, without the surrounding dots (`.WALL.` becomes `WALL`).
    Enum(String),
    /// Instance reference (`#42`).
    Ref(u64),
    /// Binary literal, kept as its hex digits.
    Binary(String),
    /// Aggregate (`(a,b,c)`).
    List(Vec<Self>),
    /// Typed parameter such as `IFCLABEL('x')`.
    Typed(String, Box<Self>),
}

impl Value {
    /// Returns the referenced instance id.
    #[must_use]
    pub const fn as_ref_id(&self) -> Option<u64> {
        match self {
            Self::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the string content, looking through a typed wrapper.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Typed(_, inner) => inner.as_str(),
            _ => None,
        }
    }

    /// Returns the enumeration literal.
    #[must_use]
    pub fn as_enum(&self) -> Option<&str> {
        match self {
            Self::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the aggregate members.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns true for `$` and `*`.
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        matches!(self, Self::Null | Self::Derived)
    }

    /// Collects every instance reference in this value, including list members.
    #[must_use]
    pub fn refs(&self) -> Vec<u64> {
        match self {
            Self::Ref(id) => vec![*id],
            Self::List(items) => items.iter().flat_map(Self::refs).collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("$"),
            Self::Derived => f.write_str("*"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::String(s) => write!(f, "'{s}'"),
            Self::Enum(e) => write!(f, ".{e}."),
            Self::Ref(id) => write!(f, "#{id}"),
            Self::Binary(b) => write!(f, "\"{b}\""),
            Self::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            },
            Self::Typed(name, inner) => write!(f, "{name}({inner})"),
        }
    }
}

/// A header record such as `FILE_SCHEMA(('IFC4'))`.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderRecord {
    /// Upper-case keyword.
    pub keyword: String,
    /// Parameters.
    pub params: Vec<Value>,
}

/// A data section instance (`#id=KEYWORD(...)`).
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    /// Instance name (the number after `#`).
    pub id: u64,
    /// Upper-case entity keyword. Empty for complex instances.
    pub keyword: String,
    /// Attribute values in schema order.
    pub attributes: Vec<Value>,
}

/// A parsed STEP file.
#[derive(Debug, Clone, Default)]
pub struct StepFile {
    /// Header section records.
    pub header: Vec<HeaderRecord>,
    /// Data section instances in file order.
    pub instances: Vec<Instance>,
}

impl StepFile {
    /// Returns the first schema identifier named in `FILE_SCHEMA`.
    #[must_use]
    pub fn schema_identifier(&self) -> Option<&str> {
        self.header
            .iter()
            .find(|record| record.keyword == "FILE_SCHEMA")
            .and_then(|record| record.params.first())
            .and_then(Value::as_list)
            .and_then(|schemas| schemas.first())
            .and_then(Value::as_str)
    }
}

const MAGIC: &str = "ISO-10303-21;";
const TRAILER: &str = "END-ISO-10303-21;";

/// Parses STEP physical file content.
///
/// # Errors
///
/// Returns [`Error::InvalidModelFile`] on any syntax error.
pub fn parse(input: &str) -> Result<StepFile> {
    let mut parser = Parser::new(input);
    parser.skip_ws()?;
    if !parser.eat_str(MAGIC) {
        return Err(parser.error("missing ISO-10303-21 header"));
    }

    let mut file = StepFile::default();

    parser.skip_ws()?;
    parser.expect_section("HEADER")?;
    loop {
        parser.skip_ws()?;
        if parser.eat_str("ENDSEC;") {
            break;
        }
        let keyword = parser.keyword()?;
        parser.skip_ws()?;
        let params = parser.list()?;
        parser.skip_ws()?;
        parser.expect(b';')?;
        file.header.push(HeaderRecord { keyword, params });
    }

    let mut saw_data = false;
    loop {
        parser.skip_ws()?;
        if parser.eat_str(TRAILER) {
            break;
        }
        if !parser.eat_str("DATA") {
            return Err(parser.error("expected DATA section or end of file"));
        }
        parser.skip_ws()?;
        // Edition 3 allows DATA('name',(...)); the parameters carry nothing we use.
        if parser.peek() == Some(b'(') {
            parser.list()?;
            parser.skip_ws()?;
        }
        parser.expect(b';')?;
        saw_data = true;
        parser.data_section(&mut file.instances)?;
    }

    if !saw_data {
        return Err(parser.error("file has no DATA section"));
    }
    Ok(file)
}

/// Deepest parameter list nesting accepted; real files stay in single digits.
const MAX_NESTING: usize = 256;

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        let src = input.as_bytes();
        let pos = if src.starts_with(&[0xEF, 0xBB, 0xBF]) {
            3
        } else {
            0
        };
        Self { src, pos, depth: 0 }
    }

    fn error(&self, message: &str) -> Error {
        let line = self.src[..self.pos.min(self.src.len())]
            .iter()
            .filter(|b| **b == b'\n')
            .count()
            + 1;
        Error::InvalidModelFile(format!("{message} (line {line})"))
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.src[self.pos..].starts_with(s.as_bytes()) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, b: u8) -> Result<()> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", b as char)))
        }
    }

    fn expect_section(&mut self, name: &str) -> Result<()> {
        if !self.eat_str(name) {
            return Err(self.error(&format!("expected {name} section")));
        }
        self.skip_ws()?;
        self.expect(b';')
    }

    fn skip_ws(&mut self) -> Result<()> {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'/') if self.src.get(self.pos + 1) == Some(&b'*') => {
                    let rest = &self.src[self.pos + 2..];
                    let end = rest
                        .windows(2)
                        .position(|w| w == b"*/")
                        .ok_or_else(|| self.error("unterminated comment"))?;
                    self.pos += end + 4;
                },
                _ => return Ok(()),
            }
        }
    }

    fn data_section(&mut self, out: &mut Vec<Instance>) -> Result<()> {
        loop {
            self.skip_ws()?;
            if self.eat_str("ENDSEC;") {
                return Ok(());
            }
            self.expect(b'#')?;
            let id = self.digits()?;
            self.skip_ws()?;
            self.expect(b'=')?;
            self.skip_ws()?;
            let instance = if self.peek() == Some(b'(') {
                self.complex_instance(id)?
            } else {
                let keyword = self.keyword()?;
                self.skip_ws()?;
                let attributes = self.list()?;
                Instance {
                    id,
                    keyword,
                    attributes,
                }
            };
            self.skip_ws()?;
            self.expect(b';')?;
            out.push(instance);
        }
    }

    /// `#1=(IFCA(...)IFCB(...))`: kept with an empty keyword so class queries skip it.
    fn complex_instance(&mut self, id: u64) -> Result<Instance> {
        self.expect(b'(')?;
        let mut attributes = Vec::new();
        loop {
            self.skip_ws()?;
            if self.peek() == Some(b')') {
                self.pos += 1;
                break;
            }
            let keyword = self.keyword()?;
            self.skip_ws()?;
            let params = self.list()?;
            attributes.push(Value::Typed(keyword, Box::new(Value::List(params))));
        }
        Ok(Instance {
            id,
            keyword: String::new(),
            attributes,
        })
    }

    fn digits(&mut self) -> Result<u64> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.src[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error("expected instance number"))
    }

    fn keyword(&mut self) -> Result<String> {
        let start = self.pos;
        if self.peek() == Some(b'!') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected keyword"));
        }
        Ok(String::from_utf8_lossy(&self.src[start..self.pos]).to_ascii_uppercase())
    }

    fn list(&mut self) -> Result<Vec<Value>> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("parameter lists nested too deeply"));
        }
        self.depth += 1;
        let items = self.list_items();
        self.depth -= 1;
        items
    }

    fn list_items(&mut self) -> Result<Vec<Value>> {
        self.expect(b'(')?;
        let mut items = Vec::new();
        self.skip_ws()?;
        if self.peek() == Some(b')') {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            self.skip_ws()?;
            items.push(self.value()?);
            self.skip_ws()?;
            match self.bump() {
                Some(b',') => {},
                Some(b')') => return Ok(items),
                _ => return Err(self.error("expected ',' or ')' in parameter list")),
            }
        }
    }

    fn value(&mut self) -> Result<Value> {
        match self.peek() {
            Some(b'$') => {
                self.pos += 1;
                Ok(Value::Null)
            },
            Some(b'*') => {
                self.pos += 1;
                Ok(Value::Derived)
            },
            Some(b'#') => {
                self.pos += 1;
                Ok(Value::Ref(self.digits()?))
            },
            Some(b'\'') => self.string(),
            Some(b'"') => self.binary(),
            Some(b'.') => self.enumeration(),
            Some(b'(') => Ok(Value::List(self.list()?)),
            Some(b) if b == b'-' || b == b'+' || b.is_ascii_digit() => self.number(),
            Some(b) if b.is_ascii_alphabetic() => {
                let keyword = self.keyword()?;
                self.skip_ws()?;
                let mut params = self.list()?;
                let inner = if params.len() == 1 {
                    params.remove(0)
                } else {
                    Value::List(params)
                };
                Ok(Value::Typed(keyword, Box::new(inner)))
            },
            _ => Err(self.error("unexpected character in parameter")),
        }
    }

    fn number(&mut self) -> Result<Value> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'-' | b'+')) {
            self.pos += 1;
        }
        let mut is_real = false;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' => self.pos += 1,
                b'.' => {
                    is_real = true;
                    self.pos += 1;
                },
                b'E' | b'e' => {
                    is_real = true;
                    self.pos += 1;
                    if matches!(self.peek(), Some(b'-' | b'+')) {
                        self.pos += 1;
                    }
                },
                _ => break,
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|_| self.error("invalid number"))?;
        if is_real {
            // STEP allows "1." and "1.E3", which Rust's parser rejects without a digit.
            let normalized = text.replace(".E", ".0E").replace(".e", ".0e");
            let normalized = normalized.strip_suffix('.').map_or(normalized.clone(), |s| {
                format!("{s}.0")
            });
            normalized
                .parse::<f64>()
                .map(Value::Real)
                .map_err(|_| self.error(&format!("invalid real '{text}'")))
        } else {
            text.parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| self.error(&format!("invalid integer '{text}'")))
        }
    }

    fn enumeration(&mut self) -> Result<Value> {
        self.expect(b'.')?;
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        let name = String::from_utf8_lossy(&self.src[start..self.pos]).to_ascii_uppercase();
        self.expect(b'.')?;
        Ok(Value::Enum(name))
    }

    fn binary(&mut self) -> Result<Value> {
        self.expect(b'"')?;
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b != b'"') {
            self.pos += 1;
        }
        let digits = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        self.expect(b'"')?;
        Ok(Value::Binary(digits))
    }

    fn string(&mut self) -> Result<Value> {
        self.expect(b'\'')?;
        let mut raw = Vec::new();
        loop {
            match self.bump() {
                Some(b'\'') => {
                    if self.peek() == Some(b'\'') {
                        self.pos += 1;
                        raw.push(b'\'');
                    } else {
                        break;
                    }
                },
                Some(b) => raw.push(b),
                None => return Err(self.error("unterminated string")),
            }
        }
        let raw = String::from_utf8_lossy(&raw);
        decode_string(&raw)
            .map(Value::String)
            .ok_or_else(|| self.error("invalid string escape"))
    }
}

/// Decodes the control directives of a STEP string literal.
///
/// Handles `\X2\…\X0\` (UTF-16), `\X4\…\X0\` (UTF-32), `\X\hh` (ISO 8859-1),
/// `\S\c` (upper half of the active code page, treated as 8859-1), `\P?\`
/// (code page switch, ignored) and `\\`. Returns `None` on a malformed directive.
#[must_use]
pub fn decode_string(raw: &str) -> Option<String> {
    if !raw.contains('\\') {
        return Some(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(idx) = rest.find('\\') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];
        if let Some(tail) = rest.strip_prefix("\\\\") {
            out.push('\\');
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("\\X2\\") {
            let end = tail.find("\\X0\\")?;
            let hex = &tail[..end];
            if !hex.is_ascii() || hex.len() % 4 != 0 {
                return None;
            }
            let units = (0..hex.len())
                .step_by(4)
                .map(|i| u16::from_str_radix(&hex[i..i + 4], 16).ok())
                .collect::<Option<Vec<_>>>()?;
            out.push_str(&String::from_utf16(&units).ok()?);
            rest = &tail[end + 4..];
        } else if let Some(tail) = rest.strip_prefix("\\X4\\") {
            let end = tail.find("\\X0\\")?;
            let hex = &tail[..end];
            if !hex.is_ascii() || hex.len() % 8 != 0 {
                return None;
            }
            for i in (0..hex.len()).step_by(8) {
                let code = u32::from_str_radix(&hex[i..i + 8], 16).ok()?;
                out.push(char::from_u32(code)?);
            }
            rest = &tail[end + 4..];
        } else if let Some(tail) = rest.strip_prefix("\\X\\") {
            let code = u8::from_str_radix(tail.get(..2)?, 16).ok()?;
            out.push(char::from(code));
            rest = &tail[2..];
        } else if let Some(tail) = rest.strip_prefix("\\S\\") {
            let c = tail.chars().next()?;
            let code = u8::try_from(u32::from(c)).ok()?;
            out.push(char::from(code.checked_add(128)?));
            rest = &tail[c.len_utf8()..];
        } else if rest.starts_with("\\P") && rest.get(3..4) == Some("\\") {
            rest = &rest[4..];
        } else {
            out.push('\\');
            rest = &rest[1..];
        }
    }
    out.push_str(rest);
    Some(out)
}
