//! The value vocabulary of the wire protocol
//!
//! Every argument and result on the wire is a [`WireValue`]: a small tagged
//! variant covering scalars, strings, lists, and object literals. Object
//! literals are carried as an [`ObjectSpec`], the parsed representation of
//! `TypeName(field = value; ...)`, and only become live objects once a
//! factory from the catalog instantiates them.

use std::fmt;
use std::io::{self, Cursor};

use crate::error::{WireError, WireResult};
use crate::wire::{WireStream, shared_writer};

/// A single value travelling over the wire
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// Absence of a value
    Null,
    /// Boolean, `true` or `false`
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Double-precision float
    Real(f64),
    /// UTF-8 string
    Str(String),
    /// Ordered list of values
    List(Vec<WireValue>),
    /// Object literal (not yet instantiated)
    Object(ObjectSpec),
}

/// Parsed wire representation of an object: a type tag plus named fields
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSpec {
    /// Registered type tag naming the factory to use
    pub type_tag: String,
    /// Field assignments in wire order
    pub fields: Vec<(String, WireValue)>,
}

impl ObjectSpec {
    /// Create an empty spec for the given type tag
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            fields: Vec::new(),
        }
    }

    /// Builder-style field assignment
    pub fn with_field(mut self, name: impl Into<String>, value: WireValue) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    /// Look up a field by name (last assignment wins)
    pub fn field(&self, name: &str) -> Option<&WireValue> {
        self.fields
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

impl WireValue {
    /// Short label for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            WireValue::Null => "null",
            WireValue::Bool(_) => "bool",
            WireValue::Int(_) => "int",
            WireValue::Real(_) => "real",
            WireValue::Str(_) => "string",
            WireValue::List(_) => "list",
            WireValue::Object(_) => "object",
        }
    }

    /// Interpret as a signed integer
    pub fn as_int(&self) -> WireResult<i64> {
        match self {
            WireValue::Int(n) => Ok(*n),
            other => Err(WireError::TypeMismatch {
                expected: "int",
                found: other.kind().to_string(),
            }),
        }
    }

    /// Interpret as an object handle in `[0, 2^31)`
    pub fn as_handle(&self) -> WireResult<i32> {
        let n = self.as_int()?;
        if (0..=i64::from(i32::MAX)).contains(&n) {
            Ok(n as i32)
        } else {
            Err(WireError::HandleRange(n))
        }
    }

    /// Interpret as a boolean
    pub fn as_bool(&self) -> WireResult<bool> {
        match self {
            WireValue::Bool(b) => Ok(*b),
            other => Err(WireError::TypeMismatch {
                expected: "bool",
                found: other.kind().to_string(),
            }),
        }
    }

    /// Interpret as a float, accepting integer spellings
    pub fn as_real(&self) -> WireResult<f64> {
        match self {
            WireValue::Real(x) => Ok(*x),
            WireValue::Int(n) => Ok(*n as f64),
            other => Err(WireError::TypeMismatch {
                expected: "real",
                found: other.kind().to_string(),
            }),
        }
    }

    /// Interpret as a string slice
    pub fn as_str(&self) -> WireResult<&str> {
        match self {
            WireValue::Str(s) => Ok(s),
            other => Err(WireError::TypeMismatch {
                expected: "string",
                found: other.kind().to_string(),
            }),
        }
    }

    /// Parse a standalone value from its textual encoding
    ///
    /// Trailing whitespace is permitted; trailing garbage is an error.
    pub fn parse_text(input: &str) -> WireResult<Self> {
        let reader = Cursor::new(input.as_bytes().to_vec());
        let mut stream = WireStream::new(reader, shared_writer(io::sink()));
        let value = stream.read_value()?;
        if !stream.at_end()? {
            return Err(WireError::Syntax(
                "trailing input after value".to_string(),
            ));
        }
        Ok(value)
    }
}

/// Append the textual encoding of `value` to `out`
pub fn encode_text(value: &WireValue, out: &mut Vec<u8>) {
    match value {
        WireValue::Null => out.extend_from_slice(b"null"),
        WireValue::Bool(true) => out.extend_from_slice(b"true"),
        WireValue::Bool(false) => out.extend_from_slice(b"false"),
        WireValue::Int(n) => out.extend_from_slice(n.to_string().as_bytes()),
        // {:?} keeps a decimal point or exponent so the token reads back
        // as a real, not an int
        WireValue::Real(x) => out.extend_from_slice(format!("{:?}", x).as_bytes()),
        WireValue::Str(s) => encode_string(s, out),
        WireValue::List(items) => {
            out.push(b'[');
            for item in items {
                out.push(b' ');
                encode_text(item, out);
            }
            out.extend_from_slice(b" ]");
        }
        WireValue::Object(spec) => {
            out.extend_from_slice(spec.type_tag.as_bytes());
            out.push(b'(');
            for (i, (name, value)) in spec.fields.iter().enumerate() {
                if i > 0 {
                    out.extend_from_slice(b"; ");
                }
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(b" = ");
                encode_text(value, out);
            }
            out.push(b')');
        }
    }
}

/// Append a double-quoted, escaped string literal to `out`
pub fn encode_string(text: &str, out: &mut Vec<u8>) {
    out.push(b'"');
    for byte in text.bytes() {
        match byte {
            b'"' => out.extend_from_slice(b"\\\""),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\t' => out.extend_from_slice(b"\\t"),
            b'\r' => out.extend_from_slice(b"\\r"),
            other => out.push(other),
        }
    }
    out.push(b'"');
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Vec::new();
        encode_text(self, &mut buf);
        f.write_str(&String::from_utf8_lossy(&buf))
    }
}

impl fmt::Display for ObjectSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        WireValue::Object(self.clone()).fmt(f)
    }
}
