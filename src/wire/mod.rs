//! Wire stream: framing, value codecs, and the object-identity maps
//!
//! A [`WireStream`] wraps one side of a connection. Frames in either
//! direction are introduced by a raw `!` marker byte plus a one-byte tag;
//! the payload that follows is encoded per the stream's current
//! [`WireMode`]. Two independent copies-maps give objects identity on the
//! wire: the inbound map resolves `*<id>;` back-references to live objects,
//! and the outbound map lets the writer emit a back-reference instead of a
//! second full body for an object it has already sent.

pub mod value;

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{WireError, WireResult};
use crate::object::{ObjectRef, ref_key};
use value::{ObjectSpec, WireValue, encode_text};

/// The marker byte introducing every frame in both directions
pub const MARKER: u8 = b'!';

/// Frame tag bytes
pub mod tags {
    /// Help request (client to server)
    pub const HELP: u8 = b'?';
    /// Ping (client to server)
    pub const PING: u8 = b'P';
    /// Free-function call (client to server)
    pub const CALL_FUNCTION: u8 = b'F';
    /// Insert an object at a client-chosen handle (client to server)
    pub const NEW_WITH_ID: u8 = b'N';
    /// Insert an object at a server-allocated handle (client to server)
    pub const NEW: u8 = b'O';
    /// Load an object from a file path (client to server)
    pub const LOAD: u8 = b'L';
    /// Delete a handle (client to server)
    pub const DELETE: u8 = b'D';
    /// Invoke a method on a handle (client to server)
    pub const METHOD: u8 = b'M';
    /// Clear the whole object table (client to server)
    pub const CLEAR: u8 = b'Z';
    /// End the session, keep the server alive (client to server)
    pub const QUIT: u8 = b'Q';
    /// End the session and shut the server down (client to server)
    pub const KILL: u8 = b'K';

    /// Successful reply frame (server to client)
    pub const REPLY: u8 = b'R';
    /// Error reply frame (server to client)
    pub const ERROR: u8 = b'E';
    /// Forwarded log line (server to client)
    pub const LOG: u8 = b'L';
    /// Forwarded progress update (server to client)
    pub const PROGRESS: u8 = b'G';
    /// Forwarded stdout chunk (server to client)
    pub const STDOUT: u8 = b'O';
    /// Forwarded stderr chunk (server to client)
    pub const STDERR: u8 = b'W';
}

// Binary-mode value tags
const BIN_NULL: u8 = 0x00;
const BIN_FALSE: u8 = 0x01;
const BIN_TRUE: u8 = 0x02;
const BIN_INT: u8 = 0x03;
const BIN_REAL: u8 = 0x04;
const BIN_STR: u8 = 0x05;
const BIN_LIST: u8 = 0x06;
const BIN_OBJECT: u8 = 0x07;
const BIN_REF: u8 = 0x08;
const BIN_DEF: u8 = 0x09;

/// Serialization mode for value payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireMode {
    /// Human-readable textual encoding
    Text,
    /// Tagged little-endian binary encoding
    Binary,
}

/// Writer half of a stream, shareable with the output redirection sinks
///
/// Frames are composed into a buffer and written under one lock
/// acquisition, so forwarded output never interleaves inside a reply frame.
pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Wrap a writer for use as a [`SharedWriter`]
pub fn shared_writer<W: Write + Send + 'static>(writer: W) -> SharedWriter {
    Arc::new(Mutex::new(Box::new(writer)))
}

/// One element of an outgoing command frame
#[derive(Debug, Clone)]
pub enum FramePart {
    /// A plain value
    Value(WireValue),
    /// A `*<id>;` back-reference into the peer's copies-map
    Reference(i32),
}

/// An object spec read from the wire, plus the id it was introduced under
#[derive(Debug, Clone)]
pub struct IncomingSpec {
    /// The parsed object literal
    pub spec: ObjectSpec,
    /// Wire id to bind the instantiated object to, if one was given
    pub wire_id: Option<i32>,
}

/// Result of reading an object-valued argument
pub enum IncomingObject {
    /// A back-reference resolved to an already-known live object
    Existing(ObjectRef),
    /// A fresh spec the caller must instantiate through the catalog
    New(IncomingSpec),
}

/// A bidirectional, mode-switchable wire stream
pub struct WireStream<R> {
    reader: R,
    peeked: Option<u8>,
    writer: SharedWriter,
    mode: WireMode,
    implicit_storage: bool,
    in_map: HashMap<i32, ObjectRef>,
    out_map: HashMap<usize, i32>,
    next_out_id: i32,
}

impl<R: Read> WireStream<R> {
    /// Create a stream in text mode over a reader and a shared writer
    pub fn new(reader: R, writer: SharedWriter) -> Self {
        Self {
            reader,
            peeked: None,
            writer,
            mode: WireMode::Text,
            implicit_storage: false,
            in_map: HashMap::new(),
            out_map: HashMap::new(),
            next_out_id: 1,
        }
    }

    /// Current serialization mode
    pub fn mode(&self) -> WireMode {
        self.mode
    }

    /// Switch serialization mode; takes effect on the next value
    pub fn set_mode(&mut self, mode: WireMode) {
        self.mode = mode;
    }

    /// Whether objects are written by value rather than by reference
    pub fn implicit_storage(&self) -> bool {
        self.implicit_storage
    }

    /// Set the implicit-storage flag
    pub fn set_implicit_storage(&mut self, on: bool) {
        self.implicit_storage = on;
    }

    /// Clone the shared writer handle (for redirection sinks)
    pub fn writer(&self) -> SharedWriter {
        self.writer.clone()
    }

    // ---- copies-maps -------------------------------------------------

    /// Drop every entry from both copies-maps
    pub fn clear_copies_maps(&mut self) {
        self.in_map.clear();
        self.out_map.clear();
        self.next_out_id = 1;
    }

    /// Install a `{handle -> object}` pair in both maps
    ///
    /// Afterwards `*<handle>;` on the inbound side resolves to `obj`, and
    /// writing `obj` emits `*<handle>;` instead of a full body.
    pub fn seed_copies_maps(&mut self, handle: i32, obj: &ObjectRef) {
        self.in_map.insert(handle, obj.clone());
        self.out_map.insert(ref_key(obj), handle);
    }

    /// Bind a wire id introduced by `*<id> -> ...` to its live object
    pub fn bind_reference(&mut self, id: i32, obj: &ObjectRef) {
        self.in_map.insert(id, obj.clone());
    }

    // ---- byte-level reading ------------------------------------------

    fn next_byte(&mut self) -> WireResult<Option<u8>> {
        if let Some(byte) = self.peeked.take() {
            return Ok(Some(byte));
        }
        let mut buf = [0u8; 1];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            }
        }
    }

    fn peek_byte(&mut self) -> WireResult<Option<u8>> {
        if self.peeked.is_none() {
            self.peeked = self.next_byte()?;
        }
        Ok(self.peeked)
    }

    fn require_byte(&mut self) -> WireResult<u8> {
        self.next_byte()?.ok_or(WireError::Eof)
    }

    /// Consume bytes until a `!` marker, then return the tag byte after it
    ///
    /// `Ok(None)` means the stream ended before a complete marker was seen.
    pub fn skip_to_marker(&mut self) -> WireResult<Option<u8>> {
        loop {
            match self.next_byte()? {
                None => return Ok(None),
                Some(MARKER) => return self.next_byte(),
                Some(_) => continue,
            }
        }
    }

    fn skip_ws(&mut self) -> WireResult<()> {
        while let Some(byte) = self.peek_byte()? {
            if byte == b' ' || byte == b'\t' || byte == b'\n' || byte == b'\r' {
                self.peeked = None;
            } else {
                break;
            }
        }
        Ok(())
    }

    /// True if only whitespace remains before end of stream
    pub fn at_end(&mut self) -> WireResult<bool> {
        self.skip_ws()?;
        Ok(self.peek_byte()?.is_none())
    }

    // ---- value reading -----------------------------------------------

    /// Read one value in the stream's current mode
    pub fn read_value(&mut self) -> WireResult<WireValue> {
        match self.mode {
            WireMode::Text => self.read_value_text(),
            WireMode::Binary => self.read_value_binary(),
        }
    }

    /// Read one value in text mode regardless of the current mode
    ///
    /// Redirected-output frames are always textual, so clients parse their
    /// payloads through this even while a binary session is active.
    pub fn read_value_text(&mut self) -> WireResult<WireValue> {
        self.skip_ws()?;
        let byte = self.peek_byte()?.ok_or(WireError::Eof)?;
        match byte {
            b'"' => {
                let s = self.read_string_literal()?;
                Ok(WireValue::Str(s))
            }
            b'[' => {
                self.peeked = None;
                let mut items = Vec::new();
                loop {
                    self.skip_ws()?;
                    match self.peek_byte()?.ok_or(WireError::Eof)? {
                        b']' => {
                            self.peeked = None;
                            return Ok(WireValue::List(items));
                        }
                        _ => items.push(self.read_value_text()?),
                    }
                }
            }
            b'0'..=b'9' | b'-' | b'.' => self.read_number_token(),
            b'*' => Err(WireError::Syntax(
                "object reference not valid in value position".to_string(),
            )),
            b if b.is_ascii_alphabetic() || b == b'_' => {
                let ident = self.read_identifier()?;
                match ident.as_str() {
                    "true" => Ok(WireValue::Bool(true)),
                    "false" => Ok(WireValue::Bool(false)),
                    "null" => Ok(WireValue::Null),
                    _ => {
                        let spec = self.read_object_body(ident)?;
                        Ok(WireValue::Object(spec))
                    }
                }
            }
            other => Err(WireError::Syntax(format!(
                "unexpected byte 0x{:02x} at start of value",
                other
            ))),
        }
    }

    fn read_string_literal(&mut self) -> WireResult<String> {
        self.peeked = None; // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.require_byte()? {
                b'"' => break,
                b'\\' => match self.require_byte()? {
                    b'"' => bytes.push(b'"'),
                    b'\\' => bytes.push(b'\\'),
                    b'n' => bytes.push(b'\n'),
                    b't' => bytes.push(b'\t'),
                    b'r' => bytes.push(b'\r'),
                    other => {
                        return Err(WireError::Syntax(format!(
                            "unknown string escape '\\{}'",
                            other as char
                        )));
                    }
                },
                b'\n' => {
                    return Err(WireError::Syntax(
                        "raw newline inside string literal".to_string(),
                    ));
                }
                other => bytes.push(other),
            }
        }
        String::from_utf8(bytes).map_err(|_| WireError::BadUtf8)
    }

    fn read_number_token(&mut self) -> WireResult<WireValue> {
        let mut token = String::new();
        while let Some(byte) = self.peek_byte()? {
            if byte.is_ascii_digit()
                || byte == b'-'
                || byte == b'+'
                || byte == b'.'
                || byte == b'e'
                || byte == b'E'
            {
                token.push(byte as char);
                self.peeked = None;
            } else {
                break;
            }
        }
        if let Ok(n) = token.parse::<i64>() {
            return Ok(WireValue::Int(n));
        }
        token
            .parse::<f64>()
            .map(WireValue::Real)
            .map_err(|_| WireError::Syntax(format!("malformed number '{}'", token)))
    }

    fn read_identifier(&mut self) -> WireResult<String> {
        let mut ident = String::new();
        while let Some(byte) = self.peek_byte()? {
            if byte.is_ascii_alphanumeric() || byte == b'_' {
                ident.push(byte as char);
                self.peeked = None;
            } else {
                break;
            }
        }
        if ident.is_empty() {
            return Err(WireError::Syntax("expected identifier".to_string()));
        }
        Ok(ident)
    }

    fn expect_byte(&mut self, expected: u8) -> WireResult<()> {
        let byte = self.require_byte()?;
        if byte == expected {
            Ok(())
        } else {
            Err(WireError::Syntax(format!(
                "expected '{}', found '{}'",
                expected as char, byte as char
            )))
        }
    }

    /// Parse `(field = value; ...)` after a type tag has been consumed
    fn read_object_body(&mut self, type_tag: String) -> WireResult<ObjectSpec> {
        self.skip_ws()?;
        self.expect_byte(b'(')?;
        let mut spec = ObjectSpec::new(type_tag);
        loop {
            self.skip_ws()?;
            if self.peek_byte()?.ok_or(WireError::Eof)? == b')' {
                self.peeked = None;
                return Ok(spec);
            }
            let name = self.read_identifier()?;
            self.skip_ws()?;
            self.expect_byte(b'=')?;
            let value = self.read_value_text()?;
            spec.fields.push((name, value));
            self.skip_ws()?;
            if self.peek_byte()?.ok_or(WireError::Eof)? == b';' {
                self.peeked = None;
            }
        }
    }

    fn read_value_binary(&mut self) -> WireResult<WireValue> {
        let tag = self.require_byte()?;
        self.read_value_after_tag(tag)
    }

    fn read_value_after_tag(&mut self, tag: u8) -> WireResult<WireValue> {
        match tag {
            BIN_NULL => Ok(WireValue::Null),
            BIN_FALSE => Ok(WireValue::Bool(false)),
            BIN_TRUE => Ok(WireValue::Bool(true)),
            BIN_INT => {
                let mut buf = [0u8; 8];
                self.read_exact(&mut buf)?;
                Ok(WireValue::Int(i64::from_le_bytes(buf)))
            }
            BIN_REAL => {
                let mut buf = [0u8; 8];
                self.read_exact(&mut buf)?;
                Ok(WireValue::Real(f64::from_le_bytes(buf)))
            }
            BIN_STR => Ok(WireValue::Str(self.read_binary_string()?)),
            BIN_LIST => {
                let count = self.read_u32()? as usize;
                let mut items = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    items.push(self.read_value_binary()?);
                }
                Ok(WireValue::List(items))
            }
            BIN_OBJECT => {
                let type_tag = self.read_binary_string()?;
                let count = self.read_u32()? as usize;
                let mut spec = ObjectSpec::new(type_tag);
                for _ in 0..count {
                    let name = self.read_binary_string()?;
                    let value = self.read_value_binary()?;
                    spec.fields.push((name, value));
                }
                Ok(WireValue::Object(spec))
            }
            BIN_REF | BIN_DEF => Err(WireError::Syntax(
                "object reference not valid in value position".to_string(),
            )),
            other => Err(WireError::BadValueTag(other)),
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> WireResult<()> {
        for slot in buf.iter_mut() {
            *slot = self.require_byte()?;
        }
        Ok(())
    }

    fn read_u32(&mut self) -> WireResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_i32(&mut self) -> WireResult<i32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn read_binary_string(&mut self) -> WireResult<String> {
        let len = self.read_u32()? as usize;
        let mut bytes = vec![0u8; len];
        self.read_exact(&mut bytes)?;
        String::from_utf8(bytes).map_err(|_| WireError::BadUtf8)
    }

    // ---- convenience readers -----------------------------------------

    /// Read a value and require an integer
    pub fn read_int(&mut self) -> WireResult<i64> {
        self.read_value()?.as_int()
    }

    /// Read a value and require an object handle
    pub fn read_handle(&mut self) -> WireResult<i32> {
        self.read_value()?.as_handle()
    }

    /// Read a value and require a string
    pub fn read_string(&mut self) -> WireResult<String> {
        Ok(self.read_value()?.as_str()?.to_string())
    }

    /// Read a value and require a non-negative count
    pub fn read_count(&mut self) -> WireResult<usize> {
        let n = self.read_int()?;
        usize::try_from(n).map_err(|_| WireError::Syntax(format!("negative count {}", n)))
    }

    // ---- object reading ----------------------------------------------

    /// Read an object-valued argument: a literal, a `*<id> -> ...`
    /// definition, or a `*<id>;` back-reference
    pub fn read_object(&mut self) -> WireResult<IncomingObject> {
        match self.mode {
            WireMode::Text => self.read_object_text(),
            WireMode::Binary => self.read_object_binary(),
        }
    }

    fn resolve_reference(&self, id: i32) -> WireResult<IncomingObject> {
        if id == 0 {
            return Err(WireError::NullReference);
        }
        self.in_map
            .get(&id)
            .cloned()
            .map(IncomingObject::Existing)
            .ok_or(WireError::UnknownReference(id))
    }

    fn read_object_text(&mut self) -> WireResult<IncomingObject> {
        self.skip_ws()?;
        if self.peek_byte()?.ok_or(WireError::Eof)? != b'*' {
            return match self.read_value_text()? {
                WireValue::Object(spec) => Ok(IncomingObject::New(IncomingSpec {
                    spec,
                    wire_id: None,
                })),
                other => Err(WireError::TypeMismatch {
                    expected: "object",
                    found: other.kind().to_string(),
                }),
            };
        }
        self.peeked = None; // '*'
        let id = match self.read_number_token()? {
            WireValue::Int(n) => {
                i32::try_from(n).map_err(|_| WireError::Syntax(format!("bad wire id {}", n)))?
            }
            other => {
                return Err(WireError::Syntax(format!(
                    "wire id must be an integer, found {}",
                    other.kind()
                )));
            }
        };
        self.skip_ws()?;
        match self.peek_byte()?.ok_or(WireError::Eof)? {
            b';' => {
                self.peeked = None;
                self.resolve_reference(id)
            }
            b'-' => {
                self.peeked = None;
                self.expect_byte(b'>')?;
                match self.read_value_text()? {
                    WireValue::Object(spec) => Ok(IncomingObject::New(IncomingSpec {
                        spec,
                        wire_id: Some(id),
                    })),
                    other => Err(WireError::TypeMismatch {
                        expected: "object",
                        found: other.kind().to_string(),
                    }),
                }
            }
            other => Err(WireError::Syntax(format!(
                "expected ';' or '->' after wire id, found '{}'",
                other as char
            ))),
        }
    }

    fn read_object_binary(&mut self) -> WireResult<IncomingObject> {
        let tag = self.require_byte()?;
        match tag {
            BIN_REF => {
                let id = self.read_i32()?;
                self.resolve_reference(id)
            }
            BIN_DEF => {
                let id = self.read_i32()?;
                match self.read_value_binary()? {
                    WireValue::Object(spec) => Ok(IncomingObject::New(IncomingSpec {
                        spec,
                        wire_id: Some(id),
                    })),
                    other => Err(WireError::TypeMismatch {
                        expected: "object",
                        found: other.kind().to_string(),
                    }),
                }
            }
            other => match self.read_value_after_tag(other)? {
                WireValue::Object(spec) => Ok(IncomingObject::New(IncomingSpec {
                    spec,
                    wire_id: None,
                })),
                value => Err(WireError::TypeMismatch {
                    expected: "object",
                    found: value.kind().to_string(),
                }),
            },
        }
    }

    // ---- writing -----------------------------------------------------

    fn encode_value(&self, value: &WireValue, out: &mut Vec<u8>) {
        match self.mode {
            WireMode::Text => {
                out.push(b' ');
                encode_text(value, out);
            }
            WireMode::Binary => encode_binary(value, out),
        }
    }

    fn flush_frame(&self, frame: &[u8]) -> WireResult<()> {
        let mut writer = self.writer.lock();
        writer.write_all(frame)?;
        writer.flush()?;
        Ok(())
    }

    /// Write a `!R <n> <values...>` reply frame
    pub fn write_reply(&mut self, values: &[WireValue]) -> WireResult<()> {
        let mut frame = vec![MARKER, tags::REPLY];
        self.encode_value(&WireValue::Int(values.len() as i64), &mut frame);
        for value in values {
            self.encode_value(value, &mut frame);
        }
        frame.push(b'\n');
        self.flush_frame(&frame)
    }

    /// Write an `!E "<message>"` error frame
    pub fn write_error(&mut self, message: &str) -> WireResult<()> {
        let mut frame = vec![MARKER, tags::ERROR];
        self.encode_value(&WireValue::Str(message.to_string()), &mut frame);
        frame.push(b'\n');
        self.flush_frame(&frame)
    }

    /// Write a command frame: marker, tag, then each part
    pub fn write_command(&mut self, tag: u8, parts: &[FramePart]) -> WireResult<()> {
        let mut frame = vec![MARKER, tag];
        for part in parts {
            match part {
                FramePart::Value(value) => self.encode_value(value, &mut frame),
                FramePart::Reference(id) => match self.mode {
                    WireMode::Text => {
                        frame.extend_from_slice(format!(" *{};", id).as_bytes());
                    }
                    WireMode::Binary => {
                        frame.push(BIN_REF);
                        frame.extend_from_slice(&id.to_le_bytes());
                    }
                },
            }
        }
        frame.push(b'\n');
        self.flush_frame(&frame)
    }

    /// Write a live object as a standalone value, honoring identity
    ///
    /// With implicit storage off, the first write of an object emits
    /// `*<id> -> <body>` and later writes emit `*<id>;`. With it on, every
    /// write carries the full body and the outbound map is bypassed.
    pub fn write_object(&mut self, obj: &ObjectRef) -> WireResult<()> {
        let mut frame = Vec::new();
        self.encode_object_ref(obj, &mut frame);
        self.flush_frame(&frame)
    }

    fn encode_object_ref(&mut self, obj: &ObjectRef, out: &mut Vec<u8>) {
        let spec = obj.lock().describe();
        if self.implicit_storage {
            self.encode_value(&WireValue::Object(spec), out);
            return;
        }
        let key = ref_key(obj);
        if let Some(&id) = self.out_map.get(&key) {
            match self.mode {
                WireMode::Text => out.extend_from_slice(format!(" *{};", id).as_bytes()),
                WireMode::Binary => {
                    out.push(BIN_REF);
                    out.extend_from_slice(&id.to_le_bytes());
                }
            }
            return;
        }
        let id = self.next_out_id;
        self.next_out_id += 1;
        self.out_map.insert(key, id);
        match self.mode {
            WireMode::Text => {
                out.extend_from_slice(format!(" *{} ->", id).as_bytes());
                self.encode_value(&WireValue::Object(spec), out);
            }
            WireMode::Binary => {
                out.push(BIN_DEF);
                out.extend_from_slice(&id.to_le_bytes());
                encode_binary(&WireValue::Object(spec), out);
            }
        }
    }

    /// Write raw bytes (help text) and flush
    pub fn write_raw(&mut self, bytes: &[u8]) -> WireResult<()> {
        self.flush_frame(bytes)
    }
}

/// Append the binary encoding of `value` to `out`
fn encode_binary(value: &WireValue, out: &mut Vec<u8>) {
    match value {
        WireValue::Null => out.push(BIN_NULL),
        WireValue::Bool(false) => out.push(BIN_FALSE),
        WireValue::Bool(true) => out.push(BIN_TRUE),
        WireValue::Int(n) => {
            out.push(BIN_INT);
            out.extend_from_slice(&n.to_le_bytes());
        }
        WireValue::Real(x) => {
            out.push(BIN_REAL);
            out.extend_from_slice(&x.to_le_bytes());
        }
        WireValue::Str(s) => {
            out.push(BIN_STR);
            encode_binary_string(s, out);
        }
        WireValue::List(items) => {
            out.push(BIN_LIST);
            out.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                encode_binary(item, out);
            }
        }
        WireValue::Object(spec) => {
            out.push(BIN_OBJECT);
            encode_binary_string(&spec.type_tag, out);
            out.extend_from_slice(&(spec.fields.len() as u32).to_le_bytes());
            for (name, value) in &spec.fields {
                encode_binary_string(name, out);
                encode_binary(value, out);
            }
        }
    }
}

fn encode_binary_string(s: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

/// Build one always-textual forwarded-output frame (log/progress/std
/// streams); used by the redirection sinks, which do not own the stream
pub fn text_frame(tag: u8, values: &[WireValue]) -> Vec<u8> {
    let mut frame = vec![MARKER, tag];
    for value in values {
        frame.push(b' ');
        encode_text(value, &mut frame);
    }
    frame.push(b'\n');
    frame
}

