//! Synchronous client for the tether wire protocol
//!
//! Speaks the same marker-oriented protocol as the server, over TCP or a
//! spawned `tetherd` child process on stdio. Intended to be reused by any
//! frontend (CLI, tests, embedding hosts) that needs to drive a server.
//! Forwarded output frames that arrive while waiting for a reply are
//! collected as [`SessionEvent`]s and can be drained with
//! [`RemoteClient::take_events`].

use std::ffi::OsStr;
use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::process::{Child, Command, Stdio};

use thiserror::Error;

use crate::error::WireError;
use crate::wire::value::{ObjectSpec, WireValue};
use crate::wire::{FramePart, WireMode, WireStream, shared_writer, tags};

/// Errors produced by the [`RemoteClient`]
#[derive(Debug, Error)]
pub enum ClientError {
    /// I/O error while communicating with the server
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// Wire codec error in a reply
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    /// The server reported a command failure
    #[error("server error: {0}")]
    Server(String),
    /// The connection ended while a reply was expected
    #[error("connection closed before a reply arrived")]
    Disconnected,
    /// The server sent a frame tag the client does not understand
    #[error("unexpected frame tag '{0}'")]
    UnexpectedFrame(char),
    /// A reply frame did not have the expected shape
    #[error("malformed reply: {0}")]
    MalformedReply(String),
    /// Attempted to spawn a server without a command
    #[error("server command is empty")]
    EmptyCommand,
    /// Spawned server is missing a stdin pipe
    #[error("spawned server did not expose stdin")]
    MissingStdin,
    /// Spawned server is missing a stdout pipe
    #[error("spawned server did not expose stdout")]
    MissingStdout,
}

/// Forwarded server output observed while a command was in flight
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A log line from the server's output hub
    Log {
        /// Verbosity level of the line
        level: i64,
        /// RFC3339 timestamp stamped by the server
        timestamp: String,
        /// The log message
        message: String,
    },
    /// A progress bar started
    ProgressBegin {
        /// Bar identifier
        id: i64,
        /// Total step count
        total: i64,
        /// Bar title
        title: String,
    },
    /// A progress bar advanced
    ProgressStep {
        /// Bar identifier
        id: i64,
        /// Current position
        position: i64,
    },
    /// A progress bar finished
    ProgressEnd {
        /// Bar identifier
        id: i64,
    },
    /// Raw stdout text from the server
    Stdout(String),
    /// Raw stderr text from the server
    Stderr(String),
}

/// Synchronous connection to a tether server
pub struct RemoteClient {
    stream: WireStream<Box<dyn Read + Send>>,
    events: Vec<SessionEvent>,
    child: Option<Child>,
}

impl RemoteClient {
    /// Connect to a server listening on a TCP address
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
        let socket = TcpStream::connect(addr)?;
        let reader = socket.try_clone()?;
        Ok(Self {
            stream: WireStream::new(Box::new(reader), shared_writer(socket)),
            events: Vec::new(),
            child: None,
        })
    }

    /// Spawn a server process and speak to it over stdio
    pub fn spawn<I, S>(command: I) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut parts = command.into_iter();
        let program = parts.next().ok_or(ClientError::EmptyCommand)?;
        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;

        let stdin = child.stdin.take().ok_or(ClientError::MissingStdin)?;
        let stdout = child.stdout.take().ok_or(ClientError::MissingStdout)?;

        Ok(Self {
            stream: WireStream::new(Box::new(stdout), shared_writer(stdin)),
            events: Vec::new(),
            child: Some(child),
        })
    }

    /// Drain the forwarded-output events collected so far
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    // ---- commands ----------------------------------------------------

    /// Ping the server
    pub fn ping(&mut self) -> Result<(), ClientError> {
        self.stream.write_command(tags::PING, &[])?;
        self.expect_reply(0).map(|_| ())
    }

    /// Insert an object at a server-allocated handle, returning the handle
    pub fn new_object(&mut self, spec: &ObjectSpec) -> Result<i32, ClientError> {
        self.stream.write_command(
            tags::NEW,
            &[FramePart::Value(WireValue::Object(spec.clone()))],
        )?;
        let values = self.expect_reply(1)?;
        Ok(values[0].as_handle()?)
    }

    /// Insert an object at a client-chosen handle
    pub fn new_object_with_id(
        &mut self,
        handle: i32,
        spec: &ObjectSpec,
    ) -> Result<(), ClientError> {
        self.stream.write_command(
            tags::NEW_WITH_ID,
            &[
                FramePart::Value(WireValue::Int(i64::from(handle))),
                FramePart::Value(WireValue::Object(spec.clone())),
            ],
        )?;
        self.expect_reply(0).map(|_| ())
    }

    /// Insert a second handle aliasing an object already in the table
    ///
    /// Relies on the server reseeding its copies-map with persistent
    /// handles, so `source_handle` must be >= 10000.
    pub fn alias(&mut self, handle: i32, source_handle: i32) -> Result<(), ClientError> {
        self.stream.write_command(
            tags::NEW_WITH_ID,
            &[
                FramePart::Value(WireValue::Int(i64::from(handle))),
                FramePart::Reference(source_handle),
            ],
        )?;
        self.expect_reply(0).map(|_| ())
    }

    /// Load an object from a server-side file into `handle`
    pub fn load(&mut self, handle: i32, path: &str) -> Result<(), ClientError> {
        self.stream.write_command(
            tags::LOAD,
            &[
                FramePart::Value(WireValue::Int(i64::from(handle))),
                FramePart::Value(WireValue::Str(path.to_string())),
            ],
        )?;
        self.expect_reply(0).map(|_| ())
    }

    /// Delete the object at `handle`
    pub fn delete(&mut self, handle: i32) -> Result<(), ClientError> {
        self.stream.write_command(
            tags::DELETE,
            &[FramePart::Value(WireValue::Int(i64::from(handle)))],
        )?;
        self.expect_reply(0).map(|_| ())
    }

    /// Invoke a method on the object at `handle`
    pub fn call_method(
        &mut self,
        handle: i32,
        method: &str,
        args: &[WireValue],
    ) -> Result<Vec<WireValue>, ClientError> {
        let mut parts = vec![
            FramePart::Value(WireValue::Int(i64::from(handle))),
            FramePart::Value(WireValue::Str(method.to_string())),
            FramePart::Value(WireValue::Int(args.len() as i64)),
        ];
        parts.extend(args.iter().cloned().map(FramePart::Value));
        self.stream.write_command(tags::METHOD, &parts)?;
        self.read_reply()
    }

    /// Call a free function by name
    pub fn call_function(
        &mut self,
        name: &str,
        args: &[WireValue],
    ) -> Result<Option<WireValue>, ClientError> {
        let mut parts = vec![
            FramePart::Value(WireValue::Str(name.to_string())),
            FramePart::Value(WireValue::Int(args.len() as i64)),
        ];
        parts.extend(args.iter().cloned().map(FramePart::Value));
        self.stream.write_command(tags::CALL_FUNCTION, &parts)?;
        let mut values = self.read_reply()?;
        match values.len() {
            0 => Ok(None),
            1 => Ok(Some(values.remove(0))),
            n => Err(ClientError::MalformedReply(format!(
                "free function returned {} values",
                n
            ))),
        }
    }

    /// Change the server's working directory
    pub fn cd(&mut self, path: &str) -> Result<(), ClientError> {
        self.call_function("cd", &[WireValue::Str(path.to_string())])
            .map(|_| ())
    }

    /// Ask the server for its build-identifying revision string
    pub fn revision(&mut self) -> Result<String, ClientError> {
        match self.call_function("revision", &[])? {
            Some(WireValue::Str(s)) => Ok(s),
            other => Err(ClientError::MalformedReply(format!(
                "revision returned {:?}",
                other
            ))),
        }
    }

    /// List the object type tags the server can instantiate
    pub fn object_types(&mut self) -> Result<Vec<String>, ClientError> {
        match self.call_function("object_types", &[])? {
            Some(WireValue::List(items)) => items
                .into_iter()
                .map(|item| Ok(item.as_str()?.to_string()))
                .collect(),
            other => Err(ClientError::MalformedReply(format!(
                "object_types returned {:?}",
                other
            ))),
        }
    }

    /// Set the server's log verbosity threshold
    pub fn set_verbosity(&mut self, level: u32) -> Result<(), ClientError> {
        self.call_function("set_verbosity", &[WireValue::Int(i64::from(level))])
            .map(|_| ())
    }

    /// Toggle by-value object serialization on the server stream
    pub fn set_implicit_storage(&mut self, on: bool) -> Result<(), ClientError> {
        self.call_function("implicit_storage", &[WireValue::Bool(on)])
            .map(|_| ())
    }

    /// Switch both ends of the stream to binary mode
    ///
    /// The server answers in the new mode, so the local codec switches
    /// before the reply is read.
    pub fn set_binary(&mut self) -> Result<(), ClientError> {
        self.stream.write_command(
            tags::CALL_FUNCTION,
            &[
                FramePart::Value(WireValue::Str("binary".to_string())),
                FramePart::Value(WireValue::Int(0)),
            ],
        )?;
        self.stream.set_mode(WireMode::Binary);
        self.expect_reply(0).map(|_| ())
    }

    /// Switch both ends of the stream back to text mode
    pub fn set_ascii(&mut self) -> Result<(), ClientError> {
        self.stream.write_command(
            tags::CALL_FUNCTION,
            &[
                FramePart::Value(WireValue::Str("ascii".to_string())),
                FramePart::Value(WireValue::Int(0)),
            ],
        )?;
        self.stream.set_mode(WireMode::Text);
        self.expect_reply(0).map(|_| ())
    }

    /// Empty the server's object table
    pub fn clear_all(&mut self) -> Result<(), ClientError> {
        self.stream.write_command(tags::CLEAR, &[])?;
        self.expect_reply(0).map(|_| ())
    }

    /// End the session; the server keeps accepting connections
    pub fn quit(mut self) -> Result<(), ClientError> {
        self.stream.write_command(tags::QUIT, &[])?;
        if let Some(mut child) = self.child.take() {
            child.wait()?;
        }
        Ok(())
    }

    /// End the session and ask the server process to shut down
    pub fn kill(mut self) -> Result<(), ClientError> {
        self.stream.write_command(tags::KILL, &[])?;
        if let Some(mut child) = self.child.take() {
            child.wait()?;
        }
        Ok(())
    }

    // ---- reply handling ----------------------------------------------

    fn expect_reply(&mut self, expected: usize) -> Result<Vec<WireValue>, ClientError> {
        let values = self.read_reply()?;
        if values.len() == expected {
            Ok(values)
        } else {
            Err(ClientError::MalformedReply(format!(
                "expected {} return value(s), got {}",
                expected,
                values.len()
            )))
        }
    }

    /// Consume frames until a reply or error, collecting forwarded output
    fn read_reply(&mut self) -> Result<Vec<WireValue>, ClientError> {
        loop {
            let tag = self
                .stream
                .skip_to_marker()?
                .ok_or(ClientError::Disconnected)?;
            match tag {
                tags::REPLY => {
                    let count = self.stream.read_count()?;
                    let mut values = Vec::with_capacity(count);
                    for _ in 0..count {
                        values.push(self.stream.read_value()?);
                    }
                    return Ok(values);
                }
                tags::ERROR => {
                    let message = self.stream.read_string()?;
                    return Err(ClientError::Server(message));
                }
                tags::LOG => {
                    let level = self.stream.read_value_text()?.as_int()?;
                    let timestamp = self.stream.read_value_text()?.as_str()?.to_string();
                    let message = self.stream.read_value_text()?.as_str()?.to_string();
                    self.events.push(SessionEvent::Log {
                        level,
                        timestamp,
                        message,
                    });
                }
                tags::PROGRESS => {
                    let event = self.read_progress_event()?;
                    self.events.push(event);
                }
                tags::STDOUT => {
                    let text = self.stream.read_value_text()?.as_str()?.to_string();
                    self.events.push(SessionEvent::Stdout(text));
                }
                tags::STDERR => {
                    let text = self.stream.read_value_text()?.as_str()?.to_string();
                    self.events.push(SessionEvent::Stderr(text));
                }
                other => return Err(ClientError::UnexpectedFrame(other as char)),
            }
        }
    }

    fn read_progress_event(&mut self) -> Result<SessionEvent, ClientError> {
        let kind = self.stream.read_value_text()?.as_str()?.to_string();
        match kind.as_str() {
            "begin" => {
                let id = self.stream.read_value_text()?.as_int()?;
                let total = self.stream.read_value_text()?.as_int()?;
                let title = self.stream.read_value_text()?.as_str()?.to_string();
                Ok(SessionEvent::ProgressBegin { id, total, title })
            }
            "step" => {
                let id = self.stream.read_value_text()?.as_int()?;
                let position = self.stream.read_value_text()?.as_int()?;
                Ok(SessionEvent::ProgressStep { id, position })
            }
            "end" => {
                let id = self.stream.read_value_text()?.as_int()?;
                Ok(SessionEvent::ProgressEnd { id })
            }
            other => Err(ClientError::MalformedReply(format!(
                "unknown progress event '{}'",
                other
            ))),
        }
    }
}

impl Drop for RemoteClient {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
