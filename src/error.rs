//! Error types for the tether server
//!
//! thiserror enums per subsystem with conversions at the dispatch boundary.
//! Every command-level failure is rendered into an `!E` reply frame by the
//! session loop; only stream loss and the explicit quit/kill commands end a
//! session.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the wire codec and stream layer
#[derive(Debug, Error)]
pub enum WireError {
    /// The stream ended in the middle of a value or frame
    #[error("unexpected end of stream")]
    Eof,

    /// Underlying transport failure
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed textual input
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Unrecognized tag byte in binary mode
    #[error("unrecognized binary value tag 0x{0:02x}")]
    BadValueTag(u8),

    /// A string on the wire was not valid UTF-8
    #[error("invalid UTF-8 in wire string")]
    BadUtf8,

    /// A back-reference named an id absent from the inbound copies-map
    #[error("unknown object reference *{0}")]
    UnknownReference(i32),

    /// A null reference appeared where a live object was required
    #[error("null object reference")]
    NullReference,

    /// A value of one kind appeared where another was required
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        /// Kind of value the reader required
        expected: &'static str,
        /// Kind of value actually present on the wire
        found: String,
    },

    /// An integer outside the valid handle range `[0, 2^31)`
    #[error("value {0} is not a valid object handle")]
    HandleRange(i64),
}

/// Convenience result alias for wire operations
pub type WireResult<T> = std::result::Result<T, WireError>;

/// Errors raised by the object catalog and table
#[derive(Debug, Error)]
pub enum ObjectError {
    /// No factory registered for a type tag
    #[error("unknown object type '{0}'")]
    UnknownType(String),

    /// No method thunk registered for (type, method)
    #[error("object type '{type_tag}' has no method '{method}'")]
    UnknownMethod {
        /// Type tag of the target object
        type_tag: String,
        /// Requested method name
        method: String,
    },

    /// Handle not present in the object table
    #[error("no object in table for handle {0}")]
    HandleNotFound(i32),

    /// Random handle allocation exhausted its retry budget
    #[error("could not allocate a free handle after {attempts} attempts")]
    HandleSpaceExhausted {
        /// Number of rejection-sampling attempts made
        attempts: u32,
    },

    /// A factory rejected the supplied object spec
    #[error("could not build '{type_tag}': {detail}")]
    Construct {
        /// Type tag being instantiated
        type_tag: String,
        /// Factory-provided failure detail
        detail: String,
    },

    /// A method thunk failed
    #[error("method '{method}' failed: {detail}")]
    Method {
        /// Method that failed
        method: String,
        /// Thunk-provided failure detail
        detail: String,
    },

    /// Loading an object from a file failed
    #[error("could not load object from {path}: {detail}")]
    Load {
        /// Path passed to the load command
        path: PathBuf,
        /// Failure detail
        detail: String,
    },
}

/// Convenience result alias for object operations
pub type ObjectResult<T> = std::result::Result<T, ObjectError>;

/// Errors raised by the output redirection manager
#[derive(Debug, Error)]
pub enum RedirectError {
    /// A redirection scope is already active in this process
    #[error("output redirection is already active for another session")]
    AlreadyActive,
}

/// Top-level error for session commands
#[derive(Debug, Error)]
pub enum ServerError {
    /// Wire codec or transport error
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Object catalog or table error
    #[error("object error: {0}")]
    Object(#[from] ObjectError),

    /// Output redirection error
    #[error("redirect error: {0}")]
    Redirect(#[from] RedirectError),

    /// Command tag byte outside the recognized set
    #[error("invalid command character '{0}' (expected one of ? P F N O L D M Z Q K)")]
    UnknownCommand(char),

    /// Free function name not registered and not a built-in
    #[error("unknown free function '{0}'")]
    UnknownFunction(String),

    /// A free function rejected its arguments or failed to execute
    #[error("function '{name}' failed: {detail}")]
    Function {
        /// Function name
        name: String,
        /// Failure detail
        detail: String,
    },

    /// A contained fault with no recognized error value
    #[error("internal fault: {0}")]
    Internal(String),
}

/// Convenience result alias for server operations
pub type ServerResult<T> = std::result::Result<T, ServerError>;
