//! Tether – a line-oriented remote object server
//!
//! This crate implements a stateful, single-connection wire protocol for
//! managing server-side objects from a remote client:
//! - Commands create, load, invoke, and destroy objects identified by
//!   client- or server-chosen integer handles
//! - A mode-switchable (textual or binary) wire stream with an
//!   object-identity map so repeated references resolve to shared instances
//! - Per-command error recovery: a failed command reports an error frame
//!   and leaves the session serving
//! - Server log, progress, and stdout/stderr output multiplexed back to the
//!   client over the same stream
//! - Explicit registries for object factories, method thunks, and free
//!   functions instead of runtime reflection

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod client;
pub mod error;
pub mod object;
pub mod output;
pub mod server;
pub mod wire;

// Re-export key types for convenience
pub use server::{Server, ServerConfig, SessionOutcome};

/// Current version of the tether crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wire protocol version spoken by [`Server`] and [`client::RemoteClient`]
pub const PROTOCOL_VERSION: &str = "1.0";
