//! Session loop and command dispatcher
//!
//! One [`Session`] serves one accepted connection: it reads command frames
//! off the wire, mutates its object table or invokes methods through the
//! catalog, and answers each command with a reply or error frame. Errors of
//! any kind are recovered at per-command granularity: only end-of-stream,
//! `Q`, or `K` end a session. Commands are processed strictly sequentially.

pub mod functions;
pub mod table;

use std::env;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::object::{CatalogSnapshot, ObjectCatalog, ObjectRef, load_object};
use crate::output::{RedirectGuard, hub};
use crate::wire::value::WireValue;
use crate::wire::{IncomingObject, SharedWriter, WireMode, WireStream, shared_writer, tags};
use functions::{FunctionCatalog, FunctionSnapshot, revision_string};
use table::ObjectTable;

/// Handles at or above this value are reseeded into the copies-maps
/// between commands, so clients can back-reference them across commands
pub const PERSISTENT_HANDLE_MIN: i32 = 10_000;

const HELP_TEXT: &str = "\
Tether remote object server commands:
  !?                                      this help text
  !P                                      ping; replies !R 0
  !F <name> <nargs> <args...>             call a free function
  !N <handle> <object>                    insert an object at a chosen handle
  !O <object>                             insert an object, reply with its handle
  !L <handle> <path>                      load an object from a file
  !D <handle>                             delete an object
  !M <handle> <method> <nargs> <args...>  invoke a method on an object
  !Z                                      clear the whole object table
  !Q                                      end the session
  !K                                      end the session and shut the server down
Replies are !R <n> <values...> on success and !E \"<message>\" on failure.
Built-in functions: cd, binary, ascii, implicit_storage, set_verbosity,
revision, object_types.
Objects at handles 10000 and above are reseeded into the stream's copies-map
between commands, so *<handle>; back-references resolve to live table objects.
";

/// Configuration for the tether server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Clear and reseed the copies-maps before every command
    pub clear_maps: bool,

    /// Initial log verbosity threshold for the output hub
    pub verbosity: u32,

    /// Redirect hub output (log/progress/stdout/stderr) into the session
    pub redirect_output: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            clear_maps: true,
            verbosity: 1,
            redirect_output: true,
        }
    }
}

impl ServerConfig {
    /// Load a configuration from a JSON file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config = serde_json::from_slice(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }
}

/// How a finished session wants the hosting process to proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The connection ended (`Q` or stream close); keep accepting
    KeepServing,
    /// The client sent `K`; shut the server down
    Shutdown,
}

/// Server entry point: snapshots the catalogs and runs sessions
pub struct Server {
    config: ServerConfig,
    catalog: CatalogSnapshot,
    functions: FunctionSnapshot,
}

impl Server {
    /// Create a server from the global object and function catalogs
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            catalog: ObjectCatalog::global().snapshot(),
            functions: FunctionCatalog::global().snapshot(),
        }
    }

    /// Serve one connection to completion
    pub fn handle<R, W>(&self, reader: R, writer: W) -> ServerResult<SessionOutcome>
    where
        R: Read,
        W: std::io::Write + Send + 'static,
    {
        let mut session = Session::new(
            self.config.clone(),
            self.catalog.clone(),
            self.functions.clone(),
            reader,
            shared_writer(writer),
        )?;
        session.run()
    }
}

enum Flow {
    Continue,
    Quit,
    Kill,
}

/// Server-side state and control loop for one client connection
struct Session<R> {
    id: Uuid,
    stream: WireStream<R>,
    objects: ObjectTable,
    catalog: CatalogSnapshot,
    functions: FunctionSnapshot,
    clear_maps: bool,
    _redirect: Option<RedirectGuard>,
}

impl<R: Read> Session<R> {
    fn new(
        config: ServerConfig,
        catalog: CatalogSnapshot,
        functions: FunctionSnapshot,
        reader: R,
        writer: SharedWriter,
    ) -> ServerResult<Self> {
        let redirect = if config.redirect_output {
            Some(RedirectGuard::install(writer.clone())?)
        } else {
            None
        };
        hub().set_verbosity(config.verbosity);

        Ok(Self {
            id: Uuid::new_v4(),
            stream: WireStream::new(reader, writer),
            objects: ObjectTable::new(),
            catalog,
            functions,
            clear_maps: config.clear_maps,
            _redirect: redirect,
        })
    }

    fn run(&mut self) -> ServerResult<SessionOutcome> {
        let span = tracing::info_span!("session", id = %self.id);
        let _entered = span.enter();

        loop {
            if self.clear_maps {
                self.reseed_maps();
            }

            let tag = match self.stream.skip_to_marker() {
                Ok(Some(tag)) => tag,
                Ok(None) => {
                    tracing::info!("peer closed the stream");
                    return Ok(SessionOutcome::KeepServing);
                }
                Err(err) => {
                    tracing::info!(%err, "stream failed between commands");
                    return Ok(SessionOutcome::KeepServing);
                }
            };

            let step = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(tag)))
                .unwrap_or_else(|_| {
                    Err(ServerError::Internal(
                        "command handler panicked".to_string(),
                    ))
                });

            match step {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => {
                    tracing::info!("quit requested");
                    return Ok(SessionOutcome::KeepServing);
                }
                Ok(Flow::Kill) => {
                    tracing::info!("kill requested");
                    return Ok(SessionOutcome::Shutdown);
                }
                Err(err) => self.report(err),
            }
        }
    }

    /// Reinstall every persistent table entry into the copies-maps
    fn reseed_maps(&mut self) {
        self.stream.clear_copies_maps();
        for (&handle, obj) in self.objects.iter() {
            if handle >= PERSISTENT_HANDLE_MIN {
                self.stream.seed_copies_maps(handle, obj);
            }
        }
    }

    /// Report a failed command to the peer; a failure to do even that is
    /// only logged, since it usually means the peer already disconnected
    fn report(&mut self, err: ServerError) {
        tracing::debug!(%err, "command failed");
        if let Err(write_err) = self.stream.write_error(&err.to_string()) {
            tracing::warn!(%write_err, "could not report error to peer");
        }
    }

    fn dispatch(&mut self, tag: u8) -> ServerResult<Flow> {
        match tag {
            tags::HELP => self.cmd_help(),
            tags::PING => self.cmd_ping(),
            tags::CALL_FUNCTION => self.cmd_call_function(),
            tags::NEW_WITH_ID => self.cmd_new_with_id(),
            tags::NEW => self.cmd_new(),
            tags::LOAD => self.cmd_load(),
            tags::DELETE => self.cmd_delete(),
            tags::METHOD => self.cmd_method(),
            tags::CLEAR => self.cmd_clear(),
            tags::QUIT => Ok(Flow::Quit),
            tags::KILL => Ok(Flow::Kill),
            other => Err(ServerError::UnknownCommand(other as char)),
        }
    }

    fn cmd_help(&mut self) -> ServerResult<Flow> {
        self.stream.write_raw(HELP_TEXT.as_bytes())?;
        Ok(Flow::Continue)
    }

    fn cmd_ping(&mut self) -> ServerResult<Flow> {
        self.stream.write_reply(&[])?;
        Ok(Flow::Continue)
    }

    /// Read an object argument, instantiating a fresh spec through the
    /// catalog and binding any wire id it was introduced under
    fn read_incoming_object(&mut self) -> ServerResult<ObjectRef> {
        match self.stream.read_object()? {
            IncomingObject::Existing(obj) => Ok(obj),
            IncomingObject::New(incoming) => {
                let obj = self.catalog.instantiate(&incoming.spec)?;
                if let Some(id) = incoming.wire_id {
                    self.stream.bind_reference(id, &obj);
                }
                Ok(obj)
            }
        }
    }

    fn cmd_new_with_id(&mut self) -> ServerResult<Flow> {
        let handle = self.stream.read_handle()?;
        let obj = self.read_incoming_object()?;
        self.objects.insert(handle, obj);
        self.stream.write_reply(&[])?;
        Ok(Flow::Continue)
    }

    fn cmd_new(&mut self) -> ServerResult<Flow> {
        let obj = self.read_incoming_object()?;
        let handle = self.objects.allocate_handle()?;
        self.objects.insert(handle, obj);
        self.stream
            .write_reply(&[WireValue::Int(i64::from(handle))])?;
        Ok(Flow::Continue)
    }

    fn cmd_load(&mut self) -> ServerResult<Flow> {
        let handle = self.stream.read_handle()?;
        let path = PathBuf::from(self.stream.read_string()?);
        let obj = load_object(&path, &self.catalog)?;
        self.objects.insert(handle, obj);
        self.stream.write_reply(&[])?;
        Ok(Flow::Continue)
    }

    fn cmd_delete(&mut self) -> ServerResult<Flow> {
        let handle = self.stream.read_handle()?;
        self.objects.remove(handle)?;
        self.stream.write_reply(&[])?;
        Ok(Flow::Continue)
    }

    fn cmd_method(&mut self) -> ServerResult<Flow> {
        let handle = self.stream.read_handle()?;
        let method = self.stream.read_string()?;
        let n_args = self.stream.read_count()?;
        let mut args = Vec::with_capacity(n_args);
        for _ in 0..n_args {
            args.push(self.stream.read_value()?);
        }

        let obj = self
            .objects
            .get(handle)
            .ok_or(crate::error::ObjectError::HandleNotFound(handle))?;
        let results = self.catalog.invoke(&obj, &method, args)?;
        self.stream.write_reply(&results)?;
        Ok(Flow::Continue)
    }

    fn cmd_clear(&mut self) -> ServerResult<Flow> {
        self.objects.clear();
        self.stream.write_reply(&[])?;
        Ok(Flow::Continue)
    }

    fn cmd_call_function(&mut self) -> ServerResult<Flow> {
        let name = self.stream.read_string()?;
        let n_args = self.stream.read_count()?;
        let mut args = Vec::with_capacity(n_args);
        for _ in 0..n_args {
            args.push(self.stream.read_value()?);
        }

        let result = self.call_builtin_or_registered(&name, &args)?;
        match result {
            Some(value) => self.stream.write_reply(&[value])?,
            None => self.stream.write_reply(&[])?,
        }
        Ok(Flow::Continue)
    }

    fn call_builtin_or_registered(
        &mut self,
        name: &str,
        args: &[WireValue],
    ) -> ServerResult<Option<WireValue>> {
        match name {
            "cd" => {
                expect_arity(name, args, 1)?;
                let path = arg_str(name, args, 0)?;
                env::set_current_dir(path).map_err(|err| ServerError::Function {
                    name: name.to_string(),
                    detail: err.to_string(),
                })?;
                Ok(None)
            }
            "binary" => {
                expect_arity(name, args, 0)?;
                self.stream.set_mode(WireMode::Binary);
                Ok(None)
            }
            "ascii" => {
                expect_arity(name, args, 0)?;
                self.stream.set_mode(WireMode::Text);
                Ok(None)
            }
            "implicit_storage" => {
                expect_arity(name, args, 1)?;
                let on = arg_bool(name, args, 0)?;
                self.stream.set_implicit_storage(on);
                Ok(None)
            }
            "set_verbosity" => {
                expect_arity(name, args, 1)?;
                let level = arg_int(name, args, 0)?;
                let level = u32::try_from(level).map_err(|_| ServerError::Function {
                    name: name.to_string(),
                    detail: format!("verbosity {} out of range", level),
                })?;
                hub().set_verbosity(level);
                Ok(None)
            }
            "revision" => {
                expect_arity(name, args, 0)?;
                Ok(Some(WireValue::Str(revision_string())))
            }
            "object_types" => {
                expect_arity(name, args, 0)?;
                let mut types = self.catalog.list_types();
                types.sort();
                Ok(Some(WireValue::List(
                    types.into_iter().map(WireValue::Str).collect(),
                )))
            }
            _ => self.functions.call(name, args),
        }
    }
}

fn expect_arity(name: &str, args: &[WireValue], expected: usize) -> ServerResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ServerError::Function {
            name: name.to_string(),
            detail: format!("expected {} argument(s), got {}", expected, args.len()),
        })
    }
}

fn arg_str<'a>(name: &str, args: &'a [WireValue], index: usize) -> ServerResult<&'a str> {
    args[index].as_str().map_err(|err| ServerError::Function {
        name: name.to_string(),
        detail: err.to_string(),
    })
}

fn arg_bool(name: &str, args: &[WireValue], index: usize) -> ServerResult<bool> {
    args[index].as_bool().map_err(|err| ServerError::Function {
        name: name.to_string(),
        detail: err.to_string(),
    })
}

fn arg_int(name: &str, args: &[WireValue], index: usize) -> ServerResult<i64> {
    args[index].as_int().map_err(|err| ServerError::Function {
        name: name.to_string(),
        detail: err.to_string(),
    })
}
