//! Free-function catalog for the `F` command
//!
//! Session-control built-ins (`cd`, `binary`, `ascii`, `implicit_storage`,
//! `set_verbosity`, `revision`) are handled by the session itself, which
//! has explicit access to its own stream and table; anything else falls
//! through to this registry, where hosts install plain
//! arguments-to-value functions by name.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ServerError, ServerResult};
use crate::wire::value::WireValue;

/// A registered free function: consumes arguments, optionally returns one value
pub type FunctionThunk =
    Arc<dyn Fn(&[WireValue]) -> ServerResult<Option<WireValue>> + Send + Sync>;

/// Global registry of host-installed free functions
pub struct FunctionCatalog {
    functions: RwLock<HashMap<String, FunctionThunk>>,
}

static FUNCTIONS: Lazy<FunctionCatalog> = Lazy::new(|| FunctionCatalog {
    functions: RwLock::new(HashMap::new()),
});

impl FunctionCatalog {
    /// Access the global catalog singleton
    pub fn global() -> &'static Self {
        &FUNCTIONS
    }

    /// Register a free function under `name`
    pub fn register<F>(&self, name: &str, thunk: F)
    where
        F: Fn(&[WireValue]) -> ServerResult<Option<WireValue>> + Send + Sync + 'static,
    {
        self.functions
            .write()
            .insert(name.to_string(), Arc::new(thunk));
    }

    /// Produce an immutable snapshot for one session
    pub fn snapshot(&self) -> FunctionSnapshot {
        FunctionSnapshot {
            functions: Arc::new(self.functions.read().clone()),
        }
    }
}

/// Immutable per-session view of the function catalog
#[derive(Clone)]
pub struct FunctionSnapshot {
    functions: Arc<HashMap<String, FunctionThunk>>,
}

impl FunctionSnapshot {
    /// Invoke a registered function by name
    pub fn call(&self, name: &str, args: &[WireValue]) -> ServerResult<Option<WireValue>> {
        let thunk = self
            .functions
            .get(name)
            .ok_or_else(|| ServerError::UnknownFunction(name.to_string()))?;
        thunk(args)
    }
}

/// Build-identifying string returned by the `revision` built-in
pub fn revision_string() -> String {
    format!(
        "{} {} (protocol {})",
        env!("CARGO_PKG_NAME"),
        crate::VERSION,
        crate::PROTOCOL_VERSION
    )
}
