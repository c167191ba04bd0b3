//! Object model, type catalog, and factory system
//!
//! Provides a global catalog for registering object types prior to server
//! startup. Each session clones an immutable snapshot of the catalog, so a
//! running session is unaffected by later registrations. The catalog is the
//! crate's replacement for runtime reflection: a type tag maps to a factory
//! closure, and (type tag, method name) maps to a typed invocation thunk.

pub mod builtin;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::{ObjectError, ObjectResult};
use crate::wire::value::{ObjectSpec, WireValue};

/// Behavior required of every object servable over the wire
pub trait RemoteObject: Any + Send {
    /// Registered type tag this object was built from
    fn type_tag(&self) -> &str;

    /// Serialize current state back into an object spec
    fn describe(&self) -> ObjectSpec;
}

impl std::fmt::Debug for dyn RemoteObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteObject")
            .field("type_tag", &self.type_tag())
            .finish_non_exhaustive()
    }
}

/// Shared, lockable handle to a live object
///
/// The object table and the stream's copies-maps both hold `ObjectRef`s, so
/// a table entry and a wire back-reference resolve to the same instance.
pub type ObjectRef = Arc<Mutex<Box<dyn RemoteObject>>>;

/// Wrap a freshly built object into an [`ObjectRef`]
pub fn object_ref(obj: Box<dyn RemoteObject>) -> ObjectRef {
    Arc::new(Mutex::new(obj))
}

/// Identity key of an object reference, for the outbound copies-map
pub fn ref_key(obj: &ObjectRef) -> usize {
    Arc::as_ptr(obj) as *const () as usize
}

/// Factory function that builds an object from its wire spec
pub type ObjectFactory = Arc<dyn Fn(&ObjectSpec) -> ObjectResult<Box<dyn RemoteObject>> + Send + Sync>;

/// Invocation thunk: consumes pre-read arguments, produces reply values
pub type MethodThunk =
    Arc<dyn Fn(&mut dyn RemoteObject, Vec<WireValue>) -> ObjectResult<Vec<WireValue>> + Send + Sync>;

#[derive(Clone)]
struct ObjectTypeInfo {
    factory: ObjectFactory,
    methods: HashMap<String, MethodThunk>,
}

/// Global catalog of object type definitions
pub struct ObjectCatalog {
    types: RwLock<HashMap<String, ObjectTypeInfo>>,
}

static CATALOG: Lazy<ObjectCatalog> = Lazy::new(ObjectCatalog::new);

impl ObjectCatalog {
    fn new() -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
        }
    }

    /// Access the global catalog singleton
    pub fn global() -> &'static Self {
        &CATALOG
    }

    /// Register an object type with a factory function
    pub fn register<F>(&self, type_tag: &str, factory: F)
    where
        F: Fn(&ObjectSpec) -> ObjectResult<Box<dyn RemoteObject>> + Send + Sync + 'static,
    {
        let mut types = self.types.write();
        types.insert(
            type_tag.to_string(),
            ObjectTypeInfo {
                factory: Arc::new(factory),
                methods: HashMap::new(),
            },
        );
    }

    /// Register an object type that implements `Default`, ignoring spec fields
    pub fn register_default<T>(&self, type_tag: &str)
    where
        T: RemoteObject + Default + 'static,
    {
        self.register(type_tag, |_spec| Ok(Box::new(T::default())));
    }

    /// Register a typed method thunk for an already-registered type
    ///
    /// The thunk receives the concrete object and the argument values read
    /// from the stream, and returns the values for the reply frame.
    pub fn register_method<T, F>(&self, type_tag: &str, method: &str, thunk: F)
    where
        T: RemoteObject + 'static,
        F: Fn(&mut T, Vec<WireValue>) -> ObjectResult<Vec<WireValue>> + Send + Sync + 'static,
    {
        let method_name = method.to_string();
        let wrapped: MethodThunk = Arc::new(move |obj: &mut dyn RemoteObject, args| {
            let concrete = (obj as &mut dyn Any)
                .downcast_mut::<T>()
                .expect("method thunk registered against a different concrete type");
            thunk(concrete, args)
        });

        let mut types = self.types.write();
        let info = types
            .get_mut(type_tag)
            .expect("register_method called before the type's factory was registered");
        info.methods.insert(method_name, wrapped);
    }

    /// Produce an immutable snapshot for one session
    pub fn snapshot(&self) -> CatalogSnapshot {
        let types = self.types.read();
        CatalogSnapshot {
            types: Arc::new(types.clone()),
        }
    }
}

/// Immutable per-session view of the object catalog
#[derive(Clone)]
pub struct CatalogSnapshot {
    types: Arc<HashMap<String, ObjectTypeInfo>>,
}

impl CatalogSnapshot {
    /// Instantiate an object from its wire spec
    pub fn instantiate(&self, spec: &ObjectSpec) -> ObjectResult<ObjectRef> {
        let info = self
            .types
            .get(&spec.type_tag)
            .ok_or_else(|| ObjectError::UnknownType(spec.type_tag.clone()))?;
        let obj = (info.factory)(spec)?;
        Ok(object_ref(obj))
    }

    /// Check whether the snapshot contains the specified type
    pub fn has_type(&self, type_tag: &str) -> bool {
        self.types.contains_key(type_tag)
    }

    /// List all type tags known to this snapshot
    pub fn list_types(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }

    /// Invoke a named method on a live object
    pub fn invoke(
        &self,
        obj: &ObjectRef,
        method: &str,
        args: Vec<WireValue>,
    ) -> ObjectResult<Vec<WireValue>> {
        let mut guard = obj.lock();
        let type_tag = guard.type_tag().to_string();
        let info = self
            .types
            .get(&type_tag)
            .ok_or_else(|| ObjectError::UnknownType(type_tag.clone()))?;
        let thunk = info
            .methods
            .get(method)
            .ok_or_else(|| ObjectError::UnknownMethod {
                type_tag,
                method: method.to_string(),
            })?;
        thunk(&mut **guard, args)
    }
}

/// Load an object from a file containing a textual object literal
pub fn load_object(path: &Path, catalog: &CatalogSnapshot) -> ObjectResult<ObjectRef> {
    let text = fs::read_to_string(path).map_err(|err| ObjectError::Load {
        path: path.to_path_buf(),
        detail: err.to_string(),
    })?;
    let value = WireValue::parse_text(&text).map_err(|err| ObjectError::Load {
        path: path.to_path_buf(),
        detail: err.to_string(),
    })?;
    match value {
        WireValue::Object(spec) => catalog.instantiate(&spec),
        other => Err(ObjectError::Load {
            path: path.to_path_buf(),
            detail: format!("file holds a {} value, not an object literal", other.kind()),
        }),
    }
}
