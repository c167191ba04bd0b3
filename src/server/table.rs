//! Per-session object table and handle allocation

use rand::Rng;
use std::collections::HashMap;

use crate::error::{ObjectError, ObjectResult};
use crate::object::ObjectRef;

/// Upper bound (exclusive) for server-allocated handles
pub const HANDLE_SPACE: i32 = 2_000_000_000;

/// Rejection-sampling attempts before allocation gives up
pub const ALLOC_RETRY_BUDGET: u32 = 100;

/// Mapping from integer handle to owned object instance
///
/// Owned exclusively by one session; entries live until deleted, cleared,
/// or the session ends. Inserting at an occupied handle silently replaces
/// the previous object; no collision check is performed.
#[derive(Default)]
pub struct ObjectTable {
    objects: HashMap<i32, ObjectRef>,
}

impl ObjectTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object at `handle`, replacing any previous entry
    pub fn insert(&mut self, handle: i32, obj: ObjectRef) {
        self.objects.insert(handle, obj);
    }

    /// Remove and return the object at `handle`
    pub fn remove(&mut self, handle: i32) -> ObjectResult<ObjectRef> {
        self.objects
            .remove(&handle)
            .ok_or(ObjectError::HandleNotFound(handle))
    }

    /// Look up the object at `handle`
    pub fn get(&self, handle: i32) -> Option<ObjectRef> {
        self.objects.get(&handle).cloned()
    }

    /// Whether `handle` is present
    pub fn contains(&self, handle: i32) -> bool {
        self.objects.contains_key(&handle)
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.objects.clear();
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if the table holds no objects
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterate over `(handle, object)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&i32, &ObjectRef)> {
        self.objects.iter()
    }

    /// Pick an unused handle by uniform-random rejection sampling
    ///
    /// Sampling is over `[0, HANDLE_SPACE)` with a bounded retry budget;
    /// exhausting the budget is an error, not a fallback to scanning.
    pub fn allocate_handle(&self) -> ObjectResult<i32> {
        let mut rng = rand::thread_rng();
        for _ in 0..ALLOC_RETRY_BUDGET {
            let candidate = rng.gen_range(0..HANDLE_SPACE);
            if !self.objects.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(ObjectError::HandleSpaceExhausted {
            attempts: ALLOC_RETRY_BUDGET,
        })
    }
}
