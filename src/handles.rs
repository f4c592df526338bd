//! Process-wide table mapping opaque integer handles to Rust objects.
//!
//! Native code only ever sees the integer, passed through a `void *`
//! argument; the object itself stays owned by the table until it is
//! unregistered.

use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::os::raw::c_void;
use std::sync::Arc;

type Entry = Arc<dyn Any + Send + Sync>;

lazy_static! {
    static ref GLOBAL: HandleTable = HandleTable::new();
}

/// A non-zero key into a [`HandleTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(NonZeroUsize);

impl Handle {
    pub fn get(self) -> usize {
        self.0.get()
    }

    /// The value handed to native code as the `opaque` argument.
    pub fn as_opaque(self) -> *mut c_void {
        self.0.get() as *mut c_void
    }

    /// Recovers a handle from an `opaque` argument; null yields `None`.
    pub fn from_opaque(opaque: *mut c_void) -> Option<Handle> {
        NonZeroUsize::new(opaque as usize).map(Handle)
    }
}

#[derive(Default)]
struct Slots {
    last: usize,
    entries: HashMap<usize, Entry>,
}

/// Keys start at 1 and only grow, so a handle is never reissued while the
/// process lives.
#[derive(Default)]
pub struct HandleTable {
    slots: RwLock<Slots>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table used by the native callback trampolines.
    pub fn global() -> &'static HandleTable {
        &GLOBAL
    }

    pub fn register<T: Any + Send + Sync>(&self, value: Arc<T>) -> Handle {
        let mut slots = self.slots.write();
        let mut key = slots.last.wrapping_add(1);
        // only reachable after usize::MAX registrations
        while key == 0 || slots.entries.contains_key(&key) {
            key = key.wrapping_add(1);
        }
        slots.last = key;
        slots.entries.insert(key, value);
        match NonZeroUsize::new(key) {
            Some(key) => Handle(key),
            None => unreachable!("handle keys skip zero"),
        }
    }

    /// The object behind `handle`, if it is live and of type `T`.
    pub fn lookup<T: Any + Send + Sync>(&self, handle: Handle) -> Option<Arc<T>> {
        self.lookup_any(handle)?.downcast::<T>().ok()
    }

    pub fn lookup_any(&self, handle: Handle) -> Option<Arc<dyn Any + Send + Sync>> {
        self.slots.read().entries.get(&handle.get()).cloned()
    }

    /// Removes `handle`. Returns whether it was live.
    pub fn unregister(&self, handle: Handle) -> bool {
        self.slots.write().entries.remove(&handle.get()).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
