use std::fmt;
use std::os::raw::c_void;
use std::ptr;

/// An address in memory owned by the native libraries.
///
/// The bridge never dereferences one directly; reads and writes go through
/// [`FieldTable`](crate::fields::FieldTable).
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativePtr(*mut c_void);

// An opaque address; thread affinity is the native library's concern.
unsafe impl Send for NativePtr {}
unsafe impl Sync for NativePtr {}

impl NativePtr {
    pub const fn null() -> Self {
        NativePtr(ptr::null_mut())
    }

    pub fn from_raw<T>(raw: *mut T) -> Self {
        NativePtr(raw.cast())
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    pub fn addr(self) -> usize {
        self.0 as usize
    }
}

impl Default for NativePtr {
    fn default() -> Self {
        NativePtr::null()
    }
}

impl fmt::Debug for NativePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativePtr({:p})", self.0)
    }
}
