//! Memory shared with the native libraries.
//!
//! Buffers that native code may free or reallocate must come from the native
//! allocator, and teardown functions that take a pointer-to-pointer are
//! always handed an address inside native memory.

use log::warn;
use std::mem;
use std::os::raw::c_void;
use std::ptr::{self, NonNull};
use std::slice;

use crate::averror;
use crate::error::{BridgeError, NativeError, Result};
use crate::ptr::NativePtr;
use crate::registry::api::{FreeFn, MallocFn};

pub use crate::registry::api::TeardownFn;

/// `av_malloc` / `av_free` / `av_freep` from the loaded avutil.
#[derive(Clone, Copy)]
pub struct NativeAllocator {
    malloc: MallocFn,
    free: FreeFn,
    freep: TeardownFn,
}

impl NativeAllocator {
    pub(crate) fn new(malloc: MallocFn, free: FreeFn, freep: TeardownFn) -> Self {
        NativeAllocator { malloc, free, freep }
    }

    /// Raw allocation; `None` when the native allocator returns null.
    pub fn alloc(&self, size: usize) -> Option<NativePtr> {
        let raw = unsafe { (self.malloc)(size) };
        (!raw.is_null()).then(|| NativePtr::from_raw(raw))
    }

    /// A zeroed buffer of `len` bytes owned by Rust until
    /// [`NativeBuffer::into_raw`].
    pub fn buffer(&self, len: usize) -> Result<NativeBuffer<'_>> {
        if len == 0 {
            return Err(BridgeError::InvalidArgument("buffer size must be positive".into()));
        }
        let ptr = self
            .alloc(len)
            .and_then(|p| NonNull::new(p.as_ptr().cast::<u8>()))
            .ok_or_else(|| NativeError::from_code(averror::ENOMEM, "av_malloc"))?;
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, len) };
        Ok(NativeBuffer {
            allocator: self,
            ptr,
            len,
        })
    }

    /// # Safety
    /// `ptr` must come from this allocator and not be used afterwards.
    pub unsafe fn free(&self, ptr: NativePtr) {
        (self.free)(ptr.as_ptr());
    }

    /// Releases `*slot` with `av_freep`, staged like [`release_staged`](Self::release_staged).
    ///
    /// # Safety
    /// `*slot` must be null or a live allocation from this allocator.
    pub unsafe fn freep(&self, slot: &mut NativePtr) -> bool {
        self.release_staged(slot, self.freep)
    }

    /// Calls a pointer-to-pointer teardown through a staging block.
    ///
    /// The pointer is copied into a pointer-sized block from the native
    /// allocator, `teardown` receives the block's address, and the block is
    /// freed afterwards. If the block cannot be allocated, `teardown` gets the
    /// caller's slot directly. `*slot` is null on return either way; a null
    /// slot is left alone. Returns `true` when the staging block was used.
    ///
    /// # Safety
    /// `teardown` must accept `*slot` and tolerate being handed its address.
    pub unsafe fn release_staged(&self, slot: &mut NativePtr, teardown: TeardownFn) -> bool {
        if slot.is_null() {
            return false;
        }

        let staging = (self.malloc)(mem::size_of::<*mut c_void>()).cast::<*mut c_void>();
        if staging.is_null() {
            warn!("staging block allocation failed, tearing down {:?} in place", slot);
            teardown((slot as *mut NativePtr).cast::<*mut c_void>());
            *slot = NativePtr::null();
            return false;
        }

        staging.write(slot.as_ptr());
        teardown(staging);
        (self.free)(staging.cast());
        *slot = NativePtr::null();
        true
    }
}

/// An `av_malloc` region. Freed with `av_free` on drop unless ownership was
/// passed to native code with [`into_raw`](Self::into_raw).
pub struct NativeBuffer<'a> {
    allocator: &'a NativeAllocator,
    ptr: NonNull<u8>,
    len: usize,
}

impl NativeBuffer<'_> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Gives up ownership; the caller must arrange a native release.
    pub fn into_raw(self) -> NativePtr {
        let ptr = NativePtr::from_raw(self.ptr.as_ptr());
        mem::forget(self);
        ptr
    }
}

impl Drop for NativeBuffer<'_> {
    fn drop(&mut self) {
        unsafe { self.allocator.free(NativePtr::from_raw(self.ptr.as_ptr())) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    thread_local! {
        static LIVE: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
    }

    unsafe extern "C" fn test_malloc(size: usize) -> *mut c_void {
        let p = libc::malloc(size);
        LIVE.with(|live| live.borrow_mut().push(p as usize));
        p
    }

    unsafe extern "C" fn failing_malloc(_size: usize) -> *mut c_void {
        ptr::null_mut()
    }

    unsafe extern "C" fn test_free(p: *mut c_void) {
        if !p.is_null() {
            LIVE.with(|live| live.borrow_mut().retain(|a| *a != p as usize));
            libc::free(p);
        }
    }

    unsafe extern "C" fn test_freep(pp: *mut *mut c_void) {
        test_free(*pp);
        *pp = ptr::null_mut();
    }

    fn live(p: NativePtr) -> bool {
        LIVE.with(|live| live.borrow().contains(&p.addr()))
    }

    fn allocator() -> NativeAllocator {
        NativeAllocator::new(test_malloc, test_free, test_freep)
    }

    #[test]
    fn test_staged_release() {
        let alloc = allocator();

        let target = alloc.alloc(64).unwrap();
        let mut slot = target;
        assert!(unsafe { alloc.freep(&mut slot) });
        assert!(slot.is_null());
        assert!(!live(target));

        // null slot is untouched
        assert!(!unsafe { alloc.freep(&mut slot) });
    }

    #[test]
    fn test_release_in_place_without_staging_block() {
        let target = allocator().alloc(16).unwrap();
        let mut slot = target;
        let starved = NativeAllocator::new(failing_malloc, test_free, test_freep);
        let staged = unsafe { starved.freep(&mut slot) };
        assert!(!staged);
        assert!(slot.is_null());
        assert!(!live(target));
    }

    #[test]
    fn test_buffer_drop_frees() {
        let alloc = allocator();
        let mut buffer = alloc.buffer(128).unwrap();
        assert_eq!(buffer.len(), 128);
        assert!(buffer.as_slice().iter().all(|b| *b == 0));
        buffer.as_mut_slice()[0] = 7;
        let addr = NativePtr::from_raw(buffer.as_mut_ptr());
        assert!(live(addr));
        drop(buffer);
        assert!(!live(addr));
    }

    #[test]
    fn test_buffer_into_raw_transfers() {
        let alloc = allocator();
        let buffer = alloc.buffer(32).unwrap();
        let raw = buffer.into_raw();
        assert!(live(raw));
        let mut slot = raw;
        unsafe { alloc.freep(&mut slot) };
        assert!(!live(raw));
    }

    #[test]
    fn test_zero_sized_buffer_rejected() {
        assert!(matches!(
            allocator().buffer(0),
            Err(BridgeError::InvalidArgument(_))
        ));
    }
}
