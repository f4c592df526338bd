use log::{debug, warn};
use parking_lot::Mutex;
use std::os::raw::c_int;
use std::sync::Arc;

use super::callbacks::IoCallbacks;
use super::trampoline::{self, Session};
use crate::averror;
use crate::bridge::Bridge;
use crate::error::{BridgeError, NativeError, Result};
use crate::fields::Field;
use crate::handles::{Handle, HandleTable};
use crate::ptr::NativePtr;
use crate::registry::api::{ReadPacketFn, SeekFn, WritePacketFn};

/// Direction of a custom I/O session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    /// Native code reads (demuxing).
    Read,
    /// Native code writes (muxing).
    Write,
}

/// A native `AVIOContext` driven by Rust callbacks.
///
/// The context, its `av_malloc` buffer and the handle-table entry live until
/// [`close`](Self::close) or drop, whichever comes first. Anything that
/// still holds [`as_ptr`](Self::as_ptr) (a format context, typically) must be
/// released before that.
pub struct IoContext {
    bridge: Arc<Bridge>,
    mode: IoMode,
    handle: Handle,
    avio: Mutex<NativePtr>,
}

impl IoContext {
    pub fn open(
        bridge: &Arc<Bridge>,
        callbacks: IoCallbacks,
        mode: IoMode,
        buffer_size: usize,
    ) -> Result<IoContext> {
        match mode {
            IoMode::Read if !callbacks.has_read() => {
                return Err(BridgeError::InvalidArgument("input session needs a read callback".into()))
            }
            IoMode::Write if !callbacks.has_write() => {
                return Err(BridgeError::InvalidArgument("output session needs a write callback".into()))
            }
            _ => {}
        }
        let size = c_int::try_from(buffer_size)
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| BridgeError::InvalidArgument(format!("buffer size {}", buffer_size)))?;

        let mut buffer = bridge.allocator().buffer(buffer_size)?;
        let seekable = callbacks.has_seek();
        let handle = HandleTable::global().register(Arc::new(Session::new(callbacks)));

        let (read, write): (Option<ReadPacketFn>, Option<WritePacketFn>) = match mode {
            IoMode::Read => (Some(trampoline::read_packet as ReadPacketFn), None),
            IoMode::Write => (None, Some(trampoline::write_packet as WritePacketFn)),
        };
        let seek = seekable.then_some(trampoline::seek as SeekFn);

        let avio = unsafe {
            (bridge.format_api().avio_alloc_context)(
                buffer.as_mut_ptr(),
                size,
                (mode == IoMode::Write) as c_int,
                handle.as_opaque(),
                read,
                write,
                seek,
            )
        };
        if avio.is_null() {
            HandleTable::global().unregister(handle);
            return Err(NativeError::from_code(averror::ENOMEM, "avio_alloc_context").into());
        }
        // the AVIOContext owns the buffer from here on
        let _ = buffer.into_raw();

        debug!(
            "opened {:?} io session {} ({} byte buffer, seekable: {})",
            mode,
            handle.get(),
            buffer_size,
            seekable
        );
        Ok(IoContext {
            bridge: bridge.clone(),
            mode,
            handle,
            avio: Mutex::new(NativePtr::from_raw(avio)),
        })
    }

    /// Opens with the buffer size from the bridge's configuration.
    pub fn open_default(bridge: &Arc<Bridge>, callbacks: IoCallbacks, mode: IoMode) -> Result<IoContext> {
        let size = bridge.config().io_buffer_size;
        Self::open(bridge, callbacks, mode, size)
    }

    /// The `AVIOContext *`; null once closed.
    pub fn as_ptr(&self) -> NativePtr {
        *self.avio.lock()
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn mode(&self) -> IoMode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        self.avio.lock().is_null()
    }

    /// Pushes buffered output through the write callback.
    pub fn flush(&self) -> Result<()> {
        let avio = self.avio.lock();
        if avio.is_null() {
            return Err(BridgeError::InvalidArgument("io session is closed".into()));
        }
        let flush = self
            .bridge
            .format_api()
            .avio_flush
            .ok_or_else(|| BridgeError::unavailable("avio_flush"))?;
        unsafe { flush(avio.as_ptr()) };
        Ok(())
    }

    /// Releases the buffer, the context and the handle. Later calls do
    /// nothing.
    pub fn close(&self) {
        let mut avio = self.avio.lock();
        if avio.is_null() {
            return;
        }

        let api = self.bridge.format_api();
        if self.mode == IoMode::Write {
            if let Some(flush) = api.avio_flush {
                unsafe { flush(avio.as_ptr()) };
            }
        }

        // the native side may have replaced the buffer we handed over
        let mut buffer = self.bridge.fields().get_ptr(Field::IoBuffer, *avio);
        let allocator = self.bridge.allocator();
        unsafe {
            if buffer.is_null() {
                warn!("io session {}: buffer pointer unreadable, not freed", self.handle.get());
            } else {
                allocator.freep(&mut buffer);
            }
            allocator.release_staged(&mut avio, api.avio_context_free);
        }

        HandleTable::global().unregister(self.handle);
        debug!("closed io session {}", self.handle.get());
    }
}

impl Drop for IoContext {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for IoContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoContext")
            .field("mode", &self.mode)
            .field("handle", &self.handle)
            .field("avio", &self.as_ptr())
            .finish()
    }
}
