//! Muxing into a caller-supplied byte sink.

use log::{debug, warn};
use parking_lot::Mutex;
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use crate::averror;
use crate::bridge::Bridge;
use crate::error::{BridgeError, NativeError, Result};
use crate::fields::{Field, AVFMT_FLAG_CUSTOM_IO};
use crate::handles::Handle;
use crate::io::{IoCallbacks, IoContext, IoMode};
use crate::ptr::NativePtr;
use crate::rational::Rational;

#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    /// I/O buffer size; the configured default when `None`.
    pub buffer_size: Option<usize>,
}

impl OutputOptions {
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Setup,
    HeaderWritten,
    TrailerWritten,
}

/// A native muxer (`AVFormatContext` from `avformat_alloc_output_context2`)
/// writing through an [`IoContext`].
///
/// [`close`](Self::close) (or drop) writes the trailer if the header went
/// out and nobody wrote one, frees the format context, then closes the I/O
/// session, which flushes what is still buffered.
pub struct CustomOutput {
    bridge: Arc<Bridge>,
    ctx: Mutex<NativePtr>,
    stage: Mutex<Stage>,
    io: IoContext,
}

impl CustomOutput {
    /// Sets up a muxer for the container `format` (a muxer short name such
    /// as `"mp4"` or `"matroska"`).
    pub fn open(
        bridge: &Arc<Bridge>,
        callbacks: IoCallbacks,
        format: &str,
        options: OutputOptions,
    ) -> Result<CustomOutput> {
        let api = bridge.format_api();
        let alloc_output = api
            .alloc_output_context
            .ok_or_else(|| BridgeError::unavailable("avformat_alloc_output_context2"))?;
        let free_context = api
            .free_context
            .ok_or_else(|| BridgeError::unavailable("avformat_free_context"))?;
        let format_c = CString::new(format)
            .map_err(|_| BridgeError::InvalidArgument(format!("format name {:?} contains NUL", format)))?;

        let buffer_size = options.buffer_size.unwrap_or(bridge.config().io_buffer_size);
        let io = IoContext::open(bridge, callbacks, IoMode::Write, buffer_size)?;

        let mut ctx = ptr::null_mut();
        let ret = unsafe { alloc_output(&mut ctx, ptr::null(), format_c.as_ptr(), ptr::null::<c_char>()) };
        bridge.check(ret, "avformat_alloc_output_context2")?;
        if ctx.is_null() {
            return Err(NativeError::from_code(averror::ENOMEM, "avformat_alloc_output_context2").into());
        }

        let fields = bridge.fields();
        let ctx_ptr = NativePtr::from_raw(ctx);
        if !fields.set_ptr(Field::FormatIoContext, ctx_ptr, io.as_ptr()) {
            unsafe { free_context(ctx) };
            return Err(BridgeError::unavailable("AVFormatContext.pb"));
        }
        let flags = fields.get_i64(Field::FormatFlags, ctx_ptr);
        if !fields.set_i64(Field::FormatFlags, ctx_ptr, flags | AVFMT_FLAG_CUSTOM_IO) {
            debug!("custom io flag not set explicitly");
        }

        debug!("opened custom output for {}", format);
        Ok(CustomOutput {
            bridge: bridge.clone(),
            ctx: Mutex::new(ctx_ptr),
            stage: Mutex::new(Stage::Setup),
            io,
        })
    }

    /// The `AVFormatContext *`; null once closed.
    pub fn as_ptr(&self) -> NativePtr {
        *self.ctx.lock()
    }

    /// The `AVIOContext *` the muxer writes through; null once closed.
    pub fn io_ptr(&self) -> NativePtr {
        self.io.as_ptr()
    }

    pub fn io_handle(&self) -> Handle {
        self.io.handle()
    }

    /// Adds a stream with `time_base` and returns its index. Codec
    /// parameters are filled in through [`stream`](Self::stream) and the
    /// bridge's field table before [`write_header`](Self::write_header).
    pub fn add_stream(&self, time_base: Rational) -> Result<usize> {
        let new_stream = self
            .bridge
            .format_api()
            .new_stream
            .ok_or_else(|| BridgeError::unavailable("avformat_new_stream"))?;
        let stage = self.stage.lock();
        let ctx = self.ctx_in(*stage, Stage::Setup, "streams can only be added before the header")?;

        let stream = unsafe { new_stream(ctx.as_ptr(), ptr::null()) };
        if stream.is_null() {
            return Err(NativeError::from_code(averror::ENOMEM, "avformat_new_stream").into());
        }
        let fields = self.bridge.fields();
        let stream = NativePtr::from_raw(stream);
        if !fields.set_rational(Field::StreamTimeBase, stream, time_base) {
            warn!("stream time base {} not written, muxer picks one", time_base);
        }
        Ok(fields.get_i64(Field::StreamIndex, stream).max(0) as usize)
    }

    pub fn stream_count(&self) -> usize {
        self.bridge.fields().stream_count(self.as_ptr())
    }

    /// The `AVStream *` at `index`.
    pub fn stream(&self, index: usize) -> Option<NativePtr> {
        self.bridge.fields().stream(self.as_ptr(), index)
    }

    pub fn write_header(&self) -> Result<()> {
        let write_header = self
            .bridge
            .format_api()
            .write_header
            .ok_or_else(|| BridgeError::unavailable("avformat_write_header"))?;
        let mut stage = self.stage.lock();
        let ctx = self.ctx_in(*stage, Stage::Setup, "header already written")?;
        let ret = unsafe { write_header(ctx.as_ptr(), ptr::null_mut()) };
        self.bridge.check(ret, "avformat_write_header")?;
        *stage = Stage::HeaderWritten;
        Ok(())
    }

    /// Hands one packet to `av_interleaved_write_frame`, which takes over its
    /// payload. A null `packet` drains the interleaving queue.
    ///
    /// # Safety
    /// `packet` must be null or a valid `AVPacket *` whose stream index
    /// names a stream of this output.
    pub unsafe fn write_packet(&self, packet: NativePtr) -> Result<()> {
        let write = self
            .bridge
            .format_api()
            .interleaved_write_frame
            .ok_or_else(|| BridgeError::unavailable("av_interleaved_write_frame"))?;
        let stage = self.stage.lock();
        let ctx = self.ctx_in(*stage, Stage::HeaderWritten, "packets need a written header")?;
        let ret = write(ctx.as_ptr(), packet.as_ptr());
        self.bridge.check(ret, "av_interleaved_write_frame")?;
        Ok(())
    }

    /// Finishes the container and flushes the I/O buffer.
    pub fn write_trailer(&self) -> Result<()> {
        let mut stage = self.stage.lock();
        let ctx = self.ctx_in(*stage, Stage::HeaderWritten, "trailer needs a written header")?;
        self.finish(ctx)?;
        *stage = Stage::TrailerWritten;
        Ok(())
    }

    /// Writes a missing trailer, frees the format context, then closes the
    /// I/O session. Later calls do nothing.
    pub fn close(&self) {
        let mut stage = self.stage.lock();
        let mut ctx = self.ctx.lock();
        if !ctx.is_null() {
            if *stage == Stage::HeaderWritten {
                if let Err(err) = self.finish(*ctx) {
                    warn!("trailer not written on close: {}", err);
                }
                *stage = Stage::TrailerWritten;
            }
            match self.bridge.format_api().free_context {
                Some(free_context) => unsafe { free_context(ctx.as_ptr()) },
                None => warn!("avformat_free_context unbound, leaking format context {:?}", *ctx),
            }
            *ctx = NativePtr::null();
        }
        drop(ctx);
        drop(stage);
        self.io.close();
    }

    fn finish(&self, ctx: NativePtr) -> Result<()> {
        let write_trailer = self
            .bridge
            .format_api()
            .write_trailer
            .ok_or_else(|| BridgeError::unavailable("av_write_trailer"))?;
        let ret = unsafe { write_trailer(ctx.as_ptr()) };
        self.bridge.check(ret, "av_write_trailer")?;
        self.io.flush()
    }

    /// Callers hold the stage lock, which also keeps `close` out.
    fn ctx_in(&self, stage: Stage, wanted: Stage, message: &str) -> Result<NativePtr> {
        let ctx = self.as_ptr();
        if ctx.is_null() {
            return Err(BridgeError::InvalidArgument("output is closed".into()));
        }
        if stage != wanted {
            return Err(BridgeError::InvalidArgument(message.into()));
        }
        Ok(ctx)
    }
}

impl Drop for CustomOutput {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CustomOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomOutput")
            .field("ctx", &self.as_ptr())
            .field("stage", &*self.stage.lock())
            .field("io", &self.io)
            .finish()
    }
}
