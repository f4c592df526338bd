//! Demuxing from a caller-supplied byte source.

use log::{debug, warn};
use parking_lot::Mutex;
use std::ffi::CString;
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

use crate::averror;
use crate::bridge::Bridge;
use crate::error::{BridgeError, NativeError, Result};
use crate::fields::{Field, AVFMT_FLAG_CUSTOM_IO};
use crate::handles::Handle;
use crate::io::{IoCallbacks, IoContext, IoMode};
use crate::ptr::NativePtr;
use crate::rational::Rational;

/// `AV_NOPTS_VALUE`: no timestamp or duration known.
pub const NOPTS_VALUE: i64 = i64::MIN;

const EMPTY_URL: &[u8] = b"\0";

#[derive(Debug, Clone)]
pub struct InputOptions {
    /// Demuxer short name (e.g. `"mp4"`); probed from the data when `None`.
    pub format: Option<String>,
    /// Run `avformat_find_stream_info` after opening.
    pub find_stream_info: bool,
    /// I/O buffer size; the configured default when `None`.
    pub buffer_size: Option<usize>,
}

impl Default for InputOptions {
    fn default() -> Self {
        InputOptions {
            format: None,
            find_stream_info: true,
            buffer_size: None,
        }
    }
}

impl InputOptions {
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_find_stream_info(mut self, enabled: bool) -> Self {
        self.find_stream_info = enabled;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }
}

/// One stream of an open input, as read through the field table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub index: usize,
    pub id: i64,
    pub time_base: Rational,
    pub avg_frame_rate: Rational,
    /// `AVMediaType` of the stream.
    pub media_type: i64,
    /// `AVCodecID` of the stream.
    pub codec_id: i64,
    pub width: i64,
    pub height: i64,
    pub sample_rate: i64,
    /// The stream's `AVCodecParameters *`.
    pub codecpar: NativePtr,
}

/// A native demuxer (`AVFormatContext`) reading through an [`IoContext`].
///
/// The format context is released before the I/O session, on
/// [`close`](Self::close) or drop.
pub struct CustomInput {
    bridge: Arc<Bridge>,
    ctx: Mutex<NativePtr>,
    io: IoContext,
}

impl CustomInput {
    pub fn open(bridge: &Arc<Bridge>, callbacks: IoCallbacks, options: InputOptions) -> Result<CustomInput> {
        let api = bridge.format_api();
        let alloc_context = api
            .alloc_context
            .ok_or_else(|| BridgeError::unavailable("avformat_alloc_context"))?;
        let open_input = api
            .open_input
            .ok_or_else(|| BridgeError::unavailable("avformat_open_input"))?;
        let close_input = api
            .close_input
            .ok_or_else(|| BridgeError::unavailable("avformat_close_input"))?;

        let input_format = match options.format.as_deref() {
            Some(name) => find_input_format(bridge, name)?,
            None => ptr::null(),
        };

        let buffer_size = options.buffer_size.unwrap_or(bridge.config().io_buffer_size);
        let io = IoContext::open(bridge, callbacks, IoMode::Read, buffer_size)?;

        let mut ctx = unsafe { alloc_context() };
        if ctx.is_null() {
            return Err(NativeError::from_code(averror::ENOMEM, "avformat_alloc_context").into());
        }

        let fields = bridge.fields();
        if !fields.set_ptr(Field::FormatIoContext, NativePtr::from_raw(ctx), io.as_ptr()) {
            match api.free_context {
                Some(free_context) => unsafe { free_context(ctx) },
                None => {
                    let mut slot = NativePtr::from_raw(ctx);
                    unsafe { bridge.allocator().release_staged(&mut slot, close_input) };
                }
            }
            return Err(BridgeError::unavailable("AVFormatContext.pb"));
        }
        // the native side sets this too once pb is present
        let flags = fields.get_i64(Field::FormatFlags, NativePtr::from_raw(ctx));
        if !fields.set_i64(Field::FormatFlags, NativePtr::from_raw(ctx), flags | AVFMT_FLAG_CUSTOM_IO) {
            debug!("custom io flag not set explicitly");
        }

        // on failure the native side frees the context and nulls ctx
        let ret = unsafe {
            open_input(
                &mut ctx,
                EMPTY_URL.as_ptr().cast::<c_char>(),
                input_format,
                ptr::null_mut(),
            )
        };
        bridge.check(ret, "avformat_open_input")?;

        let input = CustomInput {
            bridge: bridge.clone(),
            ctx: Mutex::new(NativePtr::from_raw(ctx)),
            io,
        };

        if options.find_stream_info {
            let find_stream_info = api
                .find_stream_info
                .ok_or_else(|| BridgeError::unavailable("avformat_find_stream_info"))?;
            let ret = unsafe { find_stream_info(ctx, ptr::null_mut()) };
            bridge.check(ret, "avformat_find_stream_info")?;
        }

        debug!("opened custom input with {} streams", input.stream_count());
        Ok(input)
    }

    /// The `AVFormatContext *`; null once closed.
    pub fn as_ptr(&self) -> NativePtr {
        *self.ctx.lock()
    }

    /// The `AVIOContext *` the format context reads through; null once
    /// closed.
    ///
    /// The I/O session itself stays private so it cannot be closed while
    /// `AVFormatContext.pb` still points at it:
    ///
    /// ```compile_fail
    /// # fn f(input: &avbridge::CustomInput) {
    /// input.io().close();
    /// # }
    /// ```
    pub fn io_ptr(&self) -> NativePtr {
        self.io.as_ptr()
    }

    /// Handle of the I/O session's callbacks.
    pub fn io_handle(&self) -> Handle {
        self.io.handle()
    }

    /// Current number of streams. Demuxers may add streams while reading.
    pub fn stream_count(&self) -> usize {
        self.bridge.fields().stream_count(self.as_ptr())
    }

    pub fn stream(&self, index: usize) -> Option<StreamInfo> {
        let fields = self.bridge.fields();
        let stream = fields.stream(self.as_ptr(), index)?;
        let codecpar = fields.get_ptr(Field::StreamCodecPar, stream);
        Some(StreamInfo {
            index: fields.get_i64(Field::StreamIndex, stream).max(0) as usize,
            id: fields.get_i64(Field::StreamId, stream),
            time_base: fields.get_rational(Field::StreamTimeBase, stream),
            avg_frame_rate: fields.get_rational(Field::StreamAvgFrameRate, stream),
            media_type: fields.get_i64(Field::CodecParType, codecpar),
            codec_id: fields.get_i64(Field::CodecParCodecId, codecpar),
            width: fields.get_i64(Field::CodecParWidth, codecpar),
            height: fields.get_i64(Field::CodecParHeight, codecpar),
            sample_rate: fields.get_i64(Field::CodecParSampleRate, codecpar),
            codecpar,
        })
    }

    pub fn streams(&self) -> Vec<StreamInfo> {
        (0..self.stream_count()).filter_map(|i| self.stream(i)).collect()
    }

    pub fn chapter_count(&self) -> usize {
        self.bridge.fields().chapter_count(self.as_ptr())
    }

    /// Container duration, when the demuxer knows it.
    pub fn duration(&self) -> Option<Duration> {
        let raw = self.bridge.fields().get_i64(Field::FormatDuration, self.as_ptr());
        if raw == NOPTS_VALUE || raw <= 0 {
            return None;
        }
        // AV_TIME_BASE is microseconds
        Some(Duration::from_micros(raw as u64))
    }

    /// Total bit rate in bit/s; 0 when unknown.
    pub fn bit_rate(&self) -> i64 {
        self.bridge.fields().get_i64(Field::FormatBitRate, self.as_ptr())
    }

    /// Closes the format context, then the I/O session. Later calls do
    /// nothing.
    pub fn close(&self) {
        let mut ctx = self.ctx.lock();
        if !ctx.is_null() {
            match self.bridge.format_api().close_input {
                Some(close_input) => unsafe {
                    self.bridge.allocator().release_staged(&mut ctx, close_input);
                },
                None => warn!("avformat_close_input unbound, leaking format context {:?}", *ctx),
            }
        }
        drop(ctx);
        self.io.close();
    }
}

impl Drop for CustomInput {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CustomInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomInput")
            .field("ctx", &self.as_ptr())
            .field("io", &self.io)
            .finish()
    }
}

fn find_input_format(bridge: &Bridge, name: &str) -> Result<*const c_void> {
    let find = bridge
        .format_api()
        .find_input_format
        .ok_or_else(|| BridgeError::unavailable("av_find_input_format"))?;
    let name_c = CString::new(name)
        .map_err(|_| BridgeError::InvalidArgument(format!("format name {:?} contains NUL", name)))?;
    let format = unsafe { find(name_c.as_ptr()) };
    if format.is_null() {
        return Err(NativeError::new(
            averror::DEMUXER_NOT_FOUND,
            "av_find_input_format",
            format!("no demuxer named {}", name),
        )
        .into());
    }
    Ok(format)
}
