//! An in-process stand-in for the FFmpeg libraries.
//!
//! Structs use the real 64-bit layouts for the fields the crate touches, so
//! the offset table is exercised exactly as against avformat 61.

#![allow(dead_code)]

use avbridge::registry::{StaticLibrary, StaticLoader};
use avbridge::{Config, NativePtr};
use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const AVERROR_INVALIDDATA: c_int = -(0x41444e49);

lazy_static! {
    static ref LIVE: Mutex<HashSet<usize>> = Mutex::new(HashSet::new());
    static ref FREED_AVIO: Mutex<HashSet<usize>> = Mutex::new(HashSet::new());
    static ref CLOSED_INPUTS: Mutex<HashSet<usize>> = Mutex::new(HashSet::new());
    static ref FREED_CONTEXTS: Mutex<HashSet<usize>> = Mutex::new(HashSet::new());
}

static LOG_TARGET: AtomicUsize = AtomicUsize::new(0);

const fn packed(major: u32, minor: u32, micro: u32) -> c_uint {
    (major << 16) | (minor << 8) | micro
}

// ---- avutil ----

unsafe extern "C" fn avutil_version() -> c_uint {
    packed(59, 39, 100)
}

unsafe extern "C" fn av_malloc(size: usize) -> *mut c_void {
    let p = libc::malloc(size.max(1));
    if !p.is_null() {
        LIVE.lock().insert(p as usize);
    }
    p
}

unsafe extern "C" fn av_free(p: *mut c_void) {
    if p.is_null() {
        return;
    }
    assert!(LIVE.lock().remove(&(p as usize)), "av_free of unknown pointer {:?}", p);
    libc::free(p);
}

unsafe extern "C" fn av_freep(pp: *mut *mut c_void) {
    av_free(*pp);
    *pp = ptr::null_mut();
}

unsafe extern "C" fn av_strerror(code: c_int, buf: *mut c_char, size: usize) -> c_int {
    let text = format!("fake error {}\0", code);
    let n = text.len().min(size);
    ptr::copy_nonoverlapping(text.as_ptr().cast::<c_char>(), buf, n);
    *buf.add(size - 1) = 0;
    0
}

// ---- avcodec / swscale ----

unsafe extern "C" fn avcodec_version() -> c_uint {
    packed(61, 19, 100)
}

unsafe extern "C" fn swscale_version() -> c_uint {
    packed(8, 3, 100)
}

// ---- avformat: AVIOContext ----

type ReadPacket = unsafe extern "C" fn(*mut c_void, *mut u8, c_int) -> c_int;
type WritePacket = unsafe extern "C" fn(*mut c_void, *const u8, c_int) -> c_int;
type Seek = unsafe extern "C" fn(*mut c_void, i64, c_int) -> i64;

/// Leading members of `AVIOContext`.
#[repr(C)]
pub struct FakeAvio {
    pub av_class: *const c_void,
    pub buffer: *mut u8,
    pub buffer_size: c_int,
    pub buf_ptr: *mut u8,
    pub buf_end: *mut u8,
    pub opaque: *mut c_void,
    pub read_packet: Option<ReadPacket>,
    pub write_packet: Option<WritePacket>,
    pub seek: Option<Seek>,
    pub write_flag: c_int,
}

unsafe extern "C" fn avformat_version() -> c_uint {
    packed(61, 7, 100)
}

unsafe extern "C" fn avio_alloc_context(
    buffer: *mut u8,
    buffer_size: c_int,
    write_flag: c_int,
    opaque: *mut c_void,
    read_packet: Option<ReadPacket>,
    write_packet: Option<WritePacket>,
    seek: Option<Seek>,
) -> *mut c_void {
    let avio = Box::into_raw(Box::new(FakeAvio {
        av_class: ptr::null(),
        buffer,
        buffer_size,
        buf_ptr: buffer,
        buf_end: buffer,
        opaque,
        read_packet,
        write_packet,
        seek,
        write_flag,
    }));
    FREED_AVIO.lock().remove(&(avio as usize));
    avio.cast()
}

unsafe extern "C" fn avio_context_free(pp: *mut *mut c_void) {
    if !(*pp).is_null() {
        FREED_AVIO.lock().insert(*pp as usize);
        drop(Box::from_raw((*pp).cast::<FakeAvio>()));
        *pp = ptr::null_mut();
    }
}

/// Buffers `data` like `avio_write`, writing out whenever the buffer fills.
unsafe fn avio_write(ctx: *mut c_void, data: &[u8]) {
    let avio = &mut *ctx.cast::<FakeAvio>();
    for byte in data {
        let used = avio.buf_ptr.offset_from(avio.buffer) as c_int;
        if used == avio.buffer_size {
            avio_flush(ctx);
        }
        *avio.buf_ptr = *byte;
        avio.buf_ptr = avio.buf_ptr.add(1);
    }
}

unsafe extern "C" fn avio_flush(ctx: *mut c_void) {
    let avio = &mut *ctx.cast::<FakeAvio>();
    let pending = avio.buf_ptr.offset_from(avio.buffer) as c_int;
    if avio.write_flag != 0 && pending > 0 {
        if let Some(write) = avio.write_packet {
            write(avio.opaque, avio.buffer, pending);
        }
    }
    avio.buf_ptr = avio.buffer;
}

// ---- avformat: AVFormatContext ----

const CTX_WORDS: usize = 64;
const STREAM_WORDS: usize = 16;
const CODECPAR_WORDS: usize = 32;

const PB: usize = 32;
const NB_STREAMS: usize = 44;
const STREAMS: usize = 48;
const DURATION: usize = 88;
const BIT_RATE: usize = 96;
const FLAGS: usize = 112;

unsafe fn put<T>(base: *mut c_void, offset: usize, value: T) {
    base.cast::<u8>().add(offset).cast::<T>().write_unaligned(value)
}

unsafe fn at<T>(base: *mut c_void, offset: usize) -> T {
    base.cast::<u8>().add(offset).cast::<T>().read_unaligned()
}

unsafe extern "C" fn avformat_alloc_context() -> *mut c_void {
    let ctx = Box::into_raw(Box::new([0u64; CTX_WORDS]));
    CLOSED_INPUTS.lock().remove(&(ctx as usize));
    FREED_CONTEXTS.lock().remove(&(ctx as usize));
    ctx.cast()
}

unsafe fn free_streams(ctx: *mut c_void) {
    let count = at::<u32>(ctx, NB_STREAMS) as usize;
    let streams = at::<*mut *mut c_void>(ctx, STREAMS);
    if streams.is_null() {
        return;
    }
    let streams = Box::from_raw(ptr::slice_from_raw_parts_mut(streams, count));
    for stream in streams.iter() {
        drop(Box::from_raw(at::<*mut c_void>(*stream, 16).cast::<[u64; CODECPAR_WORDS]>()));
        drop(Box::from_raw(stream.cast::<[u64; STREAM_WORDS]>()));
    }
}

unsafe extern "C" fn avformat_free_context(ctx: *mut c_void) {
    if ctx.is_null() {
        return;
    }
    free_streams(ctx);
    FREED_CONTEXTS.lock().insert(ctx as usize);
    drop(Box::from_raw(ctx.cast::<[u64; CTX_WORDS]>()));
}

unsafe extern "C" fn avformat_close_input(pp: *mut *mut c_void) {
    if (*pp).is_null() {
        return;
    }
    CLOSED_INPUTS.lock().insert(*pp as usize);
    avformat_free_context(*pp);
    *pp = ptr::null_mut();
}

/// Reads the whole header through the custom I/O callbacks.
unsafe fn read_header(avio: &mut FakeAvio) -> Result<Vec<u8>, c_int> {
    let read = avio.read_packet.ok_or(-libc::EINVAL)?;
    let mut data = Vec::new();
    while data.len() < 5 {
        let n = read(avio.opaque, avio.buffer, avio.buffer_size);
        if n < 0 {
            return if data.is_empty() { Err(n) } else { Ok(data) };
        }
        data.extend_from_slice(std::slice::from_raw_parts(avio.buffer, n as usize));
    }
    Ok(data)
}

/// Accepts `FAKE<n>`: `n` H.264 video streams at 1280x720, 1/90000.
unsafe extern "C" fn avformat_open_input(
    ps: *mut *mut c_void,
    _url: *const c_char,
    _fmt: *const c_void,
    _options: *mut *mut c_void,
) -> c_int {
    let ctx = *ps;
    let pb = at::<*mut c_void>(ctx, PB);
    if pb.is_null() {
        avformat_free_context(ctx);
        *ps = ptr::null_mut();
        return -libc::EINVAL;
    }
    put(ctx, FLAGS, at::<i32>(ctx, FLAGS) | 0x0080);

    let header = match read_header(&mut *pb.cast::<FakeAvio>()) {
        Ok(h) if h.len() >= 5 && &h[..4] == b"FAKE" => h,
        Ok(_) => {
            avformat_free_context(ctx);
            *ps = ptr::null_mut();
            return AVERROR_INVALIDDATA;
        }
        Err(code) => {
            avformat_free_context(ctx);
            *ps = ptr::null_mut();
            return code;
        }
    };

    let count = header[4] as usize;
    let streams: Box<[*mut c_void]> = (0..count).map(|i| unsafe { new_fake_stream(i) }).collect();
    put(ctx, NB_STREAMS, count as u32);
    put(ctx, STREAMS, Box::into_raw(streams).cast::<*mut c_void>());
    put(ctx, DURATION, 5_000_000i64);
    put(ctx, BIT_RATE, 800_000i64);
    0
}

unsafe fn new_fake_stream(index: usize) -> *mut c_void {
    let codecpar: *mut c_void = Box::into_raw(Box::new([0u64; CODECPAR_WORDS])).cast();
    put(codecpar, 0, 0i32);
    put(codecpar, 4, 27i32);
    put(codecpar, 56, 1280i32);
    put(codecpar, 60, 720i32);
    let stream: *mut c_void = Box::into_raw(Box::new([0u64; STREAM_WORDS])).cast();
    put(stream, 8, index as i32);
    put(stream, 12, 0x100 + index as i32);
    put(stream, 16, codecpar);
    put(stream, 32, [1i32, 90000]);
    put(stream, 88, [30i32, 1]);
    stream
}

static FAKE_INPUT_FORMAT: u8 = 0;

unsafe extern "C" fn av_find_input_format(name: *const c_char) -> *const c_void {
    match CStr::from_ptr(name).to_bytes() {
        b"fake" => (&FAKE_INPUT_FORMAT as *const u8).cast(),
        _ => ptr::null(),
    }
}

unsafe extern "C" fn avformat_find_stream_info(_ctx: *mut c_void, _options: *mut *mut c_void) -> c_int {
    0
}

// ---- avformat: muxing ----

const OFORMAT: usize = 16;
static FAKE_OUTPUT_FORMAT: u8 = 0;

/// Knows one muxer, `fake`, whose output the fake demuxer reads back.
unsafe extern "C" fn avformat_alloc_output_context2(
    ps: *mut *mut c_void,
    _oformat: *const c_void,
    name: *const c_char,
    _filename: *const c_char,
) -> c_int {
    *ps = ptr::null_mut();
    if name.is_null() || CStr::from_ptr(name).to_bytes() != b"fake" {
        return -libc::EINVAL;
    }
    let ctx = avformat_alloc_context();
    put(ctx, OFORMAT, (&FAKE_OUTPUT_FORMAT as *const u8).cast::<c_void>());
    *ps = ctx;
    0
}

unsafe extern "C" fn avformat_new_stream(ctx: *mut c_void, _codec: *const c_void) -> *mut c_void {
    let count = at::<u32>(ctx, NB_STREAMS) as usize;
    let old = at::<*mut *mut c_void>(ctx, STREAMS);
    let mut streams = if old.is_null() {
        Vec::new()
    } else {
        Box::from_raw(ptr::slice_from_raw_parts_mut(old, count)).into_vec()
    };
    let stream = new_fake_stream(count);
    put(stream, 32, [0i32, 1]);
    streams.push(stream);
    put(ctx, NB_STREAMS, streams.len() as u32);
    put(ctx, STREAMS, Box::into_raw(streams.into_boxed_slice()).cast::<*mut c_void>());
    stream
}

/// Writes `FAKE<n>`, the header the fake demuxer accepts.
unsafe extern "C" fn avformat_write_header(ctx: *mut c_void, _options: *mut *mut c_void) -> c_int {
    let count = at::<u32>(ctx, NB_STREAMS);
    let pb = at::<*mut c_void>(ctx, PB);
    if count == 0 || pb.is_null() {
        return -libc::EINVAL;
    }
    avio_write(pb, b"FAKE");
    avio_write(pb, &[count as u8]);
    0
}

const PACKET_DATA: usize = 24;
const PACKET_SIZE: usize = 32;
const PACKET_WORDS: usize = 16;

/// Copies the packet payload straight to `pb`.
unsafe extern "C" fn av_interleaved_write_frame(ctx: *mut c_void, pkt: *mut c_void) -> c_int {
    if pkt.is_null() {
        return 0;
    }
    let data = at::<*const u8>(pkt, PACKET_DATA);
    let size = at::<c_int>(pkt, PACKET_SIZE);
    if data.is_null() || size < 0 {
        return -libc::EINVAL;
    }
    avio_write(at::<*mut c_void>(ctx, PB), std::slice::from_raw_parts(data, size as usize));
    0
}

unsafe extern "C" fn av_write_trailer(ctx: *mut c_void) -> c_int {
    let pb = at::<*mut c_void>(ctx, PB);
    avio_write(pb, b"END");
    avio_flush(pb);
    0
}

/// An `AVPacket` whose payload points into `data`.
pub fn packet(data: &[u8]) -> Box<[u64; PACKET_WORDS]> {
    let mut pkt = Box::new([0u64; PACKET_WORDS]);
    let base: *mut c_void = pkt.as_mut_ptr().cast();
    unsafe {
        put(base, PACKET_DATA, data.as_ptr());
        put(base, PACKET_SIZE, data.len() as c_int);
    }
    pkt
}

// ---- shim ----

type LogCallback = unsafe extern "C" fn(c_int, *const c_char);

unsafe extern "C" fn avbridge_log_set_callback(callback: Option<LogCallback>) {
    LOG_TARGET.store(callback.map_or(0, |f| f as usize), Ordering::SeqCst);
}

unsafe extern "C" fn avbridge_shim_version() -> c_uint {
    packed(1, 0, 0)
}

/// Emits a native log line through whatever callback the shim holds.
/// Returns whether anything was listening.
pub fn emit_native_log(level: c_int, line: &CStr) -> bool {
    let addr = LOG_TARGET.load(Ordering::SeqCst);
    if addr == 0 {
        return false;
    }
    let callback: LogCallback = unsafe { std::mem::transmute(addr) };
    unsafe { callback(level, line.as_ptr()) };
    true
}

// ---- tables ----

pub fn avutil() -> StaticLibrary {
    StaticLibrary::new("fake:avutil")
        .with_symbol("avutil_version", avutil_version as *const c_void)
        .with_symbol("av_malloc", av_malloc as *const c_void)
        .with_symbol("av_free", av_free as *const c_void)
        .with_symbol("av_freep", av_freep as *const c_void)
        .with_symbol("av_strerror", av_strerror as *const c_void)
}

pub fn avcodec() -> StaticLibrary {
    StaticLibrary::new("fake:avcodec").with_symbol("avcodec_version", avcodec_version as *const c_void)
}

pub fn avformat() -> StaticLibrary {
    StaticLibrary::new("fake:avformat")
        .with_symbol("avformat_version", avformat_version as *const c_void)
        .with_symbol("avio_alloc_context", avio_alloc_context as *const c_void)
        .with_symbol("avio_context_free", avio_context_free as *const c_void)
        .with_symbol("avio_flush", avio_flush as *const c_void)
        .with_symbol("avformat_alloc_context", avformat_alloc_context as *const c_void)
        .with_symbol("avformat_free_context", avformat_free_context as *const c_void)
        .with_symbol("avformat_open_input", avformat_open_input as *const c_void)
        .with_symbol("avformat_close_input", avformat_close_input as *const c_void)
        .with_symbol("av_find_input_format", av_find_input_format as *const c_void)
        .with_symbol("avformat_find_stream_info", avformat_find_stream_info as *const c_void)
        .with_symbol("avformat_alloc_output_context2", avformat_alloc_output_context2 as *const c_void)
        .with_symbol("avformat_new_stream", avformat_new_stream as *const c_void)
        .with_symbol("avformat_write_header", avformat_write_header as *const c_void)
        .with_symbol("av_interleaved_write_frame", av_interleaved_write_frame as *const c_void)
        .with_symbol("av_write_trailer", av_write_trailer as *const c_void)
}

pub fn swscale() -> StaticLibrary {
    StaticLibrary::new("fake:swscale").with_symbol("swscale_version", swscale_version as *const c_void)
}

pub fn shim() -> StaticLibrary {
    StaticLibrary::new("fake:shim")
        .with_symbol("avbridge_shim_version", avbridge_shim_version as *const c_void)
        .with_symbol("avbridge_log_set_callback", avbridge_log_set_callback as *const c_void)
}

/// avutil 59, avcodec 61, avformat 61; no swscale, no shim.
pub fn loader() -> StaticLoader {
    loader_with(avutil(), avcodec(), avformat())
}

pub fn loader_with(util: StaticLibrary, codec: StaticLibrary, format: StaticLibrary) -> StaticLoader {
    StaticLoader::new()
        .with_library("avutil", Some(59), util)
        .with_library("avcodec", Some(61), codec)
        .with_library("avformat", Some(61), format)
}

/// A configuration that ignores the environment and any local config file.
pub fn config() -> Config {
    Config::default()
        .with_library_dir("/fake/lib")
        .with_shim_dir("/fake/shim")
        .with_direct_struct_write(true)
}

// ---- inspection ----

pub fn is_live(p: NativePtr) -> bool {
    LIVE.lock().contains(&p.addr())
}

pub fn avio_freed(p: NativePtr) -> bool {
    FREED_AVIO.lock().contains(&p.addr())
}

pub fn input_closed(p: NativePtr) -> bool {
    CLOSED_INPUTS.lock().contains(&p.addr())
}

pub fn context_freed(p: NativePtr) -> bool {
    FREED_CONTEXTS.lock().contains(&p.addr())
}

/// The fake `AVIOContext` behind a session.
///
/// # Safety
/// `p` must come from an open `IoContext` of the fake loader.
pub unsafe fn avio<'a>(p: NativePtr) -> &'a mut FakeAvio {
    &mut *p.as_ptr().cast::<FakeAvio>()
}

/// Calls the session's read callback the way a demuxer would.
pub fn native_read(p: NativePtr, len: usize) -> Result<Vec<u8>, c_int> {
    let avio = unsafe { avio(p) };
    let read = avio.read_packet.ok_or(-libc::EINVAL)?;
    let len = len.min(avio.buffer_size as usize);
    let n = unsafe { read(avio.opaque, avio.buffer, len as c_int) };
    if n < 0 {
        return Err(n);
    }
    Ok(unsafe { std::slice::from_raw_parts(avio.buffer, n as usize) }.to_vec())
}

/// Buffers `data` the way a muxer would, writing out whenever the buffer fills.
pub fn native_write(p: NativePtr, data: &[u8]) {
    unsafe { avio_write(p.as_ptr(), data) }
}

pub fn native_seek(p: NativePtr, offset: i64, whence: c_int) -> Result<i64, c_int> {
    let avio = unsafe { avio(p) };
    let seek = avio.seek.ok_or(-libc::ENOSYS)?;
    let ret = unsafe { seek(avio.opaque, offset, whence) };
    if ret < 0 {
        Err(ret as c_int)
    } else {
        Ok(ret)
    }
}
