//! Typed function tables for the bound native entry points.

use log::debug;
use std::mem;
use std::os::raw::{c_char, c_int, c_uint, c_void};

use super::loader::NativeLibrary;
use crate::error::LoadError;

pub(crate) type VersionFn = unsafe extern "C" fn() -> c_uint;
pub(crate) type MallocFn = unsafe extern "C" fn(usize) -> *mut c_void;
pub(crate) type FreeFn = unsafe extern "C" fn(*mut c_void);
/// Any teardown taking the address of the pointer it releases and nulling it.
pub type TeardownFn = unsafe extern "C" fn(*mut *mut c_void);
pub(crate) type StrerrorFn = unsafe extern "C" fn(c_int, *mut c_char, usize) -> c_int;
pub(crate) type OptGetIntFn = unsafe extern "C" fn(*mut c_void, *const c_char, c_int, *mut i64) -> c_int;
pub(crate) type OptSetIntFn = unsafe extern "C" fn(*mut c_void, *const c_char, i64, c_int) -> c_int;
pub(crate) type LogSetLevelFn = unsafe extern "C" fn(c_int);

pub(crate) type ReadPacketFn = unsafe extern "C" fn(*mut c_void, *mut u8, c_int) -> c_int;
pub(crate) type WritePacketFn = unsafe extern "C" fn(*mut c_void, *const u8, c_int) -> c_int;
pub(crate) type SeekFn = unsafe extern "C" fn(*mut c_void, i64, c_int) -> i64;
pub(crate) type AvioAllocFn = unsafe extern "C" fn(
    *mut u8,
    c_int,
    c_int,
    *mut c_void,
    Option<ReadPacketFn>,
    Option<WritePacketFn>,
    Option<SeekFn>,
) -> *mut c_void;
pub(crate) type AvioFlushFn = unsafe extern "C" fn(*mut c_void);
pub(crate) type AllocContextFn = unsafe extern "C" fn() -> *mut c_void;
pub(crate) type FreeContextFn = unsafe extern "C" fn(*mut c_void);
pub(crate) type OpenInputFn =
    unsafe extern "C" fn(*mut *mut c_void, *const c_char, *const c_void, *mut *mut c_void) -> c_int;
pub(crate) type FindInputFormatFn = unsafe extern "C" fn(*const c_char) -> *const c_void;
pub(crate) type FindStreamInfoFn = unsafe extern "C" fn(*mut c_void, *mut *mut c_void) -> c_int;
pub(crate) type AllocOutputContextFn =
    unsafe extern "C" fn(*mut *mut c_void, *const c_void, *const c_char, *const c_char) -> c_int;
pub(crate) type NewStreamFn = unsafe extern "C" fn(*mut c_void, *const c_void) -> *mut c_void;
pub(crate) type WriteHeaderFn = unsafe extern "C" fn(*mut c_void, *mut *mut c_void) -> c_int;
pub(crate) type WriteFrameFn = unsafe extern "C" fn(*mut c_void, *mut c_void) -> c_int;
pub(crate) type WriteTrailerFn = unsafe extern "C" fn(*mut c_void) -> c_int;

/// Binds symbols from one library, remembering which optional ones were absent.
pub(crate) struct Binder<'a> {
    library: &'static str,
    source: &'a dyn NativeLibrary,
    missing: Vec<&'static str>,
}

impl<'a> Binder<'a> {
    pub(crate) fn new(library: &'static str, source: &'a dyn NativeLibrary) -> Self {
        Binder {
            library,
            source,
            missing: Vec::new(),
        }
    }

    /// # Safety
    /// `F` must be the function pointer type the symbol was exported with.
    pub(crate) unsafe fn optional<F: Copy>(&mut self, symbol: &'static str) -> Option<F> {
        match self.source.symbol(symbol) {
            Some(addr) => Some(cast_symbol(addr)),
            None => {
                debug!("{}: optional symbol {} not exported", self.library, symbol);
                self.missing.push(symbol);
                None
            }
        }
    }

    /// # Safety
    /// As for [`Binder::optional`].
    pub(crate) unsafe fn required<F: Copy>(&mut self, symbol: &'static str) -> Result<F, LoadError> {
        match self.source.symbol(symbol) {
            Some(addr) => Ok(cast_symbol(addr)),
            None => Err(LoadError::SymbolRequiredMissing {
                library: self.library.to_string(),
                symbol: symbol.to_string(),
            }),
        }
    }

    pub(crate) fn missing(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.missing.iter().map(move |symbol| (self.library, *symbol))
    }
}

/// Reinterprets a symbol address as a function pointer.
///
/// # Safety
/// `F` must be a pointer-sized function pointer type matching the symbol.
pub(crate) unsafe fn cast_symbol<F: Copy>(addr: *const c_void) -> F {
    debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<*const c_void>());
    mem::transmute_copy(&addr)
}

#[derive(Clone, Copy)]
pub(crate) struct UtilApi {
    pub version: VersionFn,
    pub malloc: MallocFn,
    pub free: FreeFn,
    pub freep: TeardownFn,
    pub strerror: StrerrorFn,
    pub opt_get_int: Option<OptGetIntFn>,
    pub opt_set_int: Option<OptSetIntFn>,
    pub log_set_level: Option<LogSetLevelFn>,
}

impl UtilApi {
    pub(crate) unsafe fn bind(b: &mut Binder<'_>) -> Result<Self, LoadError> {
        Ok(UtilApi {
            version: b.required("avutil_version")?,
            malloc: b.required("av_malloc")?,
            free: b.required("av_free")?,
            freep: b.required("av_freep")?,
            strerror: b.required("av_strerror")?,
            opt_get_int: b.optional("av_opt_get_int"),
            opt_set_int: b.optional("av_opt_set_int"),
            log_set_level: b.optional("av_log_set_level"),
        })
    }
}

#[derive(Clone, Copy)]
pub(crate) struct CodecApi {
    pub version: VersionFn,
    pub free_context: Option<TeardownFn>,
}

impl CodecApi {
    pub(crate) unsafe fn bind(b: &mut Binder<'_>) -> Result<Self, LoadError> {
        Ok(CodecApi {
            version: b.required("avcodec_version")?,
            free_context: b.optional("avcodec_free_context"),
        })
    }
}

#[derive(Clone, Copy)]
pub(crate) struct FormatApi {
    pub version: VersionFn,
    pub avio_alloc_context: AvioAllocFn,
    pub avio_context_free: TeardownFn,
    pub avio_flush: Option<AvioFlushFn>,
    pub alloc_context: Option<AllocContextFn>,
    pub free_context: Option<FreeContextFn>,
    pub open_input: Option<OpenInputFn>,
    pub close_input: Option<TeardownFn>,
    pub find_input_format: Option<FindInputFormatFn>,
    pub find_stream_info: Option<FindStreamInfoFn>,
    pub alloc_output_context: Option<AllocOutputContextFn>,
    pub new_stream: Option<NewStreamFn>,
    pub write_header: Option<WriteHeaderFn>,
    pub interleaved_write_frame: Option<WriteFrameFn>,
    pub write_trailer: Option<WriteTrailerFn>,
}

impl FormatApi {
    pub(crate) unsafe fn bind(b: &mut Binder<'_>) -> Result<Self, LoadError> {
        Ok(FormatApi {
            version: b.required("avformat_version")?,
            avio_alloc_context: b.required("avio_alloc_context")?,
            avio_context_free: b.required("avio_context_free")?,
            avio_flush: b.optional("avio_flush"),
            alloc_context: b.optional("avformat_alloc_context"),
            free_context: b.optional("avformat_free_context"),
            open_input: b.optional("avformat_open_input"),
            close_input: b.optional("avformat_close_input"),
            find_input_format: b.optional("av_find_input_format"),
            find_stream_info: b.optional("avformat_find_stream_info"),
            alloc_output_context: b.optional("avformat_alloc_output_context2"),
            new_stream: b.optional("avformat_new_stream"),
            write_header: b.optional("avformat_write_header"),
            interleaved_write_frame: b.optional("av_interleaved_write_frame"),
            write_trailer: b.optional("av_write_trailer"),
        })
    }
}

#[derive(Clone, Copy)]
pub(crate) struct ScaleApi {
    pub version: VersionFn,
}

impl ScaleApi {
    pub(crate) unsafe fn bind(b: &mut Binder<'_>) -> Result<Self, LoadError> {
        Ok(ScaleApi {
            version: b.required("swscale_version")?,
        })
    }
}
