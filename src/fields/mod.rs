//! # Struct field access across ABI drift
//!
//! Native structs change layout between library releases, so no field is
//! ever read at a compiled-in offset directly. Every access goes through a
//! [`FieldTable`], which picks one [`FieldAccessor`] per field and direction
//! the first time it is needed and reuses it afterwards:
//!
//! 1. the stable option API (`av_opt_get_int` / `av_opt_set_int`), for
//!    fields that have a named option on AVOptions-enabled structs;
//! 2. the compiled shim, whose accessors were built against real headers;
//! 3. the offset table for the loaded major version. Writes through this
//!    tier need [`Capabilities::supports_direct_struct_write`].
//!
//! When no tier can serve a field, reads return its zero value and writes
//! return `false`.

mod offsets;
mod tiers;

use log::{debug, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::os::raw::c_void;
use std::sync::Arc;

use crate::platform::Capabilities;
use crate::ptr::NativePtr;
use crate::rational::Rational;
use crate::shim::Shim;

pub use tiers::{FieldAccessor, Tier};
pub(crate) use tiers::{shim_getter_name, shim_setter_name, StableOptions};

use offsets::Lookup;
use tiers::{OffsetAccessor, ShimAccessor, StableApiAccessor, Unavailable};

const OFFSET_POINTER_WIDTH: usize = 8;

/// `AVFMT_FLAG_CUSTOM_IO`
pub const AVFMT_FLAG_CUSTOM_IO: i64 = 0x0080;

/// Native struct types reachable through the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructKind {
    FormatContext,
    Stream,
    Chapter,
    OutputFormat,
    IoContext,
    CodecParameters,
    CodecContext,
    Packet,
    Frame,
}

/// Library whose major version decides a struct's layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Util,
    Codec,
    Format,
}

impl StructKind {
    /// Infix used by the shim's export names.
    pub fn shim_prefix(self) -> &'static str {
        match self {
            StructKind::FormatContext => "formatctx",
            StructKind::Stream => "stream",
            StructKind::Chapter => "chapter",
            StructKind::OutputFormat => "outputformat",
            StructKind::IoContext => "ioctx",
            StructKind::CodecParameters => "codecpar",
            StructKind::CodecContext => "codecctx",
            StructKind::Packet => "packet",
            StructKind::Frame => "frame",
        }
    }

    pub fn owner(self) -> Owner {
        match self {
            StructKind::FormatContext
            | StructKind::Stream
            | StructKind::Chapter
            | StructKind::OutputFormat
            | StructKind::IoContext => Owner::Format,
            StructKind::CodecParameters | StructKind::CodecContext | StructKind::Packet => Owner::Codec,
            StructKind::Frame => Owner::Util,
        }
    }
}

/// In-memory representation of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Repr {
    I32,
    U32,
    I64,
    Ptr,
    /// Two consecutive `i32`s.
    Rational,
}

impl Repr {
    pub fn align(self) -> usize {
        match self {
            Repr::I32 | Repr::U32 | Repr::Rational => 4,
            Repr::I64 => 8,
            Repr::Ptr => std::mem::align_of::<*const c_void>(),
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Repr::I32 | Repr::U32 | Repr::I64)
    }

    /// `value` as an integer that fits this representation.
    pub(crate) fn integer(self, value: FieldValue) -> Option<i64> {
        let FieldValue::Int(v) = value else {
            return None;
        };
        match self {
            Repr::I32 => i32::try_from(v).ok().map(i64::from),
            Repr::U32 => u32::try_from(v).ok().map(i64::from),
            Repr::I64 => Some(v),
            Repr::Ptr | Repr::Rational => None,
        }
    }
}

/// Read or write; accessors are resolved separately for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
}

macro_rules! fields {
    ($($variant:ident => ($kind:ident, $name:literal, $repr:ident, $option:expr)),* $(,)?) => {
        /// A field of a native struct.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Field {
            $($variant),*
        }

        impl Field {
            pub const ALL: &'static [Field] = &[$(Field::$variant),*];

            pub fn kind(self) -> StructKind {
                match self {
                    $(Field::$variant => StructKind::$kind),*
                }
            }

            /// Member name as spelled in the native header.
            pub fn name(self) -> &'static str {
                match self {
                    $(Field::$variant => $name),*
                }
            }

            pub fn repr(self) -> Repr {
                match self {
                    $(Field::$variant => Repr::$repr),*
                }
            }

            /// AVOption name reaching the same member, if any.
            pub fn option_name(self) -> Option<&'static str> {
                match self {
                    $(Field::$variant => $option),*
                }
            }
        }
    };
}

fields! {
    FormatOutputFormat => (FormatContext, "oformat", Ptr, None),
    FormatIoContext => (FormatContext, "pb", Ptr, None),
    FormatNbStreams => (FormatContext, "nb_streams", U32, None),
    FormatStreams => (FormatContext, "streams", Ptr, None),
    FormatDuration => (FormatContext, "duration", I64, None),
    FormatBitRate => (FormatContext, "bit_rate", I64, None),
    FormatFlags => (FormatContext, "flags", I32, Some("fflags")),
    FormatNbChapters => (FormatContext, "nb_chapters", U32, None),
    FormatChapters => (FormatContext, "chapters", Ptr, None),
    FormatMetadata => (FormatContext, "metadata", Ptr, None),

    StreamIndex => (Stream, "index", I32, None),
    StreamId => (Stream, "id", I32, None),
    StreamCodecPar => (Stream, "codecpar", Ptr, None),
    StreamTimeBase => (Stream, "time_base", Rational, None),
    StreamMetadata => (Stream, "metadata", Ptr, None),
    StreamAvgFrameRate => (Stream, "avg_frame_rate", Rational, None),

    ChapterId => (Chapter, "id", I64, None),
    ChapterTimeBase => (Chapter, "time_base", Rational, None),
    ChapterStart => (Chapter, "start", I64, None),
    ChapterEnd => (Chapter, "end", I64, None),
    ChapterMetadata => (Chapter, "metadata", Ptr, None),

    OutputFormatFlags => (OutputFormat, "flags", I32, None),

    IoBuffer => (IoContext, "buffer", Ptr, None),
    IoBufferSize => (IoContext, "buffer_size", I32, None),

    CodecParType => (CodecParameters, "codec_type", I32, None),
    CodecParCodecId => (CodecParameters, "codec_id", I32, None),
    CodecParFormat => (CodecParameters, "format", I32, None),
    CodecParWidth => (CodecParameters, "width", I32, None),
    CodecParHeight => (CodecParameters, "height", I32, None),
    CodecParSampleRate => (CodecParameters, "sample_rate", I32, None),
    CodecParChannels => (CodecParameters, "channels", I32, None),

    CodecCtxType => (CodecContext, "codec_type", I32, None),
    CodecCtxCodecId => (CodecContext, "codec_id", I32, None),
    CodecCtxBitRate => (CodecContext, "bit_rate", I64, Some("b")),
    CodecCtxFlags => (CodecContext, "flags", I32, Some("flags")),
    CodecCtxTimeBase => (CodecContext, "time_base", Rational, None),
    CodecCtxWidth => (CodecContext, "width", I32, None),
    CodecCtxHeight => (CodecContext, "height", I32, None),
    CodecCtxGopSize => (CodecContext, "gop_size", I32, Some("g")),
    CodecCtxPixFmt => (CodecContext, "pix_fmt", I32, None),
    CodecCtxMaxBFrames => (CodecContext, "max_b_frames", I32, Some("bf")),
    CodecCtxSampleRate => (CodecContext, "sample_rate", I32, Some("ar")),
    CodecCtxSampleFmt => (CodecContext, "sample_fmt", I32, None),
    CodecCtxFrameSize => (CodecContext, "frame_size", I32, None),
    CodecCtxFramerate => (CodecContext, "framerate", Rational, None),
    CodecCtxChannels => (CodecContext, "channels", I32, None),

    PacketPts => (Packet, "pts", I64, None),
    PacketDts => (Packet, "dts", I64, None),
    PacketData => (Packet, "data", Ptr, None),
    PacketSize => (Packet, "size", I32, None),
    PacketStreamIndex => (Packet, "stream_index", I32, None),
    PacketFlags => (Packet, "flags", I32, None),
    PacketDuration => (Packet, "duration", I64, None),
    PacketPos => (Packet, "pos", I64, None),

    FrameWidth => (Frame, "width", I32, None),
    FrameHeight => (Frame, "height", I32, None),
    FrameNbSamples => (Frame, "nb_samples", I32, None),
    FrameFormat => (Frame, "format", I32, None),
    FramePts => (Frame, "pts", I64, None),
    FrameSampleRate => (Frame, "sample_rate", I32, None),
}

impl Field {
    /// Finds a field by struct kind and header member name.
    pub fn lookup(kind: StructKind, name: &str) -> Option<Field> {
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.kind() == kind && f.name() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind().shim_prefix(), self.name())
    }
}

/// A value read from or written to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Int(i64),
    Ptr(NativePtr),
    Rational(Rational),
}

impl FieldValue {
    /// What an unreadable field of this representation reports.
    pub fn zero(repr: Repr) -> Self {
        match repr {
            Repr::I32 | Repr::U32 | Repr::I64 => FieldValue::Int(0),
            Repr::Ptr => FieldValue::Ptr(NativePtr::null()),
            Repr::Rational => FieldValue::Rational(Rational::new(0, 1)),
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            FieldValue::Int(v) => v,
            _ => 0,
        }
    }

    pub fn as_ptr(self) -> NativePtr {
        match self {
            FieldValue::Ptr(p) => p,
            _ => NativePtr::null(),
        }
    }

    pub fn as_rational(self) -> Rational {
        match self {
            FieldValue::Rational(r) => r,
            _ => Rational::new(0, 1),
        }
    }
}

/// Major versions of the libraries that own struct layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerMajors {
    pub util: u32,
    pub codec: u32,
    pub format: u32,
}

impl OwnerMajors {
    fn of(&self, owner: Owner) -> u32 {
        match owner {
            Owner::Util => self.util,
            Owner::Codec => self.codec,
            Owner::Format => self.format,
        }
    }
}

type CacheKey = (Field, Access);

/// Per-process field accessor registry.
pub struct FieldTable {
    stable: Option<StableOptions>,
    shim: Option<Arc<Shim>>,
    majors: OwnerMajors,
    capabilities: Capabilities,
    cache: RwLock<HashMap<CacheKey, Arc<dyn FieldAccessor>>>,
}

impl FieldTable {
    pub(crate) fn new(
        stable: Option<StableOptions>,
        shim: Option<Arc<Shim>>,
        majors: OwnerMajors,
        capabilities: Capabilities,
    ) -> Self {
        FieldTable {
            stable,
            shim,
            majors,
            capabilities,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Reads `field` from `obj`. Null objects and unreachable fields yield
    /// the zero value.
    ///
    /// `obj` must be null or point to a live struct of `field.kind()`.
    pub fn get(&self, field: Field, obj: NativePtr) -> FieldValue {
        if obj.is_null() {
            return FieldValue::zero(field.repr());
        }
        let accessor = self.resolve(field, Access::Read, obj);
        unsafe { accessor.get(obj) }.unwrap_or_else(|| FieldValue::zero(field.repr()))
    }

    /// Writes `field` on `obj`; `false` when nothing could perform the write
    /// or the value does not fit the field.
    ///
    /// `obj` must be null or point to a live struct of `field.kind()`.
    pub fn set(&self, field: Field, obj: NativePtr, value: FieldValue) -> bool {
        if obj.is_null() {
            return false;
        }
        let accessor = self.resolve(field, Access::Write, obj);
        let done = unsafe { accessor.set(obj, value) };
        if !done {
            debug!("{} not written ({} tier)", field, accessor.tier());
        }
        done
    }

    pub fn get_i64(&self, field: Field, obj: NativePtr) -> i64 {
        self.get(field, obj).as_i64()
    }

    /// Like [`get_i64`](Self::get_i64); a value outside the `i32` range
    /// reads as 0.
    pub fn get_i32(&self, field: Field, obj: NativePtr) -> i32 {
        let value = self.get_i64(field, obj);
        i32::try_from(value).unwrap_or_else(|_| {
            debug!("{} value {} does not fit an i32", field, value);
            0
        })
    }

    pub fn get_ptr(&self, field: Field, obj: NativePtr) -> NativePtr {
        self.get(field, obj).as_ptr()
    }

    pub fn get_rational(&self, field: Field, obj: NativePtr) -> Rational {
        self.get(field, obj).as_rational()
    }

    pub fn set_i64(&self, field: Field, obj: NativePtr, value: i64) -> bool {
        self.set(field, obj, FieldValue::Int(value))
    }

    pub fn set_ptr(&self, field: Field, obj: NativePtr, value: NativePtr) -> bool {
        self.set(field, obj, FieldValue::Ptr(value))
    }

    pub fn set_rational(&self, field: Field, obj: NativePtr, value: Rational) -> bool {
        self.set(field, obj, FieldValue::Rational(value))
    }

    /// Element `index` of the pointer array `array`, bounded by `count`.
    ///
    /// The count is read again on every call; indices are never cached.
    pub fn element(&self, count: Field, array: Field, obj: NativePtr, index: usize) -> Option<NativePtr> {
        let len = self.get_i64(count, obj);
        if len <= 0 || index as u64 >= len as u64 {
            return None;
        }
        let base = self.get_ptr(array, obj);
        if base.is_null() {
            return None;
        }
        let item = unsafe { base.as_ptr().cast::<*mut c_void>().add(index).read() };
        (!item.is_null()).then(|| NativePtr::from_raw(item))
    }

    pub fn stream_count(&self, format_ctx: NativePtr) -> usize {
        self.get_i64(Field::FormatNbStreams, format_ctx).max(0) as usize
    }

    pub fn stream(&self, format_ctx: NativePtr, index: usize) -> Option<NativePtr> {
        self.element(Field::FormatNbStreams, Field::FormatStreams, format_ctx, index)
    }

    pub fn chapter_count(&self, format_ctx: NativePtr) -> usize {
        self.get_i64(Field::FormatNbChapters, format_ctx).max(0) as usize
    }

    pub fn chapter(&self, format_ctx: NativePtr, index: usize) -> Option<NativePtr> {
        self.element(Field::FormatNbChapters, Field::FormatChapters, format_ctx, index)
    }

    /// Tier already chosen for `field`, if it has been used.
    pub fn tier(&self, field: Field, access: Access) -> Option<Tier> {
        self.cache.read().get(&(field, access)).map(|a| a.tier())
    }

    fn resolve(&self, field: Field, access: Access, obj: NativePtr) -> Arc<dyn FieldAccessor> {
        if let Some(accessor) = self.cache.read().get(&(field, access)) {
            return accessor.clone();
        }

        let mut cache = self.cache.write();
        // another thread may have resolved it meanwhile
        if let Some(accessor) = cache.get(&(field, access)) {
            return accessor.clone();
        }
        let accessor = self.select(field, access, obj);
        debug!("{} {:?} resolved to {} tier", field, access, accessor.tier());
        cache.insert((field, access), accessor.clone());
        accessor
    }

    fn select(&self, field: Field, access: Access, obj: NativePtr) -> Arc<dyn FieldAccessor> {
        if let Some(api) = self.stable {
            if let Some(accessor) = unsafe { StableApiAccessor::probe(api, field, access, obj) } {
                return Arc::new(accessor);
            }
        }

        if let Some(shim) = &self.shim {
            if let Some(accessor) = ShimAccessor::bind(shim, field, access) {
                return Arc::new(accessor);
            }
        }

        // every recorded offset assumes 8-byte pointers
        if self.capabilities.pointer_width != OFFSET_POINTER_WIDTH {
            debug!(
                "{}: offset tier disabled for {}-byte pointers",
                field, self.capabilities.pointer_width
            );
            return Arc::new(Unavailable);
        }

        let major = self.majors.of(field.kind().owner());
        match offsets::lookup(field, major) {
            Lookup::Found(offset) => {
                let writable = self.capabilities.supports_direct_struct_write;
                if access == Access::Write && !writable {
                    debug!("{}: raw writes disabled on this platform", field);
                    return Arc::new(Unavailable);
                }
                Arc::new(OffsetAccessor::new(offset, field.repr(), writable))
            }
            Lookup::OtherVersions => {
                warn!(
                    "{}: no offset recorded for {:?} major {}, field unavailable",
                    field,
                    field.kind().owner(),
                    major
                );
                Arc::new(Unavailable)
            }
            Lookup::NotListed => Arc::new(Unavailable),
        }
    }
}
