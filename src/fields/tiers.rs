use std::ffi::CString;
use std::fmt;
use std::os::raw::c_void;

use super::{Access, Field, FieldValue, Repr};
use crate::ptr::NativePtr;
use crate::rational::Rational;
use crate::registry::api::{cast_symbol, OptGetIntFn, OptSetIntFn};
use crate::shim::Shim;

/// Which mechanism reads or writes a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// `av_opt_get_int` / `av_opt_set_int`
    StableApi,
    Shim,
    Offset,
    /// No mechanism; reads yield zero and writes are dropped.
    Unavailable,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::StableApi => "stable api",
            Tier::Shim => "shim",
            Tier::Offset => "offset table",
            Tier::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// One way of touching one field.
pub trait FieldAccessor: Send + Sync {
    fn tier(&self) -> Tier;

    /// # Safety
    /// `obj` must point to a live struct of the field's kind.
    unsafe fn get(&self, obj: NativePtr) -> Option<FieldValue>;

    /// # Safety
    /// As for [`FieldAccessor::get`].
    unsafe fn set(&self, obj: NativePtr, value: FieldValue) -> bool;
}

#[derive(Clone, Copy)]
pub(crate) struct StableOptions {
    pub get_int: OptGetIntFn,
    pub set_int: Option<OptSetIntFn>,
}

pub(crate) struct StableApiAccessor {
    option: CString,
    repr: Repr,
    api: StableOptions,
}

impl StableApiAccessor {
    /// Usable when the field has a named integer option and `obj` answers it.
    pub(crate) unsafe fn probe(
        api: StableOptions,
        field: Field,
        access: Access,
        obj: NativePtr,
    ) -> Option<Self> {
        let name = field.option_name()?;
        if !field.repr().is_integer() || (access == Access::Write && api.set_int.is_none()) {
            return None;
        }
        let option = CString::new(name).ok()?;
        let mut probe = 0i64;
        if (api.get_int)(obj.as_ptr(), option.as_ptr(), 0, &mut probe) < 0 {
            return None;
        }
        Some(StableApiAccessor {
            option,
            repr: field.repr(),
            api,
        })
    }
}

impl FieldAccessor for StableApiAccessor {
    fn tier(&self) -> Tier {
        Tier::StableApi
    }

    unsafe fn get(&self, obj: NativePtr) -> Option<FieldValue> {
        let mut out = 0i64;
        let ret = (self.api.get_int)(obj.as_ptr(), self.option.as_ptr(), 0, &mut out);
        (ret >= 0).then_some(FieldValue::Int(out))
    }

    unsafe fn set(&self, obj: NativePtr, value: FieldValue) -> bool {
        let (Some(set_int), Some(v)) = (self.api.set_int, self.repr.integer(value)) else {
            return false;
        };
        set_int(obj.as_ptr(), self.option.as_ptr(), v, 0) >= 0
    }
}

type GetI32 = unsafe extern "C" fn(*mut c_void) -> i32;
type GetU32 = unsafe extern "C" fn(*mut c_void) -> u32;
type GetI64 = unsafe extern "C" fn(*mut c_void) -> i64;
type GetPtr = unsafe extern "C" fn(*mut c_void) -> *mut c_void;
type GetRational = unsafe extern "C" fn(*mut c_void, *mut i32, *mut i32);
type SetI32 = unsafe extern "C" fn(*mut c_void, i32);
type SetI64 = unsafe extern "C" fn(*mut c_void, i64);
type SetPtr = unsafe extern "C" fn(*mut c_void, *mut c_void);
type SetRational = unsafe extern "C" fn(*mut c_void, i32, i32);

#[derive(Clone, Copy)]
enum ShimGetter {
    I32(GetI32),
    U32(GetU32),
    I64(GetI64),
    Ptr(GetPtr),
    Rational(GetRational),
}

#[derive(Clone, Copy)]
enum ShimSetter {
    I32(SetI32),
    I64(SetI64),
    Ptr(SetPtr),
    Rational(SetRational),
}

pub(crate) struct ShimAccessor {
    repr: Repr,
    getter: Option<ShimGetter>,
    setter: Option<ShimSetter>,
}

pub(crate) fn shim_getter_name(field: Field) -> String {
    format!("avbridge_{}_{}", field.kind().shim_prefix(), field.name())
}

pub(crate) fn shim_setter_name(field: Field) -> String {
    format!("avbridge_{}_set_{}", field.kind().shim_prefix(), field.name())
}

impl ShimAccessor {
    /// Binds the export needed for `access`, if the shim has it.
    pub(crate) fn bind(shim: &Shim, field: Field, access: Access) -> Option<Self> {
        let repr = field.repr();
        let (getter, setter) = match access {
            Access::Read => {
                let addr = shim.symbol(&shim_getter_name(field))?;
                let getter = unsafe {
                    match repr {
                        Repr::I32 => ShimGetter::I32(cast_symbol(addr)),
                        Repr::U32 => ShimGetter::U32(cast_symbol(addr)),
                        Repr::I64 => ShimGetter::I64(cast_symbol(addr)),
                        Repr::Ptr => ShimGetter::Ptr(cast_symbol(addr)),
                        Repr::Rational => ShimGetter::Rational(cast_symbol(addr)),
                    }
                };
                (Some(getter), None)
            }
            Access::Write => {
                let addr = shim.symbol(&shim_setter_name(field))?;
                let setter = unsafe {
                    match repr {
                        Repr::I32 | Repr::U32 => ShimSetter::I32(cast_symbol(addr)),
                        Repr::I64 => ShimSetter::I64(cast_symbol(addr)),
                        Repr::Ptr => ShimSetter::Ptr(cast_symbol(addr)),
                        Repr::Rational => ShimSetter::Rational(cast_symbol(addr)),
                    }
                };
                (None, Some(setter))
            }
        };
        Some(ShimAccessor {
            repr,
            getter,
            setter,
        })
    }
}

impl FieldAccessor for ShimAccessor {
    fn tier(&self) -> Tier {
        Tier::Shim
    }

    unsafe fn get(&self, obj: NativePtr) -> Option<FieldValue> {
        let value = match self.getter? {
            ShimGetter::I32(f) => FieldValue::Int(f(obj.as_ptr()) as i64),
            ShimGetter::U32(f) => FieldValue::Int(f(obj.as_ptr()) as i64),
            ShimGetter::I64(f) => FieldValue::Int(f(obj.as_ptr())),
            ShimGetter::Ptr(f) => FieldValue::Ptr(NativePtr::from_raw(f(obj.as_ptr()))),
            ShimGetter::Rational(f) => {
                let (mut num, mut den) = (0i32, 1i32);
                f(obj.as_ptr(), &mut num, &mut den);
                FieldValue::Rational(Rational::new(num, den))
            }
        };
        Some(value)
    }

    unsafe fn set(&self, obj: NativePtr, value: FieldValue) -> bool {
        let Some(setter) = self.setter else {
            return false;
        };
        match (setter, value) {
            (ShimSetter::I32(f), FieldValue::Int(_)) => match self.repr.integer(value) {
                Some(v) => f(obj.as_ptr(), v as i32),
                None => return false,
            },
            (ShimSetter::I64(f), FieldValue::Int(v)) => f(obj.as_ptr(), v),
            (ShimSetter::Ptr(f), FieldValue::Ptr(p)) => f(obj.as_ptr(), p.as_ptr()),
            (ShimSetter::Rational(f), FieldValue::Rational(r)) => f(obj.as_ptr(), r.num, r.den),
            _ => return false,
        }
        true
    }
}

/// Raw access at a fixed byte offset.
pub(crate) struct OffsetAccessor {
    offset: usize,
    repr: Repr,
    writable: bool,
}

impl OffsetAccessor {
    pub(crate) fn new(offset: usize, repr: Repr, writable: bool) -> Self {
        OffsetAccessor {
            offset,
            repr,
            writable,
        }
    }
}

impl FieldAccessor for OffsetAccessor {
    fn tier(&self) -> Tier {
        Tier::Offset
    }

    unsafe fn get(&self, obj: NativePtr) -> Option<FieldValue> {
        let at = obj.as_ptr().cast::<u8>().add(self.offset);
        let value = match self.repr {
            Repr::I32 => FieldValue::Int(at.cast::<i32>().read_unaligned() as i64),
            Repr::U32 => FieldValue::Int(at.cast::<u32>().read_unaligned() as i64),
            Repr::I64 => FieldValue::Int(at.cast::<i64>().read_unaligned()),
            Repr::Ptr => FieldValue::Ptr(NativePtr::from_raw(at.cast::<*mut c_void>().read_unaligned())),
            Repr::Rational => FieldValue::Rational(at.cast::<Rational>().read_unaligned()),
        };
        Some(value)
    }

    unsafe fn set(&self, obj: NativePtr, value: FieldValue) -> bool {
        if !self.writable {
            return false;
        }
        let at = obj.as_ptr().cast::<u8>().add(self.offset);
        match (self.repr, value) {
            (Repr::I32, FieldValue::Int(_)) | (Repr::U32, FieldValue::Int(_)) => {
                match self.repr.integer(value) {
                    Some(v) if self.repr == Repr::I32 => at.cast::<i32>().write_unaligned(v as i32),
                    Some(v) => at.cast::<u32>().write_unaligned(v as u32),
                    None => return false,
                }
            }
            (Repr::I64, FieldValue::Int(v)) => at.cast::<i64>().write_unaligned(v),
            (Repr::Ptr, FieldValue::Ptr(p)) => at.cast::<*mut c_void>().write_unaligned(p.as_ptr()),
            (Repr::Rational, FieldValue::Rational(r)) => at.cast::<Rational>().write_unaligned(r),
            _ => return false,
        }
        true
    }
}

pub(crate) struct Unavailable;

impl FieldAccessor for Unavailable {
    fn tier(&self) -> Tier {
        Tier::Unavailable
    }

    unsafe fn get(&self, _obj: NativePtr) -> Option<FieldValue> {
        None
    }

    unsafe fn set(&self, _obj: NativePtr, _value: FieldValue) -> bool {
        false
    }
}
