//! The three callbacks handed to native I/O objects.
//!
//! Every session in the process shares the same read, write and seek entry
//! points; the `opaque` argument carries the session's handle, which is
//! looked up in the global [`HandleTable`] on each call.

use log::{error, warn};
use parking_lot::Mutex;
use std::io::SeekFrom;
use std::os::raw::{c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::slice;

use super::callbacks::{IoCallbacks, ReadResult};
use crate::averror;
use crate::handles::{Handle, HandleTable};

/// Ask for the stream size instead of seeking.
pub const AVSEEK_SIZE: c_int = 0x10000;
/// Hint that the seek may be expensive; carries no meaning here.
pub const AVSEEK_FORCE: c_int = 0x20000;

const SEEK_SET: c_int = 0;
const SEEK_CUR: c_int = 1;
const SEEK_END: c_int = 2;

/// What the handle table holds for each open I/O session.
pub(crate) struct Session {
    state: Mutex<SessionState>,
}

struct SessionState {
    callbacks: IoCallbacks,
    // a short read carried the end; report it on the next read
    end_pending: bool,
}

impl Session {
    pub(crate) fn new(callbacks: IoCallbacks) -> Self {
        Session {
            state: Mutex::new(SessionState {
                callbacks,
                end_pending: false,
            }),
        }
    }
}

fn session(table: &HandleTable, opaque: *mut c_void) -> Option<std::sync::Arc<Session>> {
    table.lookup::<Session>(Handle::from_opaque(opaque)?)
}

fn clamp(n: usize, limit: usize) -> c_int {
    n.min(limit).min(c_int::MAX as usize) as c_int
}

fn seek_code(err: &std::io::Error) -> i64 {
    averror::from_io_error(err) as i64
}

pub(crate) fn dispatch_read(table: &HandleTable, opaque: *mut c_void, buf: &mut [u8]) -> c_int {
    let Some(session) = session(table, opaque) else {
        return averror::BUG;
    };
    let mut state = session.state.lock();
    if state.end_pending {
        state.end_pending = false;
        return averror::EOF;
    }
    let Some(read) = state.callbacks.read.as_mut() else {
        return averror::EINVAL;
    };
    let len = buf.len();
    match read(buf) {
        Ok(ReadResult::Filled(n)) => clamp(n, len),
        Ok(ReadResult::EndOfStream(0)) => averror::EOF,
        Ok(ReadResult::EndOfStream(n)) => {
            state.end_pending = true;
            clamp(n, len)
        }
        Err(err) => averror::from_io_error(&err),
    }
}

pub(crate) fn dispatch_write(table: &HandleTable, opaque: *mut c_void, buf: &[u8]) -> c_int {
    let Some(session) = session(table, opaque) else {
        return averror::BUG;
    };
    let mut state = session.state.lock();
    let Some(write) = state.callbacks.write.as_mut() else {
        return averror::EINVAL;
    };
    match write(buf) {
        Ok(n) => clamp(n, buf.len()),
        Err(err) => averror::from_io_error(&err),
    }
}

pub(crate) fn dispatch_seek(table: &HandleTable, opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    let Some(session) = session(table, opaque) else {
        return averror::BUG as i64;
    };
    let mut state = session.state.lock();

    if whence & AVSEEK_SIZE != 0 {
        return query_size(&mut state.callbacks);
    }

    let target = match whence & !AVSEEK_FORCE {
        SEEK_SET if offset >= 0 => SeekFrom::Start(offset as u64),
        SEEK_CUR => SeekFrom::Current(offset),
        SEEK_END => SeekFrom::End(offset),
        _ => return averror::EINVAL as i64,
    };
    let Some(seek) = state.callbacks.seek.as_mut() else {
        return averror::EINVAL as i64;
    };
    match seek(target) {
        Ok(pos) => {
            state.end_pending = false;
            i64::try_from(pos).unwrap_or(averror::EINVAL as i64)
        }
        Err(err) => seek_code(&err),
    }
}

/// Total size without moving the position.
fn query_size(callbacks: &mut IoCallbacks) -> i64 {
    if let Some(size) = callbacks.size.as_mut() {
        return match size() {
            Ok(len) => i64::try_from(len).unwrap_or(averror::EINVAL as i64),
            Err(err) => seek_code(&err),
        };
    }

    let Some(seek) = callbacks.seek.as_mut() else {
        return averror::EINVAL as i64;
    };
    let current = match seek(SeekFrom::Current(0)) {
        Ok(pos) => pos,
        Err(err) => return seek_code(&err),
    };
    let end = seek(SeekFrom::End(0));
    // restore even if measuring failed; the position may have moved
    let restored = seek(SeekFrom::Start(current));
    match (end, restored) {
        (Err(err), _) => seek_code(&err),
        (Ok(_), Err(err)) => {
            warn!("could not restore position {} after size query: {}", current, err);
            seek_code(&err)
        }
        (Ok(end), Ok(_)) => i64::try_from(end).unwrap_or(averror::EINVAL as i64),
    }
}

fn guard<T>(op: &str, on_panic: T, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            error!("panic in {} callback, reporting internal error", op);
            on_panic
        }
    }
}

pub(crate) unsafe extern "C" fn read_packet(opaque: *mut c_void, buf: *mut u8, buf_size: c_int) -> c_int {
    let buf: &mut [u8] = match buf_size {
        0 => &mut [],
        n if n < 0 || buf.is_null() => return averror::EINVAL,
        n => slice::from_raw_parts_mut(buf, n as usize),
    };
    guard("read", averror::BUG, || dispatch_read(HandleTable::global(), opaque, buf))
}

pub(crate) unsafe extern "C" fn write_packet(opaque: *mut c_void, buf: *const u8, buf_size: c_int) -> c_int {
    let buf: &[u8] = match buf_size {
        0 => &[],
        n if n < 0 || buf.is_null() => return averror::EINVAL,
        n => slice::from_raw_parts(buf, n as usize),
    };
    guard("write", averror::BUG, || dispatch_write(HandleTable::global(), opaque, buf))
}

pub(crate) unsafe extern "C" fn seek(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    guard("seek", averror::BUG as i64, || {
        dispatch_seek(HandleTable::global(), opaque, offset, whence)
    })
}
