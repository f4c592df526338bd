//! Forwards the native libraries' log output to the `log` facade.
//!
//! Native messages arrive through the shim's `avbridge_log_set_callback`,
//! already formatted, and are logged under the `ffmpeg` target.

use log::{debug, Level};
use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};

use crate::bridge::Bridge;
use crate::error::{BridgeError, Result};

pub const TARGET: &str = "ffmpeg";

/// `AV_LOG_*` levels.
pub mod level {
    use std::os::raw::c_int;

    pub const QUIET: c_int = -8;
    pub const PANIC: c_int = 0;
    pub const FATAL: c_int = 8;
    pub const ERROR: c_int = 16;
    pub const WARNING: c_int = 24;
    pub const INFO: c_int = 32;
    pub const VERBOSE: c_int = 40;
    pub const DEBUG: c_int = 48;
    pub const TRACE: c_int = 56;
}

/// The `log` level a native level maps to.
pub fn map_level(native: c_int) -> Level {
    match native {
        n if n <= level::ERROR => Level::Error,
        n if n <= level::WARNING => Level::Warn,
        n if n <= level::INFO => Level::Info,
        n if n <= level::VERBOSE => Level::Debug,
        _ => Level::Trace,
    }
}

unsafe extern "C" fn forward(native_level: c_int, message: *const c_char) {
    if message.is_null() {
        return;
    }
    let _ = panic::catch_unwind(AssertUnwindSafe(|| {
        let text = CStr::from_ptr(message).to_string_lossy();
        let text = text.trim_end();
        if !text.is_empty() {
            log::log!(target: TARGET, map_level(native_level), "{}", text);
        }
    }));
}

/// Starts routing native log lines into `log`. Needs the shim.
pub fn route_to_log(bridge: &Bridge) -> Result<()> {
    let set = set_callback(bridge)?;
    unsafe { set(Some(forward)) };
    debug!("native log output routed to target {}", TARGET);
    Ok(())
}

/// Restores the native default logger.
pub fn stop_routing(bridge: &Bridge) -> Result<()> {
    let set = set_callback(bridge)?;
    unsafe { set(None) };
    Ok(())
}

fn set_callback(bridge: &Bridge) -> Result<crate::shim::SetLogCallbackFn> {
    bridge
        .shim()
        .and_then(|shim| shim.set_log_callback())
        .ok_or_else(|| BridgeError::unavailable("avbridge_log_set_callback"))
}
