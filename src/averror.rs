//! Native error codes and the mapping from Rust I/O errors onto them.
//!
//! Codes follow the native convention: negative `errno` values for POSIX
//! errors and negated four-character tags for library-specific ones.

use std::io;
use std::os::raw::c_int;

const fn fferrtag(a: u8, b: u8, c: u8, d: u8) -> c_int {
    -(((a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)) as c_int)
}

/// End of stream.
pub const EOF: c_int = fferrtag(b'E', b'O', b'F', b' ');
/// Resource temporarily unavailable, try again.
pub const EAGAIN: c_int = -libc::EAGAIN;
/// Invalid argument.
pub const EINVAL: c_int = -libc::EINVAL;
/// Out of memory.
pub const ENOMEM: c_int = -libc::ENOMEM;
/// No decoder registered for the requested codec.
pub const DECODER_NOT_FOUND: c_int = fferrtag(0xF8, b'D', b'E', b'C');
/// No encoder registered for the requested codec.
pub const ENCODER_NOT_FOUND: c_int = fferrtag(0xF8, b'E', b'N', b'C');
/// No demuxer matched the input.
pub const DEMUXER_NOT_FOUND: c_int = fferrtag(0xF8, b'D', b'E', b'M');
/// No muxer matched the requested output.
pub const MUXER_NOT_FOUND: c_int = fferrtag(0xF8, b'M', b'U', b'X');
/// Input data was malformed.
pub const INVALIDDATA: c_int = fferrtag(b'I', b'N', b'D', b'A');
/// Internal bug; also used for unknown callback handles and caught panics.
pub const BUG: c_int = fferrtag(b'B', b'U', b'G', b'!');
/// Unknown error.
pub const UNKNOWN: c_int = fferrtag(b'U', b'N', b'K', b'N');

/// Maps a Rust I/O error onto the fixed native code set.
pub fn from_io_error(err: &io::Error) -> c_int {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => EAGAIN,
        io::ErrorKind::InvalidInput | io::ErrorKind::Unsupported => EINVAL,
        io::ErrorKind::OutOfMemory => ENOMEM,
        io::ErrorKind::InvalidData => INVALIDDATA,
        io::ErrorKind::UnexpectedEof => EOF,
        _ => UNKNOWN,
    }
}

/// Built-in description used when `av_strerror` is not bound.
pub fn describe(code: c_int) -> String {
    let text = match code {
        EOF => "End of file",
        EAGAIN => "Resource temporarily unavailable",
        EINVAL => "Invalid argument",
        ENOMEM => "Cannot allocate memory",
        DECODER_NOT_FOUND => "Decoder not found",
        ENCODER_NOT_FOUND => "Encoder not found",
        DEMUXER_NOT_FOUND => "Demuxer not found",
        MUXER_NOT_FOUND => "Muxer not found",
        INVALIDDATA => "Invalid data found when processing input",
        BUG => "Internal bug, should not have happened",
        UNKNOWN => "Unknown error occurred",
        _ => return format!("Error number {} occurred", code),
    };
    text.to_string()
}
