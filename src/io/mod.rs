//! Custom I/O: native demuxers and muxers reading from and writing to Rust.
//!
//! A caller describes a byte source or sink with [`IoCallbacks`] and opens an
//! [`IoContext`] over it. The context registers the callbacks in the global
//! handle table and builds a native `AVIOContext` wired to the process-wide
//! read, write and seek trampolines.
//!
//! ```no_run
//! use avbridge::{Bridge, IoCallbacks, IoContext, IoMode};
//! use bytes::Bytes;
//!
//! # fn main() -> avbridge::Result<()> {
//! let bridge = Bridge::global()?;
//! let data = Bytes::from(std::fs::read("clip.mp4")?);
//! let io = IoContext::open_default(&bridge, IoCallbacks::from_bytes(data), IoMode::Read)?;
//! println!("native io object at {:?}", io.as_ptr());
//! io.close();
//! # Ok(())
//! # }
//! ```

mod callbacks;
mod context;
pub(crate) mod trampoline;

pub use callbacks::{IoCallbacks, ReadFn, ReadResult, SeekFn, SizeFn, WriteFn};
pub use context::{IoContext, IoMode};
pub use trampoline::{AVSEEK_FORCE, AVSEEK_SIZE};
