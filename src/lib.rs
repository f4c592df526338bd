#![doc(html_root_url = "https://docs.rs/avbridge/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # avbridge - FFmpeg bindings that survive version drift
//!
//! `avbridge` loads the FFmpeg shared libraries (libavutil, libavcodec,
//! libavformat and, optionally, libswscale) at run time and talks to them
//! without compile-time headers. It takes care of the parts that usually
//! break when the installed FFmpeg changes:
//!
//! - finding and binding whichever supported major version is installed
//! - reading and writing fields of native structs whose layout moves between
//!   releases, through the AVOption API, a small compiled shim or a
//!   per-version offset table
//! - letting native demuxers and muxers read from and write to Rust through
//!   custom I/O callbacks
//! - freeing native memory with the allocator that owns it
//!
//! ## Quick Start
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! avbridge = "0.1.0"
//! ```
//!
//! ### Demuxing from memory
//!
//! ```rust,no_run
//! use avbridge::{Bridge, CustomInput, InputOptions, IoCallbacks};
//! use bytes::Bytes;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = Bridge::global()?;
//!     println!("using avformat {}", bridge.versions().avformat);
//!
//!     let data = Bytes::from(std::fs::read("clip.ts")?);
//!     let input = CustomInput::open(&bridge, IoCallbacks::from_bytes(data), InputOptions::default())?;
//!     for stream in input.streams() {
//!         println!("stream {}: time base {}", stream.index, stream.time_base);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! Library locations and a few behaviors are read from `./avbridge.toml` and
//! from `AVBRIDGE_*` environment variables; see [`config`].
//!
//! ## Module Overview
//!
//! - `registry`: library discovery and symbol binding
//! - `bridge`: the loaded libraries as one process-wide value
//! - `fields`: version-tolerant struct field access
//! - `handles`: integer handles passed to native code in place of pointers
//! - `io`: custom I/O callbacks and the native I/O object built on them
//! - `demux`: demuxing over custom I/O
//! - `mux`: muxing over custom I/O
//! - `alloc`: native-allocator buffers and staged teardown
//! - `native_log`: native log output routed to `log`
//! - `error`, `averror`: error types and native error codes

/// Native-allocator buffers and pointer-to-pointer teardown
pub mod alloc;

/// Native error codes
pub mod averror;

/// Process-wide bridge state
pub mod bridge;

/// Configuration module
pub mod config;

/// Demuxing over custom I/O
pub mod demux;

/// Error types and utilities
pub mod error;

/// Version-tolerant struct field access
pub mod fields;

/// Opaque handles for native callbacks
pub mod handles;

/// Custom I/O
pub mod io;

/// Muxing over custom I/O
pub mod mux;

/// Native log routing
pub mod native_log;

/// Platform conventions and capability flags
pub mod platform;

/// Pointers into native memory
pub mod ptr;

/// Rational numbers laid out like `AVRational`
pub mod rational;

/// Library discovery and symbol binding
pub mod registry;

/// The optional compiled helper library
pub mod shim;

pub use bridge::{Bridge, Version, Versions};
pub use config::Config;
pub use demux::{CustomInput, InputOptions, StreamInfo};
pub use error::{BridgeError, LoadError, NativeError, Result};
pub use fields::{Field, FieldTable, FieldValue, StructKind, Tier};
pub use handles::{Handle, HandleTable};
pub use io::{IoCallbacks, IoContext, IoMode, ReadResult};
pub use mux::{CustomOutput, OutputOptions};
pub use ptr::NativePtr;
pub use rational::Rational;
pub use shim::ShimStatus;
