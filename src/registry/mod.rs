//! # Symbol registry
//!
//! Finds the versioned native shared libraries and binds their exported
//! functions into typed tables.
//!
//! Candidates are tried in a fixed order: the configured override directory,
//! directories from the OS loader's search variable, platform install
//! directories, and finally bare file names left to the OS loader. Inside
//! each location the highest major version is tried first.
//!
//! ```rust
//! use avbridge::config::Config;
//! use avbridge::registry::{SearchPlan, AVCODEC};
//!
//! let plan = SearchPlan::for_libraries(&Config::default().with_library_dir("/opt/ffmpeg/lib"));
//! let first = &plan.candidates(&AVCODEC)[0];
//! assert_eq!(first.version, Some(61));
//! ```
//!
//! Opening is delegated to a [`LibraryLoader`]: [`DylibLoader`] for real
//! shared libraries, [`StaticLoader`] for symbol tables assembled in Rust.

pub(crate) mod api;
mod loader;
mod search;

pub use loader::{Candidate, DylibLoader, LibraryLoader, NativeLibrary, StaticLibrary, StaticLoader};
pub use search::{
    find_library, load_library, LibrarySpec, SearchPlan, AVCODEC, AVFORMAT, AVUTIL, SHIM, SWSCALE,
};
