use std::collections::HashMap;
use std::fmt;
use std::os::raw::c_void;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One file the registry is willing to open for a library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Logical name, e.g. `avcodec`.
    pub library: String,
    /// Major version encoded in the file name; `None` for the unversioned name.
    pub version: Option<u32>,
    /// Full path, or a bare file name for the OS loader to resolve.
    pub path: PathBuf,
}

/// An opened library that can hand out symbol addresses.
pub trait NativeLibrary: Send + Sync {
    fn location(&self) -> &Path;

    /// Address of an exported symbol, or `None` if it is not exported.
    fn symbol(&self, name: &str) -> Option<*const c_void>;
}

/// Opens candidate files. The registry decides which candidates to try and
/// in what order; a loader only answers whether one of them opens.
pub trait LibraryLoader: Send + Sync {
    fn open(&self, candidate: &Candidate) -> Result<Box<dyn NativeLibrary>, String>;
}

/// Loads shared libraries from disk with the platform loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibLoader;

struct Dylib {
    library: libloading::Library,
    location: PathBuf,
}

#[cfg(unix)]
fn open_dylib(path: &Path) -> Result<libloading::Library, libloading::Error> {
    use libloading::os::unix::{Library, RTLD_GLOBAL, RTLD_NOW};
    // Global so that libraries loaded later resolve against the same copies.
    unsafe { Library::open(Some(path), RTLD_NOW | RTLD_GLOBAL) }.map(Into::into)
}

#[cfg(not(unix))]
fn open_dylib(path: &Path) -> Result<libloading::Library, libloading::Error> {
    unsafe { libloading::Library::new(path) }
}

impl LibraryLoader for DylibLoader {
    fn open(&self, candidate: &Candidate) -> Result<Box<dyn NativeLibrary>, String> {
        let library = open_dylib(&candidate.path).map_err(|e| e.to_string())?;
        Ok(Box::new(Dylib {
            library,
            location: candidate.path.clone(),
        }))
    }
}

impl NativeLibrary for Dylib {
    fn location(&self) -> &Path {
        &self.location
    }

    fn symbol(&self, name: &str) -> Option<*const c_void> {
        let symbol = unsafe { self.library.get::<*const c_void>(name.as_bytes()) }.ok()?;
        let addr = *symbol;
        (!addr.is_null()).then_some(addr)
    }
}

/// A symbol table assembled in Rust, for statically linked builds and tests.
#[derive(Clone, Default)]
pub struct StaticLibrary {
    location: PathBuf,
    symbols: HashMap<String, usize>,
}

impl StaticLibrary {
    pub fn new<P: Into<PathBuf>>(location: P) -> Self {
        StaticLibrary {
            location: location.into(),
            symbols: HashMap::new(),
        }
    }

    /// Exports `addr` under `name`. Pass function items cast to a pointer,
    /// e.g. `my_fn as *const c_void`.
    pub fn with_symbol(mut self, name: &str, addr: *const c_void) -> Self {
        self.symbols.insert(name.to_string(), addr as usize);
        self
    }

    pub fn without_symbol(mut self, name: &str) -> Self {
        self.symbols.remove(name);
        self
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }
}

impl fmt::Debug for StaticLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticLibrary")
            .field("location", &self.location)
            .field("symbols", &self.symbols.len())
            .finish()
    }
}

impl NativeLibrary for StaticLibrary {
    fn location(&self) -> &Path {
        &self.location
    }

    fn symbol(&self, name: &str) -> Option<*const c_void> {
        self.symbols.get(name).map(|addr| *addr as *const c_void)
    }
}

#[derive(Debug)]
struct StaticEntry {
    library: String,
    version: Option<u32>,
    table: Arc<StaticLibrary>,
}

/// Serves registered [`StaticLibrary`] tables instead of touching the disk.
///
/// An entry registered with a version only answers candidates of that
/// version; one registered without a version answers the first candidate
/// tried for its library.
#[derive(Debug, Default)]
pub struct StaticLoader {
    entries: Vec<StaticEntry>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(mut self, library: &str, version: Option<u32>, table: StaticLibrary) -> Self {
        self.entries.push(StaticEntry {
            library: library.to_string(),
            version,
            table: Arc::new(table),
        });
        self
    }
}

impl LibraryLoader for StaticLoader {
    fn open(&self, candidate: &Candidate) -> Result<Box<dyn NativeLibrary>, String> {
        self.entries
            .iter()
            .find(|entry| {
                entry.library == candidate.library
                    && (entry.version.is_none() || entry.version == candidate.version)
            })
            .map(|entry| Box::new((*entry.table).clone()) as Box<dyn NativeLibrary>)
            .ok_or_else(|| format!("no static table for {}", candidate.path.display()))
    }
}
