//! The optional compiled helper library built from `shim/`.
//!
//! It exports header-correct field accessors named
//! `avbridge_<kind>_<field>` / `avbridge_<kind>_set_<field>` plus a log
//! callback hook. Nothing in it is required; each export is looked up when
//! first needed.

use log::{debug, info};
use std::fmt;
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::LoadError;
use crate::platform;
use crate::registry::api::{Binder, VersionFn};
use crate::registry::{load_library, LibraryLoader, NativeLibrary, SearchPlan, SHIM};

pub(crate) type LogCallbackFn = unsafe extern "C" fn(c_int, *const c_char);
pub(crate) type SetLogCallbackFn = unsafe extern "C" fn(Option<LogCallbackFn>);

/// Whether the shim was found when the bridge loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShimStatus {
    Loaded { location: PathBuf, version: Option<u32> },
    NotLoaded { error: LoadError, searched: Vec<PathBuf> },
}

impl ShimStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ShimStatus::Loaded { .. })
    }
}

impl fmt::Display for ShimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShimStatus::Loaded { location, version: Some(v) } => {
                write!(f, "shim loaded from {} (version {:#x})", location.display(), v)
            }
            ShimStatus::Loaded { location, version: None } => {
                write!(f, "shim loaded from {}", location.display())
            }
            ShimStatus::NotLoaded { error, .. } => write!(f, "shim not loaded: {}", error),
        }
    }
}

/// File name the shim is looked up under on this platform.
pub fn expected_file_name() -> String {
    platform::library_file_name(SHIM.name, None)
}

/// How to build the shim and where to put it so `config` finds it.
pub fn build_instructions(config: &Config) -> String {
    let target = match &config.shim_dir {
        Some(dir) => format!("copy it into {}", dir.display()),
        None => "put it next to the FFmpeg libraries, next to the executable, \
                 or in the directory named by AVBRIDGE_SHIM_DIR"
            .to_string(),
    };
    format!(
        "build {} against the FFmpeg headers in use with `make -C shim`, then {}",
        expected_file_name(),
        target
    )
}

pub struct Shim {
    library: Box<dyn NativeLibrary>,
    version: Option<c_uint>,
    set_log_callback: Option<SetLogCallbackFn>,
}

impl Shim {
    /// Looks for the shim. The caller decides whether absence matters.
    pub(crate) fn load(loader: &dyn LibraryLoader, config: &Config) -> Result<Shim, LoadError> {
        let plan = SearchPlan::for_shim(config);
        let library = match load_library(loader, &plan, &SHIM) {
            Ok((library, _)) => library,
            Err(err) => {
                info!("shim not loaded, accessors fall back to offsets: {}", err);
                return Err(err);
            }
        };

        let mut binder = Binder::new("avbridge_shim", library.as_ref());
        let version = unsafe { binder.optional::<VersionFn>("avbridge_shim_version") }
            .map(|f| unsafe { f() });
        let set_log_callback = unsafe { binder.optional("avbridge_log_set_callback") };
        drop(binder);

        debug!("shim {} version {:?}", library.location().display(), version);
        Ok(Shim {
            library,
            version,
            set_log_callback,
        })
    }

    pub fn location(&self) -> &Path {
        self.library.location()
    }

    /// Version reported by the shim itself, if it exports one.
    pub fn version(&self) -> Option<u32> {
        self.version
    }

    pub fn status(&self) -> ShimStatus {
        ShimStatus::Loaded {
            location: self.location().to_path_buf(),
            version: self.version,
        }
    }

    pub(crate) fn symbol(&self, name: &str) -> Option<*const c_void> {
        self.library.symbol(name)
    }

    pub(crate) fn set_log_callback(&self) -> Option<SetLogCallbackFn> {
        self.set_log_callback
    }
}
