//! Process-wide bridge state: the bound libraries, the field table and the
//! capability flags, loaded once and shared.

use lazy_static::lazy_static;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::ffi::CStr;
use std::fmt;
use std::os::raw::{c_char, c_int, c_uint};
use std::path::Path;
use std::sync::Arc;

use crate::alloc::NativeAllocator;
use crate::config::{self, Config};
use crate::error::{BridgeError, LoadError, NativeError, Result};
use crate::fields::{FieldTable, OwnerMajors, StableOptions};
use crate::platform::Capabilities;
use crate::ptr::NativePtr;
use crate::registry::api::{Binder, CodecApi, FormatApi, ScaleApi, UtilApi};
use crate::registry::{
    load_library, DylibLoader, LibraryLoader, LibrarySpec, NativeLibrary, SearchPlan, AVCODEC,
    AVFORMAT, AVUTIL, SWSCALE,
};
use crate::shim::{self, Shim, ShimStatus};

lazy_static! {
    static ref GLOBAL: Mutex<Option<std::result::Result<Arc<Bridge>, LoadError>>> = Mutex::new(None);
}

const STRERROR_BUF_LEN: usize = 256;

/// A library version as `major.minor.micro`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
}

impl Version {
    /// Decodes the packed `AV_VERSION_INT` form.
    pub fn from_packed(packed: c_uint) -> Self {
        Version {
            major: packed >> 16,
            minor: (packed >> 8) & 0xff,
            micro: packed & 0xff,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

/// Versions reported by the loaded libraries themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Versions {
    pub avutil: Version,
    pub avcodec: Version,
    pub avformat: Version,
    pub swscale: Option<Version>,
}

pub struct Bridge {
    util: UtilApi,
    codec: CodecApi,
    format: FormatApi,
    scale: Option<ScaleApi>,
    shim: std::result::Result<Arc<Shim>, LoadError>,
    fields: FieldTable,
    allocator: NativeAllocator,
    capabilities: Capabilities,
    versions: Versions,
    config: Config,
    missing: Vec<(&'static str, &'static str)>,
    // keeps every bound function pointer valid
    _libraries: Vec<Box<dyn NativeLibrary>>,
}

impl Bridge {
    /// Loads from disk using `config`.
    pub fn load(config: &Config) -> std::result::Result<Bridge, LoadError> {
        Self::load_with(&DylibLoader, config)
    }

    /// Loads avutil, avcodec and avformat (required), swscale and the shim
    /// (optional) through `loader`. Fails without side effects if any
    /// required library or symbol is missing.
    pub fn load_with(loader: &dyn LibraryLoader, config: &Config) -> std::result::Result<Bridge, LoadError> {
        let plan = SearchPlan::for_libraries(config);
        let mut missing = Vec::new();

        let (util_lib, _) = load_library(loader, &plan, &AVUTIL)?;
        let util = bind(util_lib.as_ref(), &AVUTIL, &mut missing, |b| unsafe { UtilApi::bind(b) })?;

        let (codec_lib, _) = load_library(loader, &plan, &AVCODEC)?;
        let codec = bind(codec_lib.as_ref(), &AVCODEC, &mut missing, |b| unsafe { CodecApi::bind(b) })?;

        let (format_lib, _) = load_library(loader, &plan, &AVFORMAT)?;
        let format = bind(format_lib.as_ref(), &AVFORMAT, &mut missing, |b| unsafe { FormatApi::bind(b) })?;

        let mut libraries = vec![util_lib, codec_lib, format_lib];

        let scale = match load_library(loader, &plan, &SWSCALE) {
            Ok((scale_lib, _)) => {
                match bind(scale_lib.as_ref(), &SWSCALE, &mut missing, |b| unsafe { ScaleApi::bind(b) }) {
                    Ok(api) => {
                        libraries.push(scale_lib);
                        Some(api)
                    }
                    Err(err) => {
                        warn!("ignoring swscale: {}", err);
                        None
                    }
                }
            }
            Err(err) => {
                debug!("swscale not loaded: {}", err);
                None
            }
        };

        let versions = unsafe {
            Versions {
                avutil: Version::from_packed((util.version)()),
                avcodec: Version::from_packed((codec.version)()),
                avformat: Version::from_packed((format.version)()),
                swscale: scale.map(|s| Version::from_packed((s.version)())),
            }
        };
        info!(
            "avutil {} avcodec {} avformat {}",
            versions.avutil, versions.avcodec, versions.avformat
        );

        let shim = Shim::load(loader, config).map(Arc::new);
        let capabilities = Capabilities::detect(config);
        let stable = util.opt_get_int.map(|get_int| StableOptions {
            get_int,
            set_int: util.opt_set_int,
        });
        let fields = FieldTable::new(
            stable,
            shim.as_ref().ok().cloned(),
            OwnerMajors {
                util: versions.avutil.major,
                codec: versions.avcodec.major,
                format: versions.avformat.major,
            },
            capabilities,
        );

        Ok(Bridge {
            util,
            codec,
            format,
            scale,
            shim,
            fields,
            allocator: NativeAllocator::new(util.malloc, util.free, util.freep),
            capabilities,
            versions,
            config: config.clone(),
            missing,
            _libraries: libraries,
        })
    }

    /// The process-wide bridge, loaded from disk on first use with the
    /// global configuration. A failed load is remembered until
    /// [`Bridge::reconfigure`].
    pub fn global() -> Result<Arc<Bridge>> {
        Self::global_init(&DylibLoader, config::current)
    }

    /// Like [`global`](Self::global), but a first load goes through `loader`
    /// with `config`. Once the bridge exists (or failed) both are ignored.
    ///
    /// Concurrent first callers wait for a single load and share its result.
    pub fn global_with(loader: &dyn LibraryLoader, config: &Config) -> Result<Arc<Bridge>> {
        Self::global_init(loader, || config.clone())
    }

    fn global_init<F>(loader: &dyn LibraryLoader, config: F) -> Result<Arc<Bridge>>
    where
        F: FnOnce() -> Config,
    {
        let mut slot = GLOBAL.lock();
        if let Some(result) = slot.as_ref() {
            return result.clone().map_err(BridgeError::from);
        }
        let result = Bridge::load_with(loader, &config()).map(Arc::new);
        if let Err(err) = &result {
            warn!("bridge failed to load, later callers get the same error: {}", err);
        }
        *slot = Some(result.clone());
        result.map_err(BridgeError::from)
    }

    /// Replaces the global configuration and loads again from disk. Sessions
    /// holding the previous bridge keep it alive until they finish.
    pub fn reconfigure(new_config: Config) -> Result<Arc<Bridge>> {
        Self::reconfigure_with(&DylibLoader, new_config)
    }

    /// [`reconfigure`](Self::reconfigure) through `loader`.
    pub fn reconfigure_with(loader: &dyn LibraryLoader, new_config: Config) -> Result<Arc<Bridge>> {
        let mut slot = GLOBAL.lock();
        config::set(new_config.clone());
        let result = Bridge::load_with(loader, &new_config).map(Arc::new);
        *slot = Some(result.clone());
        result.map_err(BridgeError::from)
    }

    pub fn versions(&self) -> Versions {
        self.versions
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    pub fn allocator(&self) -> &NativeAllocator {
        &self.allocator
    }

    pub fn shim(&self) -> Option<&Shim> {
        self.shim.as_deref().ok()
    }

    pub fn shim_location(&self) -> Option<&Path> {
        self.shim().map(|s| s.location())
    }

    /// Why the shim is absent, if it is.
    pub fn shim_error(&self) -> Option<&LoadError> {
        self.shim.as_ref().err()
    }

    pub fn shim_status(&self) -> ShimStatus {
        match &self.shim {
            Ok(shim) => shim.status(),
            Err(error) => ShimStatus::NotLoaded {
                error: error.clone(),
                searched: SearchPlan::for_shim(&self.config).dirs().to_vec(),
            },
        }
    }

    /// File name the shim is looked up under, e.g. `libavbridge_shim.so`.
    pub fn expected_shim_file_name() -> String {
        shim::expected_file_name()
    }

    pub fn shim_build_instructions(&self) -> String {
        shim::build_instructions(&self.config)
    }

    pub fn has_swscale(&self) -> bool {
        self.scale.is_some()
    }

    /// Optional symbols that were not exported, as (library, symbol).
    pub fn missing_symbols(&self) -> &[(&'static str, &'static str)] {
        &self.missing
    }

    /// Describes `code` with `av_strerror`.
    pub fn error(&self, code: c_int, op: &str) -> NativeError {
        let mut buf = [0 as c_char; STRERROR_BUF_LEN];
        let ret = unsafe { (self.util.strerror)(code, buf.as_mut_ptr(), buf.len()) };
        if ret < 0 {
            return NativeError::from_code(code, op);
        }
        let message = unsafe { CStr::from_ptr(buf.as_ptr()) }.to_string_lossy().into_owned();
        NativeError::new(code, op, message)
    }

    /// `Ok(ret)` for non-negative returns, otherwise the described error.
    pub fn check(&self, ret: c_int, op: &str) -> Result<c_int> {
        if ret < 0 {
            Err(self.error(ret, op).into())
        } else {
            Ok(ret)
        }
    }

    /// Sets the native log level, when `av_log_set_level` is exported.
    pub fn set_log_level(&self, level: c_int) -> Result<()> {
        let set = self
            .util
            .log_set_level
            .ok_or_else(|| BridgeError::unavailable("av_log_set_level"))?;
        unsafe { set(level) };
        Ok(())
    }

    /// Frees an `AVCodecContext` with `avcodec_free_context`; `*ctx` is null
    /// afterwards.
    ///
    /// # Safety
    /// `*ctx` must be null or a codec context not used elsewhere.
    pub unsafe fn free_codec_context(&self, ctx: &mut NativePtr) -> Result<()> {
        let free = self
            .codec
            .free_context
            .ok_or_else(|| BridgeError::unavailable("avcodec_free_context"))?;
        self.allocator.release_staged(ctx, free);
        Ok(())
    }

    pub(crate) fn format_api(&self) -> &FormatApi {
        &self.format
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("versions", &self.versions)
            .field("capabilities", &self.capabilities)
            .field("shim", &self.shim_location())
            .finish()
    }
}

fn bind<T, F>(
    library: &dyn NativeLibrary,
    spec: &LibrarySpec,
    missing: &mut Vec<(&'static str, &'static str)>,
    f: F,
) -> std::result::Result<T, LoadError>
where
    F: FnOnce(&mut Binder<'_>) -> std::result::Result<T, LoadError>,
{
    let mut binder = Binder::new(spec.name, library);
    let api = f(&mut binder)?;
    missing.extend(binder.missing());
    Ok(api)
}

/// Maps a native return code, falling back to the built-in message table
/// when no bridge is at hand.
pub fn check_code(ret: c_int, op: &str) -> Result<c_int> {
    if ret < 0 {
        Err(NativeError::from_code(ret, op).into())
    } else {
        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::averror;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_version_decode() {
        let v = Version::from_packed((61 << 16) | (19 << 8) | 100);
        assert_eq!(
            v,
            Version {
                major: 61,
                minor: 19,
                micro: 100
            }
        );
        assert_eq!(v.to_string(), "61.19.100");
    }

    #[test]
    fn test_check_code() {
        assert_eq!(check_code(3, "op").unwrap(), 3);
        assert!(check_code(averror::EOF, "op").unwrap_err().is_eof());
    }
}
