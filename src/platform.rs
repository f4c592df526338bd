//! Platform conventions: shared-library naming, install directories and the
//! capability flags that gate platform-specific unsafe paths.

use std::env;
use std::path::PathBuf;

use crate::config::Config;

/// Things the bridge may or may not do on this platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Raw writes into native structs through hardcoded offsets.
    ///
    /// Off on macOS, where the offset table has not been verified against the
    /// shipped builds and a bad write corrupts the heap.
    pub supports_direct_struct_write: bool,
    pub pointer_width: usize,
}

impl Capabilities {
    /// Platform defaults, with any override from the configuration applied.
    pub fn detect(config: &Config) -> Self {
        Capabilities {
            supports_direct_struct_write: config
                .direct_struct_write
                .unwrap_or(!cfg!(target_os = "macos")),
            pointer_width: std::mem::size_of::<usize>(),
        }
    }
}

/// File name of `name` at `version`, or the unversioned name.
///
/// Linux `libavcodec.so.61`, macOS `libavcodec.61.dylib`, Windows
/// `avcodec-61.dll`.
pub fn library_file_name(name: &str, version: Option<u32>) -> String {
    if cfg!(target_os = "windows") {
        match version {
            Some(v) => format!("{}-{}.dll", name, v),
            None => format!("{}.dll", name),
        }
    } else if cfg!(target_os = "macos") {
        match version {
            Some(v) => format!("lib{}.{}.dylib", name, v),
            None => format!("lib{}.dylib", name),
        }
    } else {
        match version {
            Some(v) => format!("lib{}.so.{}", name, v),
            None => format!("lib{}.so", name),
        }
    }
}

/// Environment variable the OS loader consults for extra directories.
pub fn library_path_var() -> &'static str {
    if cfg!(target_os = "windows") {
        "PATH"
    } else if cfg!(target_os = "macos") {
        "DYLD_LIBRARY_PATH"
    } else {
        "LD_LIBRARY_PATH"
    }
}

/// Directories listed in the loader's search variable, in order.
pub fn env_library_dirs() -> Vec<PathBuf> {
    env::var_os(library_path_var())
        .map(|paths| env::split_paths(&paths).filter(|p| !p.as_os_str().is_empty()).collect())
        .unwrap_or_default()
}

/// Conventional install locations for this platform.
pub fn standard_library_dirs() -> Vec<PathBuf> {
    let dirs: &[&str] = if cfg!(target_os = "windows") {
        &[]
    } else if cfg!(target_os = "macos") {
        &["/opt/homebrew/lib", "/usr/local/lib", "/opt/local/lib"]
    } else {
        &[
            "/usr/lib/x86_64-linux-gnu",
            "/usr/lib/aarch64-linux-gnu",
            "/usr/lib64",
            "/usr/lib",
            "/usr/local/lib",
        ]
    };
    dirs.iter().map(PathBuf::from).collect()
}

/// Directory of the running executable, if it can be determined.
pub fn executable_dir() -> Option<PathBuf> {
    env::current_exe().ok()?.parent().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    #[cfg(target_os = "linux")]
    fn test_linux_names() {
        assert_eq!(library_file_name("avcodec", Some(61)), "libavcodec.so.61");
        assert_eq!(library_file_name("avcodec", None), "libavcodec.so");
        assert_eq!(library_path_var(), "LD_LIBRARY_PATH");
    }

    #[test]
    #[cfg(target_os = "macos")]
    fn test_macos_names() {
        assert_eq!(library_file_name("avcodec", Some(61)), "libavcodec.61.dylib");
        assert_eq!(library_file_name("avcodec", None), "libavcodec.dylib");
    }

    #[test]
    #[cfg(target_os = "windows")]
    fn test_windows_names() {
        assert_eq!(library_file_name("avcodec", Some(61)), "avcodec-61.dll");
        assert_eq!(library_file_name("avcodec", None), "avcodec.dll");
    }

    #[test]
    fn test_config_overrides_capability() {
        let caps = Capabilities::detect(&Config::default().with_direct_struct_write(false));
        assert!(!caps.supports_direct_struct_write);
        let caps = Capabilities::detect(&Config::default().with_direct_struct_write(true));
        assert!(caps.supports_direct_struct_write);
    }

    #[test]
    fn test_default_capability_follows_platform() {
        let caps = Capabilities::detect(&Config::default());
        assert_eq!(caps.supports_direct_struct_write, !cfg!(target_os = "macos"));
        assert_eq!(caps.pointer_width, std::mem::size_of::<*const u8>());
    }
}
