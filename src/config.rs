use lazy_static::lazy_static;
use log::warn;
use parking_lot::RwLock;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default size of the buffer handed to native custom I/O.
pub const DEFAULT_IO_BUFFER_SIZE: usize = 32 * 1024;

const CONFIG_PATHS: [&str; 1] = ["./avbridge.toml"];

lazy_static! {
    static ref CONFIG: RwLock<Config> = RwLock::new(Config::new());
}

/// Where to find the native libraries and how to talk to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory searched before any system location.
    pub library_dir: Option<PathBuf>,
    /// Directory holding the shim; when set, no other location is tried.
    pub shim_dir: Option<PathBuf>,
    pub io_buffer_size: usize,
    /// Overrides the platform default for raw struct writes.
    pub direct_struct_write: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            library_dir: None,
            shim_dir: None,
            io_buffer_size: DEFAULT_IO_BUFFER_SIZE,
            direct_struct_write: None,
        }
    }
}

impl Config {
    /// Defaults, then `./avbridge.toml`, then `AVBRIDGE_*` environment variables.
    pub fn new() -> Self {
        let mut config = Config::default();

        for path in &CONFIG_PATHS {
            if let Ok(content) = fs::read_to_string(path) {
                config.apply_file(&content);
            }
        }

        config.apply_env(|key| env::var(key).ok());
        config
    }

    pub fn with_library_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.library_dir = Some(dir.into());
        self
    }

    pub fn with_shim_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.shim_dir = Some(dir.into());
        self
    }

    pub fn with_io_buffer_size(mut self, size: usize) -> Self {
        self.io_buffer_size = size;
        self
    }

    pub fn with_direct_struct_write(mut self, enabled: bool) -> Self {
        self.direct_struct_write = Some(enabled);
        self
    }

    fn apply_file(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'');
            self.apply_value(key.trim(), value);
        }
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let keys = [
            ("AVBRIDGE_LIBRARY_DIR", "library_dir"),
            ("AVBRIDGE_SHIM_DIR", "shim_dir"),
            ("AVBRIDGE_IO_BUFFER_SIZE", "io_buffer_size"),
            ("AVBRIDGE_DIRECT_STRUCT_WRITE", "direct_struct_write"),
        ];
        for (var, key) in keys {
            if let Some(value) = lookup(var) {
                self.apply_value(key, value.trim());
            }
        }
    }

    fn apply_value(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        match key {
            "library_dir" => self.library_dir = Some(PathBuf::from(value)),
            "shim_dir" => self.shim_dir = Some(PathBuf::from(value)),
            "io_buffer_size" => match value.parse::<usize>() {
                Ok(size) if size > 0 => self.io_buffer_size = size,
                _ => warn!("ignoring io_buffer_size {:?}", value),
            },
            "direct_struct_write" => match parse_bool(value) {
                Some(enabled) => self.direct_struct_write = Some(enabled),
                None => warn!("ignoring direct_struct_write {:?}", value),
            },
            _ => {}
        }
    }

    /// Re-reads file and environment into the global configuration.
    pub fn reload() {
        let new_config = Config::new();
        *CONFIG.write() = new_config;
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Snapshot of the global configuration.
pub fn current() -> Config {
    CONFIG.read().clone()
}

/// Replaces the global configuration.
pub fn set(config: Config) {
    *CONFIG.write() = config;
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = include_str!(concat!(env!("OUT_DIR"), "/avbridge.template.toml"));
        fs::write(path, template)?;
    }
    Ok(())
}
