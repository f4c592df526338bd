use log::{debug, info};
use std::path::{Path, PathBuf};

use super::loader::{Candidate, LibraryLoader, NativeLibrary};
use crate::config::Config;
use crate::error::LoadError;
use crate::platform;

/// A library the registry knows how to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibrarySpec {
    pub name: &'static str,
    /// Major versions to try, highest first.
    pub versions: &'static [u32],
}

pub const AVUTIL: LibrarySpec = LibrarySpec {
    name: "avutil",
    versions: &[59, 58, 57, 56],
};

pub const AVCODEC: LibrarySpec = LibrarySpec {
    name: "avcodec",
    versions: &[61, 60, 59, 58],
};

pub const AVFORMAT: LibrarySpec = LibrarySpec {
    name: "avformat",
    versions: &[61, 60, 59, 58],
};

pub const SWSCALE: LibrarySpec = LibrarySpec {
    name: "swscale",
    versions: &[8, 7, 6, 5],
};

pub const SHIM: LibrarySpec = LibrarySpec {
    name: "avbridge_shim",
    versions: &[],
};

/// Ordered directories to look in, optionally followed by bare names for the
/// OS loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPlan {
    dirs: Vec<PathBuf>,
    bare_names: bool,
}

impl SearchPlan {
    pub fn new(dirs: Vec<PathBuf>, bare_names: bool) -> Self {
        let mut unique: Vec<PathBuf> = Vec::with_capacity(dirs.len());
        for dir in dirs {
            if !unique.contains(&dir) {
                unique.push(dir);
            }
        }
        SearchPlan {
            dirs: unique,
            bare_names,
        }
    }

    /// Override directory, loader search variable, install directories,
    /// then bare names.
    pub fn for_libraries(config: &Config) -> Self {
        let mut dirs = Vec::new();
        dirs.extend(config.library_dir.clone());
        dirs.extend(platform::env_library_dirs());
        dirs.extend(platform::standard_library_dirs());
        SearchPlan::new(dirs, true)
    }

    /// The shim directory alone when configured; otherwise the library plan
    /// plus the executable's directory.
    pub fn for_shim(config: &Config) -> Self {
        if let Some(dir) = &config.shim_dir {
            return SearchPlan::new(vec![dir.clone()], false);
        }
        let mut dirs = SearchPlan::for_libraries(config).dirs;
        dirs.extend(platform::executable_dir());
        SearchPlan::new(dirs, true)
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Every file to try for `spec`, in order.
    pub fn candidates(&self, spec: &LibrarySpec) -> Vec<Candidate> {
        let names: Vec<(Option<u32>, String)> = spec
            .versions
            .iter()
            .map(|v| Some(*v))
            .chain(std::iter::once(None))
            .map(|v| (v, platform::library_file_name(spec.name, v)))
            .collect();

        let mut out = Vec::new();
        for dir in &self.dirs {
            for (version, file) in &names {
                out.push(Candidate {
                    library: spec.name.to_string(),
                    version: *version,
                    path: dir.join(file),
                });
            }
        }
        if self.bare_names {
            for (version, file) in &names {
                out.push(Candidate {
                    library: spec.name.to_string(),
                    version: *version,
                    path: PathBuf::from(file),
                });
            }
        }
        out
    }
}

/// Opens the first candidate for `spec` that the loader accepts.
pub fn load_library(
    loader: &dyn LibraryLoader,
    plan: &SearchPlan,
    spec: &LibrarySpec,
) -> Result<(Box<dyn NativeLibrary>, Option<u32>), LoadError> {
    let candidates = plan.candidates(spec);
    for candidate in &candidates {
        match loader.open(candidate) {
            Ok(library) => {
                info!("loaded {} from {}", spec.name, candidate.path.display());
                return Ok((library, candidate.version));
            }
            Err(reason) => debug!("{}: {}", candidate.path.display(), reason),
        }
    }
    Err(LoadError::LibraryNotFound {
        library: spec.name.to_string(),
        tried: candidates.len(),
    })
}

/// The file `spec` would be loaded from, considering only files present on
/// disk. Bare-name candidates are not reported.
pub fn find_library(plan: &SearchPlan, spec: &LibrarySpec) -> Option<PathBuf> {
    plan.candidates(spec)
        .into_iter()
        .map(|c| c.path)
        .find(|path| path.parent().is_some_and(|p| p != Path::new("")) && path.is_file())
}
