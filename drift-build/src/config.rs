//! Build configuration
//!
//! A [`BuildConfig`] is constructed once at startup from the defaults below
//! plus any command-line overrides, and is passed by reference into every
//! build step afterwards.

use serde::Serialize;
use std::path::PathBuf;

/// Default compiler executable.
pub const DEFAULT_COMPILER: &str = "gcc-11";
/// Default language standard flag.
pub const DEFAULT_STANDARD: &str = "-std=gnu99";
/// Default source directory, relative to the invocation directory.
pub const DEFAULT_SOURCE_DIR: &str = "src";
/// Default executable name.
pub const DEFAULT_OUTPUT: &str = "drift";
/// Default size optimization flag for release builds.
pub const DEFAULT_RELEASE_OPT: &str = "-Os";
/// Default instrumentation flag for debug builds.
pub const DEFAULT_SANITIZER: &str = "-fsanitize=address";
/// Link flags enabling dynamic loading and symbol export.
pub const DYNAMIC_EXPORT_FLAGS: [&str; 2] = ["-ldl", "-rdynamic"];

/// Build variant selected for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildProfile {
    /// Size-optimized build without instrumentation
    #[default]
    Release,

    /// Instrumented build, size optimization disabled
    Debug,
}

impl BuildProfile {
    /// Profile for the given debug toggle
    pub fn from_debug(debug: bool) -> Self {
        if debug {
            BuildProfile::Debug
        } else {
            BuildProfile::Release
        }
    }

    /// Whether this is the debug profile
    pub fn is_debug(self) -> bool {
        self == BuildProfile::Debug
    }
}

impl std::fmt::Display for BuildProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildProfile::Release => write!(f, "release"),
            BuildProfile::Debug => write!(f, "debug"),
        }
    }
}

/// Immutable configuration for one build run
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Compiler (and linker) executable
    pub compiler: String,

    /// Optional wrapper placed in front of the compiler (e.g. `ccache`)
    pub launcher: Option<String>,

    /// Language standard flag
    pub standard: String,

    /// Flat directory scanned for sources
    pub source_dir: PathBuf,

    /// Recognized source suffix, without the dot
    pub source_extension: String,

    /// Object suffix, without the dot
    pub object_extension: String,

    /// Executable path
    pub output: PathBuf,

    /// Release or debug
    pub profile: BuildProfile,

    /// Optimization flag for release builds
    pub release_opt: String,

    /// Optimization flag for debug builds (compiler default when `None`)
    pub debug_opt: Option<String>,

    /// Pass `-g` to every compile
    pub debug_symbols: bool,

    /// Instrumentation flag for compile and link in debug builds
    pub sanitizer: String,

    /// Link with `-ldl -rdynamic`
    pub dynamic_exports: bool,

    /// Extra flags appended to every compile
    pub extra_cflags: Vec<String>,

    /// Extra flags appended to the link
    pub extra_ldflags: Vec<String>,

    /// Directory for object files; an owned temporary directory when `None`
    pub object_dir: Option<PathBuf>,

    /// Leave object files in place after linking
    pub keep_objects: bool,

    /// Sort discovered sources by file name instead of enumeration order
    pub sort_sources: bool,

    /// Concurrent compiles; 0 means one per CPU
    pub jobs: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            compiler: DEFAULT_COMPILER.to_string(),
            launcher: None,
            standard: DEFAULT_STANDARD.to_string(),
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            source_extension: "c".to_string(),
            object_extension: "o".to_string(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            profile: BuildProfile::Release,
            release_opt: DEFAULT_RELEASE_OPT.to_string(),
            debug_opt: None,
            debug_symbols: true,
            sanitizer: DEFAULT_SANITIZER.to_string(),
            dynamic_exports: false,
            extra_cflags: Vec::new(),
            extra_ldflags: Vec::new(),
            object_dir: None,
            keep_objects: false,
            sort_sources: false,
            jobs: 1,
        }
    }
}

impl BuildConfig {
    /// Optimization flag for the configured profile
    pub fn opt_flag(&self) -> Option<&str> {
        match self.profile {
            BuildProfile::Release => Some(self.release_opt.as_str()),
            BuildProfile::Debug => self.debug_opt.as_deref(),
        }
    }

    /// Instrumentation flag, present only in debug builds
    pub fn sanitizer_flag(&self) -> Option<&str> {
        if self.profile.is_debug() && !self.sanitizer.is_empty() {
            Some(self.sanitizer.as_str())
        } else {
            None
        }
    }

    /// Number of concurrent compiles, resolving 0 to the CPU count
    pub fn effective_jobs(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get().max(1)
        } else {
            self.jobs
        }
    }
}
