//! Error taxonomy for a build run

use crate::process::ToolStatus;
use std::path::PathBuf;

/// Result type for build operations.
pub type BuildResult<T> = Result<T, BuildError>;

/// Errors that abort a build.
///
/// Every variant is fatal to the run; nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The source directory is missing or cannot be listed
    #[error("cannot read source directory {}: {source}", dir.display())]
    Discovery {
        /// Directory that was scanned
        dir: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The source directory holds no matching files
    #[error("no sources found in {}", dir.display())]
    NoSources {
        /// Directory that was scanned
        dir: PathBuf,
    },

    /// The build directory could not be created
    #[error("cannot prepare build directory: {source}")]
    BuildDir {
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// An external tool could not be started
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The compiler reported a failure for one source file
    #[error("compilation of {} failed ({status})", source_file.display())]
    CompileFailed {
        /// Source file being compiled
        source_file: PathBuf,
        /// Compiler completion status
        status: ToolStatus,
    },

    /// The linker reported a failure
    #[error("link failed ({status})")]
    LinkFailed {
        /// Linker completion status
        status: ToolStatus,
    },

    /// The linker succeeded but the artifact cannot be measured
    #[error("output {} is missing after link: {source}", path.display())]
    MissingArtifact {
        /// Expected artifact path
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// An intermediate object could not be removed
    #[error("cannot remove {}: {source}", path.display())]
    Clean {
        /// Path that could not be removed
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    /// Process exit code for this failure.
    ///
    /// Distinct per taxonomy entry: discovery 2, no sources 3, compile 4,
    /// link 5, missing artifact 6, spawn 7, other I/O 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            BuildError::Discovery { .. } => 2,
            BuildError::NoSources { .. } => 3,
            BuildError::CompileFailed { .. } => 4,
            BuildError::LinkFailed { .. } => 5,
            BuildError::MissingArtifact { .. } => 6,
            BuildError::Spawn { .. } => 7,
            BuildError::BuildDir { .. } | BuildError::Clean { .. } => 1,
        }
    }
}
