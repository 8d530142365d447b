//! Source discovery
//!
//! Sources are the direct children of the configured source directory whose
//! name ends in the source suffix. There is no recursion: one translation
//! unit per file in one flat directory.
//!
//! Unless [`BuildConfig::sort_sources`] is set, sources are returned in the
//! order the filesystem enumerates them. That order is not stable across
//! filesystems and decides the compile order, and with it the order in which
//! compiler diagnostics appear on screen.

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// One source file selected for compilation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    /// Path to the source, as found under the source directory
    pub path: PathBuf,

    /// File name of the source (e.g. `vm.c`)
    pub name: String,

    /// File name of the corresponding object (e.g. `vm.o`)
    pub object_name: String,
}

impl SourceFile {
    /// Build a source entry from a file path.
    ///
    /// Returns `None` when the file name does not end in `.<source_ext>` or
    /// has nothing in front of the suffix.
    pub fn from_path(path: &Path, source_ext: &str, object_ext: &str) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let stem = object_stem(name, source_ext)?;
        Some(Self {
            path: path.to_path_buf(),
            name: name.to_string(),
            object_name: format!("{stem}.{object_ext}"),
        })
    }
}

/// Strip `.<ext>` from a file name, rejecting an empty stem
fn object_stem<'a>(name: &'a str, ext: &str) -> Option<&'a str> {
    let stem = name.strip_suffix(ext)?.strip_suffix('.')?;
    if stem.is_empty() {
        None
    } else {
        Some(stem)
    }
}

/// Scan the configured source directory.
///
/// Fails with [`BuildError::Discovery`] when the directory is missing or
/// cannot be listed, or when a source entry cannot be read. Other unreadable
/// entries, such as dangling symlinks to headers, are skipped with a warning.
/// An empty result is not an error here.
pub fn discover_sources(config: &BuildConfig) -> BuildResult<Vec<SourceFile>> {
    let dir = &config.source_dir;
    let discovery_error = |source: std::io::Error| BuildError::Discovery {
        dir: dir.clone(),
        source,
    };

    let metadata = std::fs::metadata(dir).map_err(discovery_error)?;
    if !metadata.is_dir() {
        return Err(discovery_error(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a directory",
        )));
    }

    let mut walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true);
    if config.sort_sources {
        walker = walker.sort_by_file_name();
    }

    let mut sources = Vec::new();
    let source_suffix = format!(".{}", config.source_extension);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                // Unreadable entries only matter when they would have been sources.
                let skippable = err.depth() > 0
                    && err.path().is_some_and(|path| {
                        SourceFile::from_path(path, &config.source_extension, &config.object_extension)
                            .is_none()
                    });
                if !skippable {
                    return Err(discovery_error(err.into()));
                }
                warn!("Skipping unreadable entry: {}", err);
                continue;
            }
        };
        let path = entry.path();

        if entry.file_name().to_str().is_none()
            && entry.file_name().to_string_lossy().ends_with(&source_suffix)
        {
            warn!("Skipping {}: file name is not valid UTF-8", path.display());
            continue;
        }

        let Some(source) =
            SourceFile::from_path(path, &config.source_extension, &config.object_extension)
        else {
            continue;
        };

        if !entry.file_type().is_file() {
            warn!("Skipping {}: not a regular file", path.display());
            continue;
        }

        debug!("Found source {}", source.name);
        sources.push(source);
    }

    Ok(sources)
}
