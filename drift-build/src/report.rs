//! Build report

use crate::config::BuildProfile;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of a successful build
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Linked executable
    pub artifact: PathBuf,

    /// Executable size in bytes
    pub size_bytes: u64,

    /// Number of compiled sources
    pub sources: usize,

    /// Profile the build used
    pub profile: BuildProfile,

    /// Wall-clock time of the run
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl BuildReport {
    /// Size in decimal kilobytes (bytes / 1000)
    pub fn size_kb(&self) -> f64 {
        self.size_bytes as f64 / 1000.0
    }
}

impl std::fmt::Display for BuildReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Done! {:.3} KB", self.size_kb())
    }
}
