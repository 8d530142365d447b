//! Compile-and-link orchestration for the drift C sources.
//!
//! A build is one straight-line procedure:
//!
//! 1. **Discover** the `.c` files in a flat source directory
//! 2. **Compile** each one into an object in a build directory owned by the run
//! 3. **Link** all objects into a single executable
//! 4. **Clean** the intermediate objects
//! 5. **Report** the size of the executable
//!
//! Every external invocation goes through a [`ToolRunner`], and every command
//! is built by pure functions in [`command`], so flag sets can be checked
//! without a C toolchain.
//!
//! # Example
//!
//! ```no_run
//! use drift_build::{BuildConfig, BuildProfile, Orchestrator};
//!
//! let config = BuildConfig {
//!     profile: BuildProfile::Debug,
//!     ..BuildConfig::default()
//! };
//! let report = Orchestrator::new(config).build()?;
//! println!("{report}");
//! # Ok::<(), drift_build::BuildError>(())
//! ```

#![deny(unsafe_code)]

pub mod command;
pub mod config;
pub mod discover;
pub mod error;
pub mod orchestrator;
pub mod process;
pub mod report;

pub use command::{compile_command, link_command, BuildPlan, CompileStep, ToolCommand};
pub use config::{BuildConfig, BuildProfile};
pub use discover::{discover_sources, SourceFile};
pub use error::{BuildError, BuildResult};
pub use orchestrator::Orchestrator;
pub use process::{ProcessRunner, ToolRunner, ToolStatus};
pub use report::BuildReport;
