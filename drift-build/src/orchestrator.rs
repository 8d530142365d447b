//! The build procedure: discover, compile each, link all, clean, report.
//!
//! Objects are written to a build directory owned by the run instead of the
//! invocation directory. By default that is a temporary directory created
//! next to the output and removed when the run ends, so unrelated object
//! files are never touched.

use crate::command::{BuildPlan, CompileStep};
use crate::config::BuildConfig;
use crate::discover::{discover_sources, SourceFile};
use crate::error::{BuildError, BuildResult};
use crate::process::{ProcessRunner, ToolRunner};
use crate::report::BuildReport;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, info_span, warn};

/// Object directory shown in plans when no build directory exists yet
pub const PLANNED_BUILD_DIR: &str = ".drift-build";

/// Drives one build from a configuration
pub struct Orchestrator<R = ProcessRunner> {
    config: BuildConfig,
    runner: R,
}

impl Orchestrator<ProcessRunner> {
    /// Orchestrator that spawns real compiler processes
    pub fn new(config: BuildConfig) -> Self {
        Self::with_runner(config, ProcessRunner)
    }
}

impl<R: ToolRunner> Orchestrator<R> {
    /// Orchestrator using a custom tool runner
    pub fn with_runner(config: BuildConfig, runner: R) -> Self {
        Self { config, runner }
    }

    /// The configuration this orchestrator builds with
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// The tool runner
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Discover sources and plan every command without running any.
    pub fn plan(&self) -> BuildResult<BuildPlan> {
        let sources = self.discover()?;
        let object_dir = match &self.config.object_dir {
            Some(dir) => dir.clone(),
            None => output_parent(&self.config.output).join(PLANNED_BUILD_DIR),
        };
        Ok(BuildPlan::new(&self.config, &sources, &object_dir))
    }

    /// Run the full build.
    ///
    /// Fails on the first problem: a missing source directory or an empty
    /// one aborts before any tool runs, a failed compile skips the link.
    /// Intermediate objects are cleaned up whether or not the build succeeds.
    pub fn build(&self) -> BuildResult<BuildReport> {
        let span = info_span!("build", profile = %self.config.profile);
        let _enter = span.enter();
        let start = Instant::now();

        let sources = self.discover()?;
        let build_dir = BuildDir::prepare(&self.config)?;
        let plan = BuildPlan::new(&self.config, &sources, build_dir.path());
        debug!("Build directory: {}", build_dir.path().display());

        let mut produced = Vec::new();
        let outcome = self
            .compile_all(&plan, &mut produced)
            .and_then(|()| self.link(&plan))
            .and_then(|()| self.artifact_size());
        let cleaned = build_dir.clean(&produced);
        let size_bytes = outcome?;
        cleaned?;

        Ok(BuildReport {
            artifact: self.config.output.clone(),
            size_bytes,
            sources: sources.len(),
            profile: self.config.profile,
            elapsed: start.elapsed(),
        })
    }

    fn discover(&self) -> BuildResult<Vec<SourceFile>> {
        let sources = discover_sources(&self.config)?;
        if sources.is_empty() {
            return Err(BuildError::NoSources {
                dir: self.config.source_dir.clone(),
            });
        }
        info!(
            "Found {} sources in {}",
            sources.len(),
            self.config.source_dir.display()
        );
        Ok(sources)
    }

    /// Compile every step, recording in `produced` the objects this run wrote
    fn compile_all(&self, plan: &BuildPlan, produced: &mut Vec<PathBuf>) -> BuildResult<()> {
        let total = plan.compiles.len();
        let jobs = self.config.effective_jobs().min(total);

        if jobs <= 1 {
            return self.compile_sequential(plan, produced);
        }

        let pool = match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
            Ok(pool) => pool,
            Err(e) => {
                warn!("Cannot start {} compile threads ({}), compiling sequentially", jobs, e);
                return self.compile_sequential(plan, produced);
            }
        };

        debug!("Compiling with {} jobs", jobs);
        let results: Vec<BuildResult<()>> = pool.install(|| {
            plan.compiles
                .par_iter()
                .enumerate()
                .map(|(index, step)| self.compile(index, total, step))
                .collect()
        });

        produced.extend(
            plan.compiles
                .iter()
                .zip(&results)
                .filter(|(_, result)| result.is_ok())
                .map(|(step, _)| step.object.clone()),
        );

        // First failure in discovery order, so the report is deterministic.
        results.into_iter().collect()
    }

    fn compile_sequential(&self, plan: &BuildPlan, produced: &mut Vec<PathBuf>) -> BuildResult<()> {
        let total = plan.compiles.len();
        for (index, step) in plan.compiles.iter().enumerate() {
            self.compile(index, total, step)?;
            produced.push(step.object.clone());
        }
        Ok(())
    }

    fn compile(&self, index: usize, total: usize, step: &CompileStep) -> BuildResult<()> {
        info!("[{}/{}] {}", index + 1, total, step.source.name);
        debug!("{}", step.command);

        let status = self.runner.run(&step.command)?;
        if status.success() {
            Ok(())
        } else {
            Err(BuildError::CompileFailed {
                source_file: step.source.path.clone(),
                status,
            })
        }
    }

    fn link(&self, plan: &BuildPlan) -> BuildResult<()> {
        info!("Linking {}", self.config.output.display());
        debug!("{}", plan.link);

        let status = self.runner.run(&plan.link)?;
        if status.success() {
            Ok(())
        } else {
            Err(BuildError::LinkFailed { status })
        }
    }

    fn artifact_size(&self) -> BuildResult<u64> {
        let metadata =
            std::fs::metadata(&self.config.output).map_err(|source| BuildError::MissingArtifact {
                path: self.config.output.clone(),
                source,
            })?;
        Ok(metadata.len())
    }
}

/// Directory the output lands in, `.` for a bare file name
fn output_parent(output: &Path) -> PathBuf {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Where this run writes its objects
enum BuildDir {
    /// Owned directory, removed with everything in it
    Temporary(TempDir),

    /// Caller-visible directory; only objects this run wrote are removed
    Persistent { path: PathBuf, keep_objects: bool },
}

impl BuildDir {
    fn prepare(config: &BuildConfig) -> BuildResult<Self> {
        let persistent = match &config.object_dir {
            Some(dir) => Some(dir.clone()),
            None if config.keep_objects => {
                Some(output_parent(&config.output).join(PLANNED_BUILD_DIR))
            }
            None => None,
        };

        match persistent {
            Some(path) => {
                std::fs::create_dir_all(&path).map_err(|source| BuildError::BuildDir { source })?;
                Ok(BuildDir::Persistent {
                    path,
                    keep_objects: config.keep_objects,
                })
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix(".drift-build-")
                    .tempdir_in(output_parent(&config.output))
                    .map_err(|source| BuildError::BuildDir { source })?;
                Ok(BuildDir::Temporary(dir))
            }
        }
    }

    fn path(&self) -> &Path {
        match self {
            BuildDir::Temporary(dir) => dir.path(),
            BuildDir::Persistent { path, .. } => path,
        }
    }

    /// Remove intermediates; in a caller-visible directory only `produced` goes
    fn clean(self, produced: &[PathBuf]) -> BuildResult<()> {
        match self {
            BuildDir::Temporary(dir) => {
                let path = dir.path().to_path_buf();
                dir.close()
                    .map_err(|source| BuildError::Clean { path, source })
            }
            BuildDir::Persistent { keep_objects: true, path } => {
                info!("Keeping objects in {}", path.display());
                Ok(())
            }
            BuildDir::Persistent { .. } => {
                for object in produced {
                    match std::fs::remove_file(object) {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(source) => {
                            return Err(BuildError::Clean {
                                path: object.clone(),
                                source,
                            })
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ToolCommand;
    use crate::config::BuildProfile;
    use crate::process::ToolStatus;
    use std::fs;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    /// Records every command and fakes the compiler's file output
    #[derive(Default)]
    struct RecordingRunner {
        commands: Mutex<Vec<ToolCommand>>,
        fail_on: Option<String>,
        link_status: Option<ToolStatus>,
    }

    impl RecordingRunner {
        fn commands(&self) -> Vec<ToolCommand> {
            self.commands.lock().unwrap().clone()
        }
    }

    impl ToolRunner for RecordingRunner {
        fn run(&self, command: &ToolCommand) -> BuildResult<ToolStatus> {
            self.commands.lock().unwrap().push(command.clone());

            let is_compile = command.has_arg("-c");
            if is_compile {
                if let Some(bad) = &self.fail_on {
                    if command.args.iter().any(|a| a.ends_with(bad.as_str())) {
                        return Ok(ToolStatus::Exited(1));
                    }
                }
            } else if let Some(status) = self.link_status {
                return Ok(status);
            }

            let output = command
                .args
                .iter()
                .position(|a| a == "-o")
                .and_then(|i| command.args.get(i + 1))
                .expect("command names an output");
            fs::write(output, command.to_string()).unwrap();
            Ok(ToolStatus::Success)
        }
    }

    struct Fixture {
        _tmp: TempDir,
        root: PathBuf,
    }

    impl Fixture {
        fn new(sources: &[&str]) -> Self {
            let tmp = TempDir::new().unwrap();
            let root = tmp.path().to_path_buf();
            fs::create_dir(root.join("src")).unwrap();
            for name in sources {
                fs::write(root.join("src").join(name), "int x;\n").unwrap();
            }
            Self { _tmp: tmp, root }
        }

        fn config(&self) -> BuildConfig {
            BuildConfig {
                source_dir: self.root.join("src"),
                output: self.root.join("drift"),
                sort_sources: true,
                ..BuildConfig::default()
            }
        }

        fn leftover_objects(&self) -> Vec<PathBuf> {
            walkdir::WalkDir::new(&self.root)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "o"))
                .map(|e| e.path().to_path_buf())
                .collect()
        }
    }

    #[traced_test]
    #[test]
    fn builds_links_and_cleans() {
        let fixture = Fixture::new(&["a.c", "b.c"]);
        let orchestrator = Orchestrator::with_runner(fixture.config(), RecordingRunner::default());

        let report = orchestrator.build().unwrap();

        assert_eq!(report.sources, 2);
        assert!(report.size_bytes > 0);
        assert!(fixture.root.join("drift").is_file());
        assert!(fixture.leftover_objects().is_empty());

        let commands = orchestrator.runner().commands();
        assert_eq!(commands.len(), 3);
        assert!(commands[0].has_arg(&fixture.root.join("src/a.c").to_string_lossy()));
        assert!(commands[1].has_arg(&fixture.root.join("src/b.c").to_string_lossy()));
        let link = &commands[2];
        assert!(!link.has_arg("-c"));
        assert!(link.args.iter().any(|a| a.ends_with("a.o")));
        assert!(link.args.iter().any(|a| a.ends_with("b.o")));
        assert!(logs_contain("[1/2] a.c"));
        assert!(logs_contain("[2/2] b.c"));
    }

    #[test]
    fn no_sources_never_links() {
        let fixture = Fixture::new(&[]);
        fs::write(fixture.root.join("src/notes.txt"), "").unwrap();
        let orchestrator = Orchestrator::with_runner(fixture.config(), RecordingRunner::default());

        assert!(matches!(
            orchestrator.build(),
            Err(BuildError::NoSources { .. })
        ));
        assert!(orchestrator.runner().commands().is_empty());
    }

    #[test]
    fn missing_source_dir_fails_before_any_tool() {
        let fixture = Fixture::new(&[]);
        let config = BuildConfig {
            source_dir: fixture.root.join("missing"),
            ..fixture.config()
        };
        let orchestrator = Orchestrator::with_runner(config, RecordingRunner::default());

        assert!(matches!(
            orchestrator.build(),
            Err(BuildError::Discovery { .. })
        ));
        assert!(orchestrator.runner().commands().is_empty());
    }

    #[test]
    fn compile_failure_skips_link_and_names_file() {
        let fixture = Fixture::new(&["a.c", "b.c", "c.c"]);
        let runner = RecordingRunner {
            fail_on: Some("b.c".to_string()),
            ..RecordingRunner::default()
        };
        let orchestrator = Orchestrator::with_runner(fixture.config(), runner);

        match orchestrator.build() {
            Err(BuildError::CompileFailed {
                source_file,
                status,
            }) => {
                assert_eq!(source_file, fixture.root.join("src/b.c"));
                assert_eq!(status, ToolStatus::Exited(1));
            }
            other => panic!("expected compile failure, got {other:?}"),
        }

        let commands = orchestrator.runner().commands();
        assert_eq!(commands.len(), 2, "stops at the first failing compile");
        assert!(commands.iter().all(|c| c.has_arg("-c")));
        assert!(!fixture.root.join("drift").exists());
        assert!(fixture.leftover_objects().is_empty());
    }

    #[test]
    fn link_failure_is_reported() {
        let fixture = Fixture::new(&["a.c"]);
        let runner = RecordingRunner {
            link_status: Some(ToolStatus::Exited(2)),
            ..RecordingRunner::default()
        };
        let orchestrator = Orchestrator::with_runner(fixture.config(), runner);

        assert!(matches!(
            orchestrator.build(),
            Err(BuildError::LinkFailed {
                status: ToolStatus::Exited(2)
            })
        ));
        assert!(fixture.leftover_objects().is_empty());
    }

    #[test]
    fn successful_link_without_artifact_is_missing_artifact() {
        let fixture = Fixture::new(&["a.c"]);
        let runner = RecordingRunner {
            link_status: Some(ToolStatus::Success),
            ..RecordingRunner::default()
        };
        let obj_dir = fixture.root.join("obj");
        let config = BuildConfig {
            object_dir: Some(obj_dir.clone()),
            ..fixture.config()
        };
        let orchestrator = Orchestrator::with_runner(config, runner);

        assert!(matches!(
            orchestrator.build(),
            Err(BuildError::MissingArtifact { .. })
        ));
        let commands = orchestrator.runner().commands();
        assert!(!commands.last().unwrap().has_arg("-c"), "the link is the last tool run");
        assert!(fixture.leftover_objects().is_empty());
        assert!(obj_dir.is_dir());
    }

    #[test]
    fn debug_build_is_instrumented_end_to_end() {
        let fixture = Fixture::new(&["a.c"]);
        let config = BuildConfig {
            profile: BuildProfile::Debug,
            ..fixture.config()
        };
        let orchestrator = Orchestrator::with_runner(config, RecordingRunner::default());
        let report = orchestrator.build().unwrap();
        assert_eq!(report.profile, BuildProfile::Debug);

        for command in orchestrator.runner().commands() {
            assert!(command.has_arg("-fsanitize=address"));
            assert!(!command.has_arg("-Os"));
        }
    }

    #[test]
    fn unrelated_objects_survive_the_clean() {
        let fixture = Fixture::new(&["a.c"]);
        let obj_dir = fixture.root.join("obj");
        fs::create_dir(&obj_dir).unwrap();
        fs::write(obj_dir.join("unrelated.o"), "keep me").unwrap();
        fs::write(fixture.root.join("stray.o"), "keep me too").unwrap();

        let config = BuildConfig {
            object_dir: Some(obj_dir.clone()),
            ..fixture.config()
        };
        Orchestrator::with_runner(config, RecordingRunner::default())
            .build()
            .unwrap();

        assert!(obj_dir.join("unrelated.o").exists());
        assert!(!obj_dir.join("a.o").exists());
        assert!(fixture.root.join("stray.o").exists());
    }

    #[test]
    fn failed_build_leaves_objects_it_never_wrote() {
        let fixture = Fixture::new(&["a.c", "b.c"]);
        let obj_dir = fixture.root.join("obj");
        fs::create_dir(&obj_dir).unwrap();
        fs::write(obj_dir.join("b.o"), "from an earlier build").unwrap();

        let runner = RecordingRunner {
            fail_on: Some("a.c".to_string()),
            ..RecordingRunner::default()
        };
        let config = BuildConfig {
            object_dir: Some(obj_dir.clone()),
            ..fixture.config()
        };

        assert!(matches!(
            Orchestrator::with_runner(config, runner).build(),
            Err(BuildError::CompileFailed { .. })
        ));
        assert_eq!(
            fs::read_to_string(obj_dir.join("b.o")).unwrap(),
            "from an earlier build"
        );
    }

    #[test]
    fn failed_build_removes_objects_it_wrote() {
        let fixture = Fixture::new(&["a.c", "b.c", "c.c"]);
        let obj_dir = fixture.root.join("obj");
        fs::create_dir(&obj_dir).unwrap();
        fs::write(obj_dir.join("c.o"), "from an earlier build").unwrap();

        let runner = RecordingRunner {
            fail_on: Some("b.c".to_string()),
            ..RecordingRunner::default()
        };
        let config = BuildConfig {
            object_dir: Some(obj_dir.clone()),
            ..fixture.config()
        };

        assert!(Orchestrator::with_runner(config, runner).build().is_err());
        assert!(!obj_dir.join("a.o").exists());
        assert!(obj_dir.join("c.o").exists());
    }

    #[test]
    fn parallel_failure_removes_only_successful_objects() {
        let fixture = Fixture::new(&["a.c", "b.c", "c.c"]);
        let obj_dir = fixture.root.join("obj");
        fs::create_dir(&obj_dir).unwrap();
        fs::write(obj_dir.join("b.o"), "from an earlier build").unwrap();

        let runner = RecordingRunner {
            fail_on: Some("b.c".to_string()),
            ..RecordingRunner::default()
        };
        let config = BuildConfig {
            object_dir: Some(obj_dir.clone()),
            jobs: 3,
            ..fixture.config()
        };

        assert!(Orchestrator::with_runner(config, runner).build().is_err());
        assert!(!obj_dir.join("a.o").exists());
        assert!(!obj_dir.join("c.o").exists());
        assert!(obj_dir.join("b.o").exists());
    }

    #[test]
    fn keep_objects_retains_them() {
        let fixture = Fixture::new(&["a.c", "b.c"]);
        let config = BuildConfig {
            keep_objects: true,
            ..fixture.config()
        };
        Orchestrator::with_runner(config, RecordingRunner::default())
            .build()
            .unwrap();

        let kept = fixture.root.join(PLANNED_BUILD_DIR);
        assert!(kept.join("a.o").is_file());
        assert!(kept.join("b.o").is_file());
    }

    #[test]
    fn parallel_compiles_finish_before_link() {
        let fixture = Fixture::new(&["a.c", "b.c", "c.c", "d.c"]);
        let config = BuildConfig {
            jobs: 4,
            ..fixture.config()
        };
        let orchestrator = Orchestrator::with_runner(config, RecordingRunner::default());
        orchestrator.build().unwrap();

        let commands = orchestrator.runner().commands();
        assert_eq!(commands.len(), 5);
        assert!(commands[..4].iter().all(|c| c.has_arg("-c")));
        assert!(!commands[4].has_arg("-c"));
    }

    #[test]
    fn parallel_failure_reports_first_in_discovery_order() {
        let fixture = Fixture::new(&["a.c", "b.c", "c.c", "d.c"]);
        let runner = RecordingRunner {
            fail_on: Some(".c".to_string()),
            ..RecordingRunner::default()
        };
        let config = BuildConfig {
            jobs: 3,
            ..fixture.config()
        };
        let orchestrator = Orchestrator::with_runner(config, runner);

        match orchestrator.build() {
            Err(BuildError::CompileFailed { source_file, .. }) => {
                assert_eq!(source_file, fixture.root.join("src/a.c"))
            }
            other => panic!("expected compile failure, got {other:?}"),
        }
        assert!(orchestrator
            .runner()
            .commands()
            .iter()
            .all(|c| c.has_arg("-c")));
    }

    #[test]
    fn plan_runs_nothing() {
        let fixture = Fixture::new(&["a.c", "b.c"]);
        let orchestrator = Orchestrator::with_runner(fixture.config(), RecordingRunner::default());

        let plan = orchestrator.plan().unwrap();
        assert_eq!(plan.compiles.len(), 2);
        assert!(plan.compiles[0]
            .object
            .starts_with(fixture.root.join(PLANNED_BUILD_DIR)));
        assert!(orchestrator.runner().commands().is_empty());
        assert!(!fixture.root.join(PLANNED_BUILD_DIR).exists());
    }
}
