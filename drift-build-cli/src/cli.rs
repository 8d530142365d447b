//! Command-line options

use clap::error::ErrorKind;
use clap::{crate_version, CommandFactory, Parser};
use drift_build::config::{
    DEFAULT_COMPILER, DEFAULT_OUTPUT, DEFAULT_RELEASE_OPT, DEFAULT_SANITIZER, DEFAULT_SOURCE_DIR,
    DEFAULT_STANDARD,
};
use drift_build::{BuildConfig, BuildProfile};
use std::path::PathBuf;

/// Legacy single-dash token that turns on the debug build
pub const LEGACY_DEBUG_FLAG: &str = "-bug";

/// Exit code for a command line that cannot be parsed (`EX_USAGE`)
pub const USAGE_EXIT_CODE: u8 = 64;

/// Compile every C source in a directory and link them into one executable.
#[derive(Parser, Debug)]
#[command(name = "drift-build", version = crate_version!())]
pub struct Opts {
    /// Instrumented build: adds the sanitizer, drops size optimization (also `-bug`)
    #[arg(long)]
    pub debug: bool,

    /// Compiler and linker executable
    #[arg(long = "cc", env = "DRIFT_CC", default_value = DEFAULT_COMPILER)]
    pub compiler: String,

    /// Wrapper run in front of the compiler, e.g. ccache
    #[arg(long, env = "DRIFT_CC_LAUNCHER")]
    pub launcher: Option<String>,

    /// Language standard flag
    #[arg(long = "std", default_value = DEFAULT_STANDARD, allow_hyphen_values = true)]
    pub standard: String,

    /// Directory holding the C sources
    #[arg(long, default_value = DEFAULT_SOURCE_DIR)]
    pub src_dir: PathBuf,

    /// Executable to produce
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Optimization flag for release builds
    #[arg(long = "opt", default_value = DEFAULT_RELEASE_OPT, allow_hyphen_values = true)]
    pub release_opt: String,

    /// Optimization flag for debug builds (compiler default if unset)
    #[arg(long, allow_hyphen_values = true)]
    pub debug_opt: Option<String>,

    /// Instrumentation flag used by debug builds
    #[arg(long, default_value = DEFAULT_SANITIZER, allow_hyphen_values = true)]
    pub sanitizer: String,

    /// Do not pass -g to the compiler
    #[arg(long)]
    pub no_debug_symbols: bool,

    /// Link with -ldl -rdynamic
    #[arg(long)]
    pub dynamic_exports: bool,

    /// Extra compiler flag (repeatable)
    #[arg(long = "cflag", allow_hyphen_values = true)]
    pub cflags: Vec<String>,

    /// Extra linker flag (repeatable)
    #[arg(long = "ldflag", allow_hyphen_values = true)]
    pub ldflags: Vec<String>,

    /// Write objects here instead of a temporary directory
    #[arg(long)]
    pub obj_dir: Option<PathBuf>,

    /// Leave object files in place after linking
    #[arg(long)]
    pub keep_objects: bool,

    /// Compile sources in file-name order instead of directory order
    #[arg(long)]
    pub sort: bool,

    /// Concurrent compiles (0 = one per CPU)
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,

    /// Print the commands without running them
    #[arg(long)]
    pub dry_run: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Opts {
    /// Build configuration for these options
    pub fn to_config(&self) -> BuildConfig {
        BuildConfig {
            compiler: self.compiler.clone(),
            launcher: self.launcher.clone(),
            standard: self.standard.clone(),
            source_dir: self.src_dir.clone(),
            output: self.output.clone(),
            profile: BuildProfile::from_debug(self.debug),
            release_opt: self.release_opt.clone(),
            debug_opt: self.debug_opt.clone(),
            debug_symbols: !self.no_debug_symbols,
            sanitizer: self.sanitizer.clone(),
            dynamic_exports: self.dynamic_exports,
            extra_cflags: self.cflags.clone(),
            extra_ldflags: self.ldflags.clone(),
            object_dir: self.obj_dir.clone(),
            keep_objects: self.keep_objects,
            sort_sources: self.sort,
            jobs: self.jobs,
            ..BuildConfig::default()
        }
    }
}

/// Parse normalized arguments without exiting the process
pub fn parse_opts<I>(args: I) -> Result<Opts, clap::Error>
where
    I: IntoIterator<Item = String>,
{
    Opts::try_parse_from(args)
}

/// Exit code for a parse error: 0 for `--help`/`--version`, [`USAGE_EXIT_CODE`] otherwise
pub fn usage_exit_code(err: &clap::Error) -> u8 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => USAGE_EXIT_CODE,
    }
}

/// Arguments after legacy translation and filtering
#[derive(Debug, Default, PartialEq, Eq)]
pub struct NormalizedArgs {
    /// Arguments handed to the parser, program name first
    pub args: Vec<String>,

    /// Arguments that were dropped as unrecognized
    pub ignored: Vec<String>,
}

/// Translate `-bug` to `--debug` and drop anything the parser does not know.
///
/// Unrecognized arguments never fail the run. Known options keep their
/// value, whether given inline (`--cc=clang`, `-j4`) or as the next argument.
pub fn normalize_args<I>(args: I) -> NormalizedArgs
where
    I: IntoIterator<Item = String>,
{
    let mut command = Opts::command();
    command.build();

    let mut normalized = NormalizedArgs::default();
    let mut iter = args.into_iter();
    if let Some(program) = iter.next() {
        normalized.args.push(program);
    }

    while let Some(arg) = iter.next() {
        if arg == LEGACY_DEBUG_FLAG {
            normalized.args.push("--debug".to_string());
            continue;
        }
        if arg == "--" {
            normalized.ignored.extend(iter.by_ref());
            break;
        }

        let known = if let Some(long) = arg.strip_prefix("--") {
            let (name, inline) = match long.split_once('=') {
                Some((name, _)) => (name, true),
                None => (long, false),
            };
            command
                .get_arguments()
                .find(|a| a.get_long() == Some(name))
                .map(|a| a.get_action().takes_values() && !inline)
        } else if let Some(shorts) = arg.strip_prefix('-') {
            let mut chars = shorts.chars();
            match (chars.next(), chars.as_str().is_empty()) {
                (Some(c), bare) => command
                    .get_arguments()
                    .find(|a| a.get_short() == Some(c))
                    .map(|a| a.get_action().takes_values() && bare),
                (None, _) => None,
            }
        } else {
            None
        };

        match known {
            Some(needs_value) => {
                normalized.args.push(arg);
                if needs_value {
                    if let Some(value) = iter.next() {
                        normalized.args.push(value);
                    }
                }
            }
            None => normalized.ignored.push(arg),
        }
    }

    normalized
}
