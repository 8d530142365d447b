//! Compile and link command construction
//!
//! Everything here is a pure function of the [`BuildConfig`] and its inputs,
//! so the exact flag sets can be checked without a C toolchain.

use crate::config::{BuildConfig, DYNAMIC_EXPORT_FLAGS};
use crate::discover::SourceFile;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCommand {
    /// Executable to run
    pub program: String,

    /// Arguments, in order
    pub args: Vec<String>,
}

impl ToolCommand {
    /// Command with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Whether `flag` appears among the arguments
    pub fn has_arg(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }
}

impl std::fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_=+./,:@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Start a command with the launcher (if any) in front of the compiler
fn compiler_invocation(config: &BuildConfig) -> ToolCommand {
    match &config.launcher {
        Some(launcher) => ToolCommand::new(launcher.clone()).arg(config.compiler.clone()),
        None => ToolCommand::new(config.compiler.clone()),
    }
}

/// Command compiling one source into `object`.
///
/// `compiler <std> -c [<opt>] [-g] [<sanitizer>] <cflags>... <source> -o <object>`
pub fn compile_command(config: &BuildConfig, source: &Path, object: &Path) -> ToolCommand {
    let mut command = compiler_invocation(config)
        .arg(config.standard.clone())
        .arg("-c");

    if let Some(opt) = config.opt_flag() {
        command = command.arg(opt);
    }
    if config.debug_symbols {
        command = command.arg("-g");
    }
    if let Some(sanitizer) = config.sanitizer_flag() {
        command = command.arg(sanitizer);
    }

    command
        .args(config.extra_cflags.iter().cloned())
        .arg(path_arg(source))
        .arg("-o")
        .arg(path_arg(object))
}

/// Command linking every object, in order, into the configured output.
///
/// `compiler [<sanitizer>] <objects>... [-ldl -rdynamic] <ldflags>... -o <output>`
pub fn link_command(config: &BuildConfig, objects: &[PathBuf]) -> ToolCommand {
    let mut command = compiler_invocation(config);

    if let Some(sanitizer) = config.sanitizer_flag() {
        command = command.arg(sanitizer);
    }
    command = command.args(objects.iter().map(|o| path_arg(o)));
    if config.dynamic_exports {
        command = command.args(DYNAMIC_EXPORT_FLAGS);
    }

    command
        .args(config.extra_ldflags.iter().cloned())
        .arg("-o")
        .arg(path_arg(&config.output))
}

/// One planned compilation
#[derive(Debug, Clone, Serialize)]
pub struct CompileStep {
    /// Source being compiled
    pub source: SourceFile,

    /// Object the compiler writes
    pub object: PathBuf,

    /// Full compiler invocation
    pub command: ToolCommand,
}

/// Every command a build will issue, in order
#[derive(Debug, Clone, Serialize)]
pub struct BuildPlan {
    /// Compilations, in discovery order
    pub compiles: Vec<CompileStep>,

    /// The single link of all objects
    pub link: ToolCommand,
}

impl BuildPlan {
    /// Plan a build of `sources` with objects placed in `object_dir`
    pub fn new(config: &BuildConfig, sources: &[SourceFile], object_dir: &Path) -> Self {
        let compiles: Vec<CompileStep> = sources
            .iter()
            .map(|source| {
                let object = object_dir.join(&source.object_name);
                let command = compile_command(config, &source.path, &object);
                CompileStep {
                    source: source.clone(),
                    object,
                    command,
                }
            })
            .collect();

        let objects: Vec<PathBuf> = compiles.iter().map(|c| c.object.clone()).collect();
        let link = link_command(config, &objects);

        Self { compiles, link }
    }

    /// Object paths the link consumes
    pub fn objects(&self) -> impl Iterator<Item = &Path> {
        self.compiles.iter().map(|c| c.object.as_path())
    }
}
