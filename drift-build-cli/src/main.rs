//! drift-build - compile and link the drift C sources
//!
//! Runs one build:
//! 1. Discover `.c` files in the source directory
//! 2. Compile each into an object
//! 3. Link all objects into the executable
//! 4. Remove the objects
//! 5. Report the executable size
//!
//! Exit codes: 0 success, 2 source directory unreadable, 3 no sources,
//! 4 compile failure, 5 link failure, 6 artifact missing, 7 compiler not
//! runnable, 64 invalid command line, 1 anything else. `--help` and
//! `--version` exit 0.

mod cli;

use cli::{normalize_args, parse_opts, usage_exit_code};
use drift_build::{BuildError, Orchestrator};
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "drift_build=debug,drift_build_cli=debug"
    } else {
        "drift_build=info,drift_build_cli=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Cannot serialize output: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn fail(err: &BuildError) -> ExitCode {
    error!("{}", err);
    ExitCode::from(err.exit_code())
}

fn main() -> ExitCode {
    let normalized = normalize_args(std::env::args_os().map(|a| a.to_string_lossy().into_owned()));
    let opts = match parse_opts(normalized.args) {
        Ok(opts) => opts,
        Err(e) => {
            // Help and version text go to stdout, real errors to stderr.
            let _ = e.print();
            return ExitCode::from(usage_exit_code(&e));
        }
    };

    init_tracing(opts.verbose);
    if !normalized.ignored.is_empty() {
        debug!(
            "Ignoring unrecognized arguments: {}",
            normalized.ignored.join(" ")
        );
    }

    let config = opts.to_config();
    debug!("Configuration: {:?}", config);
    let orchestrator = Orchestrator::new(config);

    if opts.dry_run {
        let plan = match orchestrator.plan() {
            Ok(plan) => plan,
            Err(e) => return fail(&e),
        };
        if opts.json {
            return print_json(&plan);
        }
        for step in &plan.compiles {
            println!("{}", step.command);
        }
        println!("{}", plan.link);
        return ExitCode::SUCCESS;
    }

    match orchestrator.build() {
        Ok(report) if opts.json => print_json(&report),
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}
