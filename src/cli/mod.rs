//! Command-line entry point for configuration-driven programs.
//!
//! [`run`] wraps a program's main function: it parses the process
//! arguments for `-c <path>` file flags (applied in the order given) and
//! bare `key.path=value` tokens (applied after all files, left to right),
//! composes them over the given schema, and hands the finalized tree to
//! the function. Print flags (`-o`, `-i`, `-p`) turn the invocation into
//! an inspection run that skips the function entirely.
//!
//! ```rust,no_run
//! use meld::{cli, Field, Schema};
//!
//! fn main() -> anyhow::Result<()> {
//!     let schema = Schema::new("train")
//!         .field(Field::int("batch_size").default(32))
//!         .field(Field::str("corpus").required());
//!
//!     cli::run(schema, |config| {
//!         println!("training on {}", config.get_str("corpus")?);
//!         Ok(())
//!     })?;
//!     Ok(())
//! }
//! ```

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

use crate::compose::{Base, Composer, OverrideSource};
use crate::error::Error;
use crate::tree::{ConfigTree, ConfigValue};

/// Command-line surface shared by every meld-driven program.
#[derive(Debug, Parser)]
#[command(
    name = "meld",
    about = "Compose a configuration from schema defaults, YAML files, and key=value overrides"
)]
pub struct CliArgs {
    /// Path to a YAML file with configuration overrides; repeatable, applied in the order given
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Vec<PathBuf>,

    /// Print every configuration path with its default, then exit
    #[arg(short, long)]
    pub options: bool,

    /// Print the override sources as parsed, before merging
    #[arg(short, long)]
    pub inputs: bool,

    /// Print the merged configuration instead of running
    #[arg(short, long)]
    pub parsed: bool,

    /// Do not echo the configuration before running
    #[arg(short, long)]
    pub quiet: bool,

    /// Raise logging to debug level
    #[arg(short, long)]
    pub debug: bool,

    /// Configuration overrides as key.path=value, applied after all files
    #[arg(value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

/// Parses the process arguments and runs `main_fn` on the composed
/// configuration. The base is a structured schema or a raw tree. Returns
/// `Ok(None)` when a print flag suppressed the run.
pub fn run<T, F>(base: impl Into<Base>, main_fn: F) -> anyhow::Result<Option<T>>
where
    F: FnOnce(ConfigTree) -> anyhow::Result<T>,
{
    let args = CliArgs::parse();
    execute(base.into(), args, main_fn)
}

/// [`run`] over explicit arguments (without the program name); parse
/// failures are returned instead of exiting the process.
pub fn run_from<T, F, I, S>(base: impl Into<Base>, argv: I, main_fn: F) -> anyhow::Result<Option<T>>
where
    F: FnOnce(ConfigTree) -> anyhow::Result<T>,
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let argv = std::iter::once(OsString::from("meld")).chain(argv.into_iter().map(Into::into));
    let args = CliArgs::try_parse_from(argv)?;
    execute(base.into(), args, main_fn)
}

fn execute<T, F>(base: Base, args: CliArgs, main_fn: F) -> anyhow::Result<Option<T>>
where
    F: FnOnce(ConfigTree) -> anyhow::Result<T>,
{
    setup_logging(args.debug, args.quiet);

    // reject stray tokens before any printing or file access
    let mut pairs = Vec::new();
    for token in &args.overrides {
        if !token.contains('=') {
            return Err(Error::MalformedOverride {
                token: token.clone(),
            }
            .into());
        }
        pairs.push(OverrideSource::pair(token.clone()));
    }

    if args.options {
        let defaults = base.instantiate()?;
        println!("# options for `{}`", base.label());
        for (path, value) in defaults.leaves() {
            println!("{path} = {}", render_option(&value));
        }
    }

    if args.inputs {
        for path in &args.config {
            let map = OverrideSource::file(path).load()?;
            println!("# input file {}", path.display());
            print!("{}", map.to_yaml()?);
        }
        if !args.overrides.is_empty() {
            println!("# input overrides");
            for token in &args.overrides {
                println!("{token}");
            }
        }
    }

    let inspect_only = args.options || args.inputs;
    if inspect_only && !args.parsed {
        return Ok(None);
    }

    let mut composer = Composer::new(base);
    for path in &args.config {
        composer = composer.with_file(path);
    }
    for pair in pairs {
        composer = composer.with_source(pair);
    }
    let tree = composer.finalize()?;

    if args.parsed || !args.quiet {
        print!("{}", tree.to_yaml()?);
    }
    if inspect_only || args.parsed {
        return Ok(None);
    }
    Ok(Some(main_fn(tree)?))
}

fn render_option(value: &ConfigValue) -> String {
    match value {
        ConfigValue::Str(s) if s.is_empty() => "''".to_string(),
        other => other.to_string(),
    }
}

fn setup_logging(debug: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            tracing_subscriber::EnvFilter::new("debug")
        } else {
            tracing_subscriber::EnvFilter::new("warn")
        }
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, Schema};
    use std::io::Write;

    fn schema() -> Schema {
        Schema::new("train")
            .field(Field::int("batch_size").default(32))
            .field(Field::str("corpus").required())
    }

    #[test]
    fn pairs_apply_after_files_in_token_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "corpus: data/a.txt\nbatch_size: 64\n").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let result = run_from(
            schema(),
            ["-q", "-c", path.as_str(), "batch_size=128"],
            |config| {
                assert_eq!(config.get_int("batch_size")?, 128);
                assert_eq!(config.get_str("corpus")?, "data/a.txt");
                Ok(true)
            },
        )
        .unwrap();
        assert_eq!(result, Some(true));
    }

    #[test]
    fn print_only_flags_suppress_the_run() {
        let result = run_from(schema(), ["-o"], |_| Ok(42)).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn bare_tokens_without_equals_are_rejected() {
        let err = run_from(schema(), ["-q", "corpus"], |_| Ok(())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::MalformedOverride { .. })
        ));
    }

    #[test]
    fn unknown_flags_are_a_usage_error() {
        assert!(run_from(schema(), ["--no-such-flag"], |_| Ok(())).is_err());
    }

    #[test]
    fn strict_finalization_errors_reach_the_caller() {
        let err = run_from(schema(), ["-q"], |_| Ok(())).unwrap_err();
        match err.downcast_ref::<Error>() {
            Some(Error::MissingRequired { paths }) => assert_eq!(*paths, vec!["corpus"]),
            other => panic!("expected MissingRequired, got {other:?}"),
        }
    }
}
