use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use url::Url;

use untangle_normalize::PackageName;
use untangle_pep440::Version;
use untangle_settings::{EnvVars, Options};

#[derive(Parser)]
#[command(name = "untangle", author, version, about)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,

    /// Only print errors.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    pub(crate) quiet: bool,

    /// Use verbose output, `-vv` to trace every resolution round.
    ///
    /// You can configure fine-grained logging using the `RUST_LOG` environment variable.
    /// (<https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html#directives>)
    #[arg(global = true, action = ArgAction::Count, long, short, conflicts_with = "quiet")]
    pub(crate) verbose: u8,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Resolve requirements and print the lock as JSON.
    Resolve(ResolveArgs),
    /// Print the build system declared by a source distribution as JSON.
    BuildRequirements(BuildRequirementsArgs),
}

#[derive(Args)]
pub(crate) struct ResolveArgs {
    /// A requirement to resolve, such as `requests[socks]>=2`. Can be repeated.
    #[arg(short = 'r', long = "requirements-list", required = true, value_name = "REQUIREMENT")]
    pub(crate) requirements: Vec<String>,

    /// Always get the metadata of this package's source distributions from the build backend.
    #[arg(long, value_name = "NAME")]
    pub(crate) legacy_metadata: Vec<PackageName>,

    /// Record the index responses, metadata and lock as a test case with this name.
    #[arg(long, value_name = "NAME")]
    pub(crate) record_test_case: Option<String>,

    /// The Simple API root [default: https://pypi.org/simple]
    #[arg(long, env = EnvVars::UNTANGLE_INDEX_URL)]
    pub(crate) index_url: Option<Url>,

    /// The interpreter to take environment markers from and to run build backends with
    /// [default: python3]
    #[arg(long, env = EnvVars::UNTANGLE_PYTHON)]
    pub(crate) python: Option<PathBuf>,

    /// Resolve for this Python version instead of the interpreter's.
    #[arg(long)]
    pub(crate) python_version: Option<Version>,

    /// Give up after this many resolution rounds [default: 10000]
    #[arg(long)]
    pub(crate) max_rounds: Option<usize>,

    /// Give up if resolving takes longer than this many seconds.
    #[arg(long, value_name = "SECS")]
    pub(crate) timeout: Option<u64>,

    /// Where test cases are recorded [default: tests/cases]
    #[arg(long)]
    pub(crate) fixtures_dir: Option<PathBuf>,

    /// Read the configuration from this file instead of `untangle.toml` or `pyproject.toml`.
    #[arg(long, conflicts_with = "no_config")]
    pub(crate) config_file: Option<PathBuf>,

    /// Don't read any configuration file.
    #[arg(long)]
    pub(crate) no_config: bool,
}

impl ResolveArgs {
    /// The options given on the command line, to be combined with the configuration file.
    pub(crate) fn options(&self) -> Options {
        Options {
            index_url: self.index_url.clone(),
            python: self.python.clone(),
            python_version: self.python_version.clone(),
            legacy_metadata: (!self.legacy_metadata.is_empty())
                .then(|| self.legacy_metadata.clone()),
            max_rounds: self.max_rounds,
            timeout: self.timeout,
            fixtures_dir: self.fixtures_dir.clone(),
        }
    }
}

#[derive(Args)]
pub(crate) struct BuildRequirementsArgs {
    /// A local `.tar.gz` source distribution.
    pub(crate) sdist: PathBuf,
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, Commands};

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn resolve_args() {
        let cli = Cli::try_parse_from([
            "untangle",
            "-vv",
            "resolve",
            "-r",
            "requests[socks]",
            "--requirements-list",
            "urllib3<2",
            "--legacy-metadata",
            "PyYAML",
            "--max-rounds",
            "50",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Resolve(args) = cli.command else {
            panic!("expected `resolve`");
        };
        assert_eq!(args.requirements, ["requests[socks]", "urllib3<2"]);

        let options = args.options();
        assert_eq!(options.max_rounds, Some(50));
        assert_eq!(options.legacy_metadata.unwrap()[0].as_ref(), "pyyaml");
        assert_eq!(options.timeout, None);
    }

    #[test]
    fn requirement_is_required() {
        assert!(Cli::try_parse_from(["untangle", "resolve"]).is_err());
    }
}
