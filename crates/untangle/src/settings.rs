use std::env::VarError;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use url::Url;

use untangle_client::{DEFAULT_RETRIES, DEFAULT_TIMEOUT};
use untangle_resolver::{DEFAULT_MAX_ROUNDS, ResolveOptions};
use untangle_settings::{Combine, EnvVars, FilesystemOptions, Options};

use crate::cli::ResolveArgs;

const DEFAULT_INDEX_URL: &str = "https://pypi.org/simple";
const DEFAULT_PYTHON: &str = "python3";
const DEFAULT_FIXTURES_DIR: &str = "tests/cases";

/// The resolved settings to use for a `resolve` invocation.
#[derive(Debug, Clone)]
pub(crate) struct ResolveSettings {
    pub(crate) requirements: Vec<String>,
    pub(crate) record_test_case: Option<String>,
    pub(crate) index_url: Url,
    pub(crate) python: PathBuf,
    pub(crate) fixtures_dir: PathBuf,
    pub(crate) http_retries: u32,
    pub(crate) http_timeout: Duration,
    pub(crate) options: ResolveOptions,
}

impl ResolveSettings {
    /// Resolve the [`ResolveSettings`] from the CLI and filesystem configuration.
    pub(crate) fn resolve(args: ResolveArgs, filesystem: Option<FilesystemOptions>) -> Result<Self> {
        let Options {
            index_url,
            python,
            python_version,
            legacy_metadata,
            max_rounds,
            timeout,
            fixtures_dir,
        } = args
            .options()
            .combine(filesystem.map(FilesystemOptions::into_options).unwrap_or_default());

        let index_url = match index_url {
            Some(index_url) => index_url,
            None => Url::parse(DEFAULT_INDEX_URL).context("Invalid default index URL")?,
        };

        Ok(Self {
            requirements: args.requirements,
            record_test_case: args.record_test_case,
            index_url,
            python: python.unwrap_or_else(|| PathBuf::from(DEFAULT_PYTHON)),
            fixtures_dir: fixtures_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_FIXTURES_DIR)),
            http_retries: env(EnvVars::UNTANGLE_HTTP_RETRIES)?.unwrap_or(DEFAULT_RETRIES),
            http_timeout: env(EnvVars::UNTANGLE_HTTP_TIMEOUT)?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
            options: ResolveOptions {
                python_version,
                legacy_metadata: legacy_metadata.unwrap_or_default(),
                max_rounds: max_rounds.unwrap_or(DEFAULT_MAX_ROUNDS),
                timeout: timeout.map(Duration::from_secs),
            },
        })
    }
}

/// Parse an environment variable, if it is set.
fn env<T>(name: &'static str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(value) => match value.parse() {
            Ok(value) => Ok(Some(value)),
            Err(err) => bail!("Invalid value for {name}: `{value}` ({err})"),
        },
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => bail!("{name} is not valid unicode"),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use clap::Parser;
    use untangle_settings::Options;

    use crate::cli::{Cli, Commands, ResolveArgs};

    use super::ResolveSettings;

    fn resolve_args(args: &[&str]) -> ResolveArgs {
        let cli = Cli::try_parse_from(
            ["untangle", "resolve"]
                .iter()
                .chain(args)
                .copied()
                .collect::<Vec<_>>(),
        )
        .unwrap();
        let Commands::Resolve(args) = cli.command else {
            unreachable!()
        };
        args
    }

    #[test]
    fn defaults() {
        let settings = ResolveSettings::resolve(resolve_args(&["-r", "requests"]), None).unwrap();
        assert_eq!(settings.fixtures_dir, PathBuf::from("tests/cases"));
        assert_eq!(settings.options.max_rounds, 10_000);
        assert_eq!(settings.options.timeout, None);
        assert!(settings.options.legacy_metadata.is_empty());
    }

    #[test]
    fn command_line_overrides_file() {
        let file = Options {
            max_rounds: Some(20),
            timeout: Some(30),
            fixtures_dir: Some(PathBuf::from("/fixtures")),
            ..Options::default()
        };
        let settings = ResolveSettings::resolve(
            resolve_args(&["-r", "requests", "--max-rounds", "10"]),
            Some(file.into()),
        )
        .unwrap();
        assert_eq!(settings.options.max_rounds, 10);
        assert_eq!(settings.options.timeout, Some(Duration::from_secs(30)));
        assert_eq!(settings.fixtures_dir, PathBuf::from("/fixtures"));
    }
}
