use std::io::Write;
use std::str::FromStr;
use std::time::Instant;

use anstream::eprintln;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tracing::{debug, warn};

use untangle_build::Interpreter;
use untangle_client::{FixtureRecorder, RegistryClientBuilder};
use untangle_pep440::Version;
use untangle_pep508::{MarkerEnvironment, Requirement};
use untangle_resolver::{LockDocument, ResolveError, Session, generate_lock};

use crate::commands::{ExitStatus, elapsed};
use crate::settings::ResolveSettings;

/// Resolve the requirements and print the lock to stdout.
pub(crate) fn resolve(settings: ResolveSettings) -> Result<ExitStatus> {
    let start = Instant::now();

    let requirements = settings
        .requirements
        .iter()
        .map(|requirement| {
            Requirement::from_str(requirement)
                .with_context(|| format!("Invalid requirement `{requirement}`"))
        })
        .collect::<Result<Vec<_>>>()?;

    let client = RegistryClientBuilder::new(settings.index_url.clone())
        .retries(settings.http_retries)
        .timeout(settings.http_timeout)
        .build()?;
    let interpreter = interpreter(&settings);
    debug!(
        "Resolving for Python {} ({})",
        settings
            .options
            .python_version
            .as_ref()
            .unwrap_or(interpreter.version()),
        interpreter.sys_executable().display()
    );

    let recorder = settings
        .record_test_case
        .as_deref()
        .map(|name| FixtureRecorder::start(&settings.fixtures_dir, name, &settings.requirements))
        .transpose()?;

    let session = Session::new(&client, &interpreter, &settings.options, recorder.as_ref());
    let resolution = match session.resolve(requirements) {
        Ok(resolution) => resolution,
        Err(ResolveError::NoSolution(err)) => {
            eprintln!("{}: {err}", "error".red().bold());
            return Ok(ExitStatus::Failure);
        }
        Err(err) => return Err(err.into()),
    };
    let lock = generate_lock(&resolution);
    write_lock(&lock, recorder.as_ref(), &mut anstream::stdout().lock())?;
    debug!("Resolution took {}", elapsed(start.elapsed()));
    Ok(ExitStatus::Success)
}

/// Write the lock into the fixture when recording one, and to `stdout` otherwise.
fn write_lock(
    lock: &LockDocument,
    recorder: Option<&FixtureRecorder>,
    stdout: &mut impl Write,
) -> Result<()> {
    if let Some(recorder) = recorder {
        recorder.finish(lock)?;
    } else {
        serde_json::to_writer_pretty(&mut *stdout, lock)?;
        writeln!(stdout)?;
    }
    Ok(())
}

/// Query the configured interpreter, or fall back to the markers of this machine. Without an
/// interpreter, source distributions without metadata can't be built.
fn interpreter(settings: &ResolveSettings) -> Interpreter {
    match Interpreter::query(&settings.python) {
        Ok(interpreter) => interpreter,
        Err(err) => {
            let python_version = settings
                .options
                .python_version
                .clone()
                .unwrap_or_else(|| Version::new([3, 12]));
            warn!(
                "Failed to query `{}`, using the markers of this machine with Python {python_version}: {err}",
                settings.python.display()
            );
            Interpreter::artificial(
                MarkerEnvironment::from_host(&python_version),
                settings.python.clone(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use untangle_client::FixtureRecorder;
    use untangle_resolver::LockDocument;

    use super::write_lock;

    fn empty_lock() -> LockDocument {
        LockDocument {
            sources: BTreeMap::new(),
            targets: BTreeMap::from([("default".to_string(), BTreeMap::new())]),
        }
    }

    #[test]
    fn lock_to_stdout() {
        let mut stdout = Vec::new();
        write_lock(&empty_lock(), None, &mut stdout).unwrap();
        insta::assert_snapshot!(String::from_utf8(stdout).unwrap(), @r#"
        {
          "sources": {},
          "targets": {
            "default": {}
          }
        }
        "#);
    }

    #[test]
    fn lock_to_fixture_only() {
        let fixtures = tempfile::tempdir().unwrap();
        let recorder =
            FixtureRecorder::start(fixtures.path(), "empty", &["requests".to_string()]).unwrap();
        let mut stdout = Vec::new();
        write_lock(&empty_lock(), Some(&recorder), &mut stdout).unwrap();
        assert!(stdout.is_empty());
        assert!(fixtures.path().join("empty").join("lock.json").is_file());
    }
}
