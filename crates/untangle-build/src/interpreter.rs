use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::{debug, info_span};

use untangle_pep440::Version;
use untangle_pep508::MarkerEnvironment;

use crate::Error;

/// A Python executable and its marker environment.
#[derive(Debug, Clone)]
pub struct Interpreter {
    markers: MarkerEnvironment,
    sys_executable: PathBuf,
}

#[derive(Debug, Deserialize)]
struct InterpreterQueryResult {
    markers: MarkerEnvironment,
    sys_executable: PathBuf,
}

impl Interpreter {
    /// Run the executable to find out its marker environment.
    pub fn query(executable: &Path) -> Result<Self, Error> {
        debug!("Detecting markers for: {}", executable.display());
        let output = info_span!("query_interpreter", executable = %executable.display())
            .in_scope(|| {
                Command::new(executable)
                    .args(["-c", include_str!("get_markers.py")])
                    .output()
            })
            .map_err(|err| Error::CommandFailed(executable.to_path_buf(), err))?;

        if !output.status.success() {
            return Err(Error::PythonSubcommandOutput {
                message: format!(
                    "Querying Python at `{}` failed with {}",
                    executable.display(),
                    output.status
                ),
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let result = Self::parse(&output.stdout).map_err(|err| Error::PythonSubcommandOutput {
            message: format!(
                "Querying Python at `{}` did not return the expected data: {err}",
                executable.display()
            ),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })?;
        debug!(
            "Found Python {} at {}",
            result.version(),
            result.sys_executable.display()
        );
        Ok(result)
    }

    fn parse(stdout: &[u8]) -> Result<Self, serde_json::Error> {
        let InterpreterQueryResult {
            markers,
            sys_executable,
        } = serde_json::from_slice(stdout)?;
        Ok(Self {
            markers,
            sys_executable,
        })
    }

    /// An interpreter that was not queried, e.g. for a target Python version that isn't
    /// installed.
    pub fn artificial(markers: MarkerEnvironment, sys_executable: PathBuf) -> Self {
        Self {
            markers,
            sys_executable,
        }
    }

    pub fn markers(&self) -> &MarkerEnvironment {
        &self.markers
    }

    /// The full Python version, e.g. `3.12.1`.
    pub fn version(&self) -> &Version {
        &self.markers.python_full_version.version
    }

    pub fn sys_executable(&self) -> &Path {
        &self.sys_executable
    }
}
