//! Obtain metadata from source distributions that don't ship it.
//!
//! The source distribution is unpacked into a temporary directory and the build backend it
//! declares is asked for the metadata through the PEP 517 hooks, using an existing Python
//! interpreter. Build requirements are not installed; the backend must be importable.
//!
//! <https://peps.python.org/pep-0517/>

use std::io;
use std::path::PathBuf;
use std::process::Output;

use thiserror::Error;

pub use crate::interpreter::Interpreter;
pub use crate::pyproject::{BuildSystem, build_requirements_from_sdist};
pub use crate::source_build::SourceBuild;
pub use crate::source_tree::SourceTree;

mod interpreter;
mod pyproject;
mod source_build;
mod source_tree;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Failed to read the built wheel")]
    Zip(#[from] zip::result::ZipError),
    #[error("Invalid source distribution: {0}")]
    InvalidSourceDist(String),
    #[error("Invalid pyproject.toml")]
    InvalidPyprojectToml(#[from] toml::de::Error),
    #[error("Failed to run `{}`", _0.display())]
    CommandFailed(PathBuf, #[source] io::Error),
    #[error("{message}:\n--- stdout:\n{stdout}\n--- stderr:\n{stderr}\n---")]
    BuildBackend {
        message: String,
        stdout: String,
        stderr: String,
    },
    #[error("{message}:\n--- stdout:\n{stdout}\n--- stderr:\n{stderr}\n---")]
    PythonSubcommandOutput {
        message: String,
        stdout: String,
        stderr: String,
    },
}

impl Error {
    pub(crate) fn from_command_output(message: String, output: &Output) -> Self {
        Self::BuildBackend {
            message,
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}
