use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use tracing::debug;

pub use crate::env_vars::EnvVars;
pub use crate::settings::{Combine, Options};

use crate::settings::PyProjectToml;

mod env_vars;
mod settings;

/// The [`Options`] as loaded from a configuration file on disk.
#[derive(Debug, Clone)]
pub struct FilesystemOptions(Options);

impl FilesystemOptions {
    /// Convert the [`FilesystemOptions`] into [`Options`].
    pub fn into_options(self) -> Options {
        self.0
    }

    /// Load the [`FilesystemOptions`] of a directory, preferring an `untangle.toml` file over a
    /// `[tool.untangle]` section in `pyproject.toml`.
    pub fn from_directory(dir: &Path) -> Result<Option<Self>, Error> {
        let path = dir.join("untangle.toml");
        match fs_err::read_to_string(&path) {
            Ok(content) => {
                let options = toml::from_str::<Options>(&content)
                    .map_err(|err| Error::UntangleToml(path.clone(), Box::new(err)))?
                    .relative_to(&std::path::absolute(dir)?);
                debug!("Found configuration at `{}`", path.display());
                return Ok(Some(Self(options)));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let path = dir.join("pyproject.toml");
        match fs_err::read_to_string(&path) {
            Ok(content) => {
                let pyproject: PyProjectToml = toml::from_str(&content)
                    .map_err(|err| Error::PyprojectToml(path.clone(), Box::new(err)))?;
                let Some(options) = pyproject.tool.and_then(|tool| tool.untangle) else {
                    debug!(
                        "Skipping `pyproject.toml` in `{}` (no `[tool.untangle]` section)",
                        dir.display()
                    );
                    return Ok(None);
                };
                debug!("Found configuration at `{}`", path.display());
                Ok(Some(Self(options.relative_to(&std::path::absolute(dir)?))))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Load a [`FilesystemOptions`] from a file given on the command line, which has the format
    /// of `untangle.toml`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        debug!("Reading configuration from `{}`", path.display());
        let content = fs_err::read_to_string(path)?;
        let options = toml::from_str::<Options>(&content)
            .map_err(|err| Error::UntangleToml(path.to_path_buf(), Box::new(err)))?;
        let options = if let Some(parent) = std::path::absolute(path)?.parent() {
            options.relative_to(parent)
        } else {
            options
        };
        Ok(Self(options))
    }
}

impl Deref for FilesystemOptions {
    type Target = Options;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Options> for FilesystemOptions {
    fn from(options: Options) -> Self {
        Self(options)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Failed to parse: `{}`", _0.display())]
    PyprojectToml(PathBuf, #[source] Box<toml::de::Error>),

    #[error("Failed to parse: `{}`", _0.display())]
    UntangleToml(PathBuf, #[source] Box<toml::de::Error>),
}
