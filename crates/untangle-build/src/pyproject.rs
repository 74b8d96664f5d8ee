use std::ffi::OsStr;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Error;

/// The backend used when a source distribution doesn't name one.
const LEGACY_BACKEND: &str = "setuptools.build_meta:__legacy__";

/// The parts of a `pyproject.toml` we look at.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
struct PyProjectToml {
    build_system: Option<BuildSystemTable>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
struct BuildSystemTable {
    #[serde(default)]
    requires: Vec<String>,
    build_backend: Option<String>,
    backend_path: Option<Vec<String>>,
}

/// The `[build-system]` of a source distribution, with the legacy setuptools backend filled in
/// when none is declared.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct BuildSystem {
    /// The requirements as written, e.g. `setuptools>=61`.
    pub requires: Vec<String>,
    /// The backend import string, e.g. `setuptools.build_meta:__legacy__` or `flit_core.buildapi`.
    pub build_backend: String,
    /// <https://peps.python.org/pep-0517/#in-tree-build-backends>
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_path: Option<Vec<String>>,
}

impl BuildSystem {
    /// What a source distribution without a declared build backend gets built with.
    pub fn legacy() -> Self {
        Self {
            requires: vec!["setuptools".to_string()],
            build_backend: LEGACY_BACKEND.to_string(),
            backend_path: None,
        }
    }

    /// Read the build system from the contents of a `pyproject.toml`.
    ///
    /// The declared `requires` are only kept when `build-backend` is set too; otherwise the
    /// whole table is replaced by [`BuildSystem::legacy`].
    pub fn from_pyproject_toml(content: &str) -> Result<Self, Error> {
        let pyproject_toml: PyProjectToml = toml::from_str(content)?;
        let Some(table) = pyproject_toml.build_system else {
            return Ok(Self::legacy());
        };
        match table.build_backend {
            Some(build_backend) if !build_backend.is_empty() => Ok(Self {
                requires: table.requires,
                build_backend,
                backend_path: table.backend_path,
            }),
            _ => Ok(Self::legacy()),
        }
    }

    /// Read the build system of an unpacked source tree.
    pub fn from_source_tree(root: &Path) -> Result<Self, Error> {
        let path = root.join("pyproject.toml");
        if !path.is_file() {
            debug!("No pyproject.toml in {}", root.display());
            return Ok(Self::legacy());
        }
        Self::from_pyproject_toml(&fs_err::read_to_string(path)?)
    }
}

/// Read the declared build system of a `.tar.gz` source distribution without unpacking it.
///
/// The `pyproject.toml` is looked up in the top-level directory named after the archive, with
/// the casing of the filename (`PySocks-1.7.1.tar.gz` is read from `PySocks-1.7.1/`).
pub fn build_requirements_from_sdist(sdist: &Path) -> Result<BuildSystem, Error> {
    let filename = sdist
        .file_name()
        .and_then(OsStr::to_str)
        .ok_or_else(|| Error::InvalidSourceDist(format!("Not a file: {}", sdist.display())))?;
    let Some(directory) = filename.strip_suffix(".tar.gz") else {
        return Err(Error::InvalidSourceDist(format!(
            "Expected a `.tar.gz` archive, found `{filename}`"
        )));
    };
    let wanted = format!("{directory}/pyproject.toml");

    let mut archive = tar::Archive::new(GzDecoder::new(fs_err::File::open(sdist)?));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let is_pyproject_toml = entry.path()? == Path::new(&wanted);
        if is_pyproject_toml {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            return BuildSystem::from_pyproject_toml(&content);
        }
    }

    debug!("No `{wanted}` in {filename}");
    Ok(BuildSystem::legacy())
}
