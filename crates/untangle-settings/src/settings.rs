use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use untangle_normalize::PackageName;
use untangle_pep440::Version;

/// A `pyproject.toml` with an (optional) `[tool.untangle]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct PyProjectToml {
    pub(crate) tool: Option<Tools>,
}

/// A `[tool]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Tools {
    pub(crate) untangle: Option<Options>,
}

/// The options of an `untangle.toml` file or a `[tool.untangle]` section.
///
/// ```toml
/// index-url = "https://pypi.org/simple"
/// python-version = "3.12"
/// legacy-metadata = ["pyyaml"]
/// max-rounds = 5000
/// timeout = 120
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Options {
    /// The Simple API root, `https://pypi.org/simple` by default.
    pub index_url: Option<Url>,
    /// The interpreter to query for environment markers and to run build backends with. A
    /// relative path with a directory is relative to the configuration file.
    pub python: Option<PathBuf>,
    /// Resolve for this Python version instead of the interpreter's.
    pub python_version: Option<Version>,
    /// Packages whose source distributions always get their metadata from the build backend.
    pub legacy_metadata: Option<Vec<PackageName>>,
    pub max_rounds: Option<usize>,
    /// Overall resolution timeout in seconds.
    pub timeout: Option<u64>,
    /// Where `--record-test-case` writes fixtures, relative to the configuration file.
    pub fixtures_dir: Option<PathBuf>,
}

impl Options {
    /// Resolve relative paths against `root`, the directory of the configuration file.
    #[must_use]
    pub fn relative_to(self, root: &Path) -> Self {
        Self {
            // A bare `python3` is looked up on the `PATH`.
            python: self.python.map(|python| {
                if python.is_relative() && python.components().count() > 1 {
                    root.join(python)
                } else {
                    python
                }
            }),
            fixtures_dir: self.fixtures_dir.map(|dir| {
                if dir.is_relative() {
                    root.join(dir)
                } else {
                    dir
                }
            }),
            ..self
        }
    }
}

/// Merge two sources of a setting, preferring `self`.
pub trait Combine {
    #[must_use]
    fn combine(self, other: Self) -> Self;
}

impl<T> Combine for Option<T> {
    fn combine(self, other: Self) -> Self {
        self.or(other)
    }
}

impl Combine for Options {
    fn combine(self, other: Self) -> Self {
        Self {
            index_url: self.index_url.combine(other.index_url),
            python: self.python.combine(other.python),
            python_version: self.python_version.combine(other.python_version),
            legacy_metadata: self.legacy_metadata.combine(other.legacy_metadata),
            max_rounds: self.max_rounds.combine(other.max_rounds),
            timeout: self.timeout.combine(other.timeout),
            fixtures_dir: self.fixtures_dir.combine(other.fixtures_dir),
        }
    }
}
