use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use untangle_normalize::PackageName;
use untangle_pep440::Version;

use crate::DistFilenameError;

/// Splits `{name}-{version}` at the last `-` followed by a digit and, later, a dot.
///
/// This is a heuristic: a name with a segment like `-2.` (`foo-2.0-bar-1.0`) splits in the wrong
/// place. Normalized source distribution names never contain a `-`, but the index also lists
/// older files with arbitrary spelling.
static PACKAGE_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>.*)-(?P<version>\d+\..*)$").expect("package/version regex is valid")
});

/// A source distribution filename, `{name}-{version}.tar.gz`.
///
/// Only gzip compressed tarballs are supported.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceDistFilename {
    pub name: PackageName,
    pub version: Version,
    filename: String,
}

impl SourceDistFilename {
    pub(crate) fn parse(filename: &str) -> Result<Self, DistFilenameError> {
        let Some(stem) = filename.strip_suffix(".tar.gz") else {
            return Err(DistFilenameError::InvalidSourceDistFilename(
                filename.to_string(),
                "Must end with .tar.gz".to_string(),
            ));
        };
        let Some(captures) = PACKAGE_VERSION_RE.captures(stem) else {
            return Err(DistFilenameError::InvalidSourceDistFilename(
                filename.to_string(),
                "Expected `{name}-{version}`".to_string(),
            ));
        };
        let name = PackageName::from_str(&captures["name"])
            .map_err(|err| DistFilenameError::InvalidName(filename.to_string(), err))?;
        let version = Version::from_str(&captures["version"])
            .map_err(|err| DistFilenameError::InvalidVersion(filename.to_string(), err))?;
        Ok(Self {
            name,
            version,
            filename: filename.to_string(),
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The filename without `.tar.gz`, conventionally the archive's top-level directory.
    pub fn stem(&self) -> &str {
        self.filename
            .strip_suffix(".tar.gz")
            .unwrap_or(&self.filename)
    }

    /// `{name}-{version}/PKG-INFO` with the normalized name, then `{stem}/PKG-INFO` if the
    /// archive's own spelling differs. Most source distributions use the latter.
    pub fn metadata_paths(&self) -> Vec<String> {
        let normalized = format!("{}-{}/PKG-INFO", self.name, self.version);
        let stem = format!("{}/PKG-INFO", self.stem());
        if normalized == stem {
            vec![normalized]
        } else {
            vec![normalized, stem]
        }
    }
}

impl FromStr for SourceDistFilename {
    type Err = DistFilenameError;

    fn from_str(filename: &str) -> Result<Self, Self::Err> {
        Self::parse(filename)
    }
}

impl Display for SourceDistFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.filename)
    }
}
