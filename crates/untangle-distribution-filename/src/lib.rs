//! Parse distribution filenames: built archives (`.whl`) and source archives (`.tar.gz`).
//!
//! The archive type is decided by the suffix alone. Anything else is an
//! [`DistFilenameError::UnsupportedFileType`], which callers skip rather than fail on.
use std::fmt::{Display, Formatter};

use thiserror::Error;

use untangle_normalize::{InvalidNameError, PackageName};
use untangle_pep440::{Version, VersionParseError};

pub use source_dist::SourceDistFilename;
pub use wheel::{BuildTag, WheelFilename, WheelTag};

mod source_dist;
mod wheel;

/// The kind of archive, for display in logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistKind {
    Wheel,
    SourceDist,
}

impl Display for DistKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wheel => f.write_str("wheel"),
            Self::SourceDist => f.write_str("sdist"),
        }
    }
}

/// A parsed distribution filename, either a wheel or a source distribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DistFilename {
    SourceDistFilename(SourceDistFilename),
    WheelFilename(WheelFilename),
}

impl DistFilename {
    /// Parse a filename as listed by the index, such as `PySocks-1.7.1-py27-none-any.whl` or
    /// `charset-normalizer-3.2.0.tar.gz`.
    pub fn try_from_filename(filename: &str) -> Result<Self, DistFilenameError> {
        if filename.ends_with(".whl") {
            WheelFilename::parse(filename).map(Self::WheelFilename)
        } else if filename.ends_with(".tar.gz") {
            SourceDistFilename::parse(filename).map(Self::SourceDistFilename)
        } else {
            Err(DistFilenameError::UnsupportedFileType(filename.to_string()))
        }
    }

    pub fn name(&self) -> &PackageName {
        match self {
            Self::SourceDistFilename(filename) => &filename.name,
            Self::WheelFilename(filename) => &filename.name,
        }
    }

    pub fn version(&self) -> &Version {
        match self {
            Self::SourceDistFilename(filename) => &filename.version,
            Self::WheelFilename(filename) => &filename.version,
        }
    }

    /// The filename as it was given.
    pub fn filename(&self) -> &str {
        match self {
            Self::SourceDistFilename(filename) => filename.filename(),
            Self::WheelFilename(filename) => filename.filename(),
        }
    }

    pub fn kind(&self) -> DistKind {
        match self {
            Self::SourceDistFilename(_) => DistKind::SourceDist,
            Self::WheelFilename(_) => DistKind::Wheel,
        }
    }

    pub fn is_wheel(&self) -> bool {
        matches!(self, Self::WheelFilename(_))
    }
}

impl Display for DistFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.filename())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DistFilenameError {
    #[error("Unsupported package file: `{0}`")]
    UnsupportedFileType(String),
    #[error("Invalid wheel filename `{0}`: {1}")]
    InvalidWheelFilename(String, String),
    #[error("Invalid source distribution filename `{0}`: {1}")]
    InvalidSourceDistFilename(String, String),
    #[error("Invalid version in `{0}`")]
    InvalidVersion(String, #[source] VersionParseError),
    #[error("Invalid package name in `{0}`")]
    InvalidName(String, #[source] InvalidNameError),
}

impl DistFilenameError {
    /// The file can be skipped with a log message: a broken or unsupported index entry must
    /// not fail the resolution.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFileType(_) | Self::InvalidVersion(..) | Self::InvalidName(..)
        )
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use insta::assert_snapshot;
    use test_case::test_case;

    use untangle_normalize::PackageName;
    use untangle_pep440::Version;

    use super::{DistFilename, DistFilenameError, DistKind};

    #[test_case("PySocks-1.7.1-py27-none-any.whl", "pysocks", "1.7.1", DistKind::Wheel)]
    #[test_case("requests-2.31.0-py3-none-any.whl", "requests", "2.31.0", DistKind::Wheel)]
    #[test_case("charset-normalizer-3.2.0.tar.gz", "charset-normalizer", "3.2.0", DistKind::SourceDist)]
    #[test_case("PySocks-1.7.1.tar.gz", "pysocks", "1.7.1", DistKind::SourceDist)]
    #[test_case("zope.interface-6.0.tar.gz", "zope-interface", "6.0", DistKind::SourceDist)]
    fn parse(filename: &str, name: &str, version: &str, kind: DistKind) {
        let dist = DistFilename::try_from_filename(filename).unwrap();
        assert_eq!(dist.name(), &PackageName::from_str(name).unwrap());
        assert_eq!(dist.version(), &Version::from_str(version).unwrap());
        assert_eq!(dist.kind(), kind);
        assert_eq!(dist.filename(), filename);
    }

    #[test_case("")]
    #[test_case("requests-2.31.0.zip")]
    #[test_case("requests-2.31.0.tar.bz2")]
    #[test_case("requests-2.31.0-py3-none-any.egg")]
    fn unsupported(filename: &str) {
        let err = DistFilename::try_from_filename(filename).unwrap_err();
        assert!(matches!(err, DistFilenameError::UnsupportedFileType(_)));
        assert!(err.is_skippable());
    }

    #[test]
    fn broken_wheel() {
        let err = DistFilename::try_from_filename("broken.whl").unwrap_err();
        assert!(matches!(err, DistFilenameError::InvalidWheelFilename(..)));
        assert!(!err.is_skippable());
        assert_snapshot!(err, @"Invalid wheel filename `broken.whl`: Expected 5 or 6 `-`-separated parts, found 1");
    }

    #[test]
    fn reupload_version() {
        let err = DistFilename::try_from_filename("html5lib-1.0-reupload.tar.gz").unwrap_err();
        assert!(matches!(err, DistFilenameError::InvalidVersion(..)));
        assert!(err.is_skippable());
        assert_snapshot!(err, @"Invalid version in `html5lib-1.0-reupload.tar.gz`");
    }

    #[test_case("PySocks-1.7.1-py27-none-any.whl", "PySocks-1.7.1.dist-info/METADATA")]
    #[test_case("charset_normalizer-3.2.0-py3-none-any.whl", "charset_normalizer-3.2.0.dist-info/METADATA")]
    fn wheel_metadata_path(filename: &str, expected: &str) {
        let DistFilename::WheelFilename(wheel) = DistFilename::try_from_filename(filename).unwrap()
        else {
            panic!("{filename} is a wheel");
        };
        assert_eq!(wheel.metadata_path(), expected);
    }
}
