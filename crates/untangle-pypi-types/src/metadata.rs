//! Core metadata as found in a wheel's `METADATA`, a source distribution's `PKG-INFO`, or a
//! `.metadata` file next to a distribution on the index.
//!
//! See <https://packaging.python.org/specifications/core-metadata/>.
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use mailparse::MailParseError;
use thiserror::Error;
use tracing::warn;

use untangle_normalize::{ExtraName, InvalidNameError, PackageName};
use untangle_pep440::{Version, VersionParseError, VersionSpecifiers, VersionSpecifiersParseError};
use untangle_pep508::{Pep508Error, Requirement};

use crate::{LenientRequirement, LenientVersionSpecifiers};

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error(transparent)]
    MailParse(#[from] MailParseError),
    #[error("Metadata field `{0}` not found")]
    FieldNotFound(&'static str),
    #[error(transparent)]
    InvalidName(#[from] InvalidNameError),
    #[error("Invalid version in metadata: {0}")]
    InvalidVersion(#[source] VersionParseError),
    #[error("Invalid `Requires-Python` in metadata")]
    InvalidRequiresPython(#[source] VersionSpecifiersParseError),
    #[error("Invalid `Requires-Dist` in metadata")]
    InvalidRequiresDist(#[source] Pep508Error),
}

/// The header block of a core metadata file.
///
/// Headers keep their order and may repeat, as `Requires-Dist` and `Provides-Extra` do. Header
/// names are matched case-insensitively. The placeholder value `UNKNOWN`, written by old
/// setuptools versions for missing fields, is treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    headers: Vec<(String, String)>,
}

impl Metadata {
    /// Parse the headers, ignoring the description in the body if there is one.
    pub fn parse(content: &[u8]) -> Result<Self, MetadataError> {
        let (headers, _) = mailparse::parse_headers(content)?;
        let headers = headers
            .iter()
            .map(|header| (header.get_key(), header.get_value()))
            .collect();
        Ok(Self { headers })
    }

    /// Whether there are no headers at all, as for an empty or non-metadata response.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.get_all(name).next()
    }

    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .filter(|value| *value != "UNKNOWN")
    }

    pub fn metadata_version(&self) -> Option<&str> {
        self.get_first("Metadata-Version")
    }

    pub fn name(&self) -> Result<PackageName, MetadataError> {
        let name = self
            .get_first("Name")
            .ok_or(MetadataError::FieldNotFound("Name"))?;
        Ok(PackageName::new(name)?)
    }

    pub fn version(&self) -> Result<Version, MetadataError> {
        let version = self
            .get_first("Version")
            .ok_or(MetadataError::FieldNotFound("Version"))?;
        Version::from_str(version).map_err(MetadataError::InvalidVersion)
    }

    /// Every `Requires-Dist` entry, in order.
    pub fn requires_dist(&self) -> Result<Vec<Requirement>, MetadataError> {
        self.get_all("Requires-Dist")
            .map(|requires_dist| {
                LenientRequirement::from_str(requires_dist)
                    .map(Requirement::from)
                    .map_err(MetadataError::InvalidRequiresDist)
            })
            .collect()
    }

    pub fn requires_python(&self) -> Result<Option<VersionSpecifiers>, MetadataError> {
        self.get_first("Requires-Python")
            .map(|requires_python| {
                LenientVersionSpecifiers::from_str(requires_python)
                    .map(VersionSpecifiers::from)
                    .map_err(MetadataError::InvalidRequiresPython)
            })
            .transpose()
    }

    /// The declared extras. Invalid names are skipped.
    pub fn provides_extras(&self) -> Vec<ExtraName> {
        self.get_all("Provides-Extra")
            .filter_map(|provides_extra| match ExtraName::new(provides_extra) {
                Ok(extra_name) => Some(extra_name),
                Err(err) => {
                    warn!("Ignoring invalid extra: {err}");
                    None
                }
            })
            .collect()
    }
}

/// Writes the headers back as a header block, one `Name: value` line each.
impl Display for Metadata {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (name, value) in &self.headers {
            // Continuation lines keep multi-line values (such as `License`) in the header block.
            writeln!(f, "{name}: {}", value.replace('\n', "\n        "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use indoc::indoc;
    use insta::assert_snapshot;

    use untangle_normalize::{ExtraName, PackageName};
    use untangle_pep440::Version;

    use super::{Metadata, MetadataError};

    const REQUESTS: &str = indoc! {r#"
        Metadata-Version: 2.1
        Name: requests
        Version: 2.31.0
        Summary: Python HTTP for Humans.
        Home-page: UNKNOWN
        Requires-Python: >=3.7
        License: Apache 2.0
        Requires-Dist: charset-normalizer (<4,>=2)
        Requires-Dist: idna (<4,>=2.5)
        Requires-Dist: urllib3 (<3,>=1.21.1)
        Requires-Dist: certifi (>=2017.4.17)
        Provides-Extra: security
        Provides-Extra: socks
        Requires-Dist: PySocks (!=1.5.7,>=1.5.6) ; extra == 'socks'
        Provides-Extra: use_chardet_on_py3
        Requires-Dist: chardet (<6,>=3.0.2) ; extra == 'use_chardet_on_py3'

        Requests is an elegant and simple HTTP library for Python, built for human beings.
    "#};

    #[test]
    fn requests() {
        let metadata = Metadata::parse(REQUESTS.as_bytes()).unwrap();
        assert_eq!(metadata.metadata_version(), Some("2.1"));
        assert_eq!(metadata.name().unwrap(), PackageName::from_str("requests").unwrap());
        assert_eq!(metadata.version().unwrap(), Version::new([2, 31, 0]));
        assert_eq!(metadata.get_first("home-page"), None);
        assert_eq!(
            metadata.requires_python().unwrap().unwrap().to_string(),
            ">=3.7"
        );

        let requires_dist = metadata
            .requires_dist()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        assert_eq!(
            requires_dist,
            [
                "charset-normalizer<4, >=2",
                "idna<4, >=2.5",
                "urllib3<3, >=1.21.1",
                "certifi>=2017.4.17",
                "pysocks!=1.5.7, >=1.5.6 ; extra == 'socks'",
                "chardet<6, >=3.0.2 ; extra == 'use_chardet_on_py3'",
            ]
        );
        assert_eq!(
            metadata.provides_extras(),
            ["security", "socks", "use-chardet-on-py3"]
                .iter()
                .map(|extra| ExtraName::from_str(extra).unwrap())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn missing_fields() {
        let metadata = Metadata::parse(b"Metadata-Version: 1.0").unwrap();
        assert!(matches!(
            metadata.name(),
            Err(MetadataError::FieldNotFound("Name"))
        ));
        let metadata = Metadata::parse(b"Metadata-Version: 1.0\nName: asdf").unwrap();
        assert!(matches!(
            metadata.version(),
            Err(MetadataError::FieldNotFound("Version"))
        ));
        assert!(metadata.requires_dist().unwrap().is_empty());
        assert_eq!(metadata.requires_python().unwrap(), None);
    }

    #[test]
    fn unknown_is_absent() {
        let metadata =
            Metadata::parse(b"Name: foo\nVersion: UNKNOWN\nRequires-Python: UNKNOWN").unwrap();
        assert!(matches!(
            metadata.version(),
            Err(MetadataError::FieldNotFound("Version"))
        ));
        assert_eq!(metadata.requires_python().unwrap(), None);
    }

    #[test]
    fn empty() {
        assert!(Metadata::parse(b"").unwrap().is_empty());
    }

    #[test]
    fn invalid_requirement() {
        let metadata = Metadata::parse(b"Name: foo\nRequires-Dist: bar >= three").unwrap();
        let err = metadata.requires_dist().unwrap_err();
        assert_snapshot!(err, @"Invalid `Requires-Dist` in metadata");
    }

    #[test]
    fn header_block() {
        let metadata = Metadata::parse(REQUESTS.as_bytes()).unwrap();
        let reparsed = Metadata::parse(metadata.to_string().as_bytes()).unwrap();
        assert_eq!(metadata, reparsed);
    }
}
