use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

use crate::version::compare_release;
use crate::{Operator, Version, VersionParseError};

/// A set of version specifiers such as `>=2.1,<3`, all of which must hold.
///
/// An empty set matches every version.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct VersionSpecifiers(Vec<VersionSpecifier>);

impl std::ops::Deref for VersionSpecifiers {
    type Target = [VersionSpecifier];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl VersionSpecifiers {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Whether all specifiers match the given version.
    pub fn contains(&self, version: &Version) -> bool {
        self.iter().all(|specifier| specifier.contains(version))
    }

    /// Whether the version matches and, if it is a pre-release, whether the set opts into
    /// pre-releases by naming one.
    ///
    /// This is the check package installers use: `2.0b1` is not admitted by `>=1`, but is by
    /// `>=2.0b1`.
    pub fn admits(&self, version: &Version) -> bool {
        if version.any_prerelease() && !self.allows_prereleases() {
            return false;
        }
        self.contains(version)
    }

    /// Whether any specifier mentions a pre-release version.
    pub fn allows_prereleases(&self) -> bool {
        self.iter()
            .any(|specifier| specifier.version.any_prerelease())
    }
}

impl FromIterator<VersionSpecifier> for VersionSpecifiers {
    fn from_iter<T: IntoIterator<Item = VersionSpecifier>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<VersionSpecifier> for VersionSpecifiers {
    fn from(specifier: VersionSpecifier) -> Self {
        Self(vec![specifier])
    }
}

impl FromStr for VersionSpecifiers {
    type Err = VersionSpecifiersParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::empty());
        }
        s.split(',')
            .map(|segment| {
                VersionSpecifier::from_str(segment).map_err(|err| VersionSpecifiersParseError {
                    line: s.to_string(),
                    segment: segment.to_string(),
                    err,
                })
            })
            .collect()
    }
}

impl Display for VersionSpecifiers {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (idx, specifier) in self.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{specifier}")?;
        }
        Ok(())
    }
}

impl Serialize for VersionSpecifiers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionSpecifiers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// A failed parse of one of the comma separated specifiers, pointing at the offending one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to parse version specifiers `{line}` at `{segment}`: {err}")]
pub struct VersionSpecifiersParseError {
    line: String,
    segment: String,
    #[source]
    err: VersionSpecifierParseError,
}

impl VersionSpecifiersParseError {
    /// The full input that failed to parse.
    pub fn line(&self) -> &str {
        &self.line
    }
}

/// A single version specifier such as `>=1.19`, `==1.1.*` or `~=1.0`.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct VersionSpecifier {
    operator: Operator,
    version: Version,
}

impl VersionSpecifier {
    /// Build from parts, checking that the operator is allowed with that version.
    ///
    /// `wildcard` marks a trailing `.*`, to differentiate between `==1.1.*` and `==1.1`.
    pub fn new(
        operator: Operator,
        version: Version,
        wildcard: bool,
    ) -> Result<Self, VersionSpecifierParseError> {
        let operator = if wildcard {
            operator
                .to_star()
                .ok_or(VersionSpecifierParseError::OperatorWithStar(operator))?
        } else {
            operator
        };

        // "Local version identifiers are NOT permitted in this version specifier."
        if version.is_local() && !operator.is_local_compatible() {
            return Err(VersionSpecifierParseError::OperatorLocalCombo { operator, version });
        }

        if operator == Operator::TildeEqual && version.release().len() < 2 {
            return Err(VersionSpecifierParseError::CompatibleRelease);
        }

        Ok(Self { operator, version })
    }

    /// `==<version>`
    pub fn equals_version(version: Version) -> Self {
        Self {
            operator: Operator::Equal,
            version,
        }
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Whether the given version satisfies this specifier.
    ///
    /// For example, `>=1.19` contains `1.21`, but `<2.0` does not contain `2.0a1`.
    ///
    /// See:
    /// - <https://peps.python.org/pep-0440/#version-specifiers>
    /// - <https://github.com/pypa/packaging/blob/e184feef1a28a5c574ec41f5c263a3a573861f5a/packaging/specifiers.py#L362-L496>
    pub fn contains(&self, version: &Version) -> bool {
        // "local version labels MUST be ignored entirely when checking if candidate versions
        // match a given version specifier", unless the specifier has one itself.
        let this = &self.version;
        let other = if this.is_local() {
            version.clone()
        } else {
            version.without_local()
        };

        match self.operator {
            Operator::Equal => other == *this,
            Operator::EqualStar => {
                this.epoch() == other.epoch() && is_release_prefix(this.release(), other.release())
            }
            Operator::ExactEqual => this.to_string() == version.to_string(),
            Operator::NotEqual => other != *this,
            Operator::NotEqualStar => {
                this.epoch() != other.epoch()
                    || !is_release_prefix(this.release(), other.release())
            }
            Operator::TildeEqual => {
                // "For a given release identifier V.N, the compatible release clause is
                // approximately equivalent to the pair of comparison clauses: `>= V.N, == V.*`"
                let prefix = &this.release()[..this.release().len() - 1];
                this.epoch() == other.epoch()
                    && is_release_prefix(prefix, other.release())
                    && other >= *this
            }
            Operator::GreaterThan => Self::greater_than(this, &other),
            Operator::GreaterThanEqual => other >= *this,
            Operator::LessThan => Self::less_than(this, &other),
            Operator::LessThanEqual => other <= *this,
        }
    }

    fn less_than(this: &Version, other: &Version) -> bool {
        if other.epoch() < this.epoch() {
            return true;
        }

        // `<3.1` must not match `3.1.dev0`, unless the specifier is a pre-release itself.
        if !this.any_prerelease()
            && other.any_prerelease()
            && compare_release(this.release(), other.release()) == Ordering::Equal
        {
            return false;
        }

        other < this
    }

    fn greater_than(this: &Version, other: &Version) -> bool {
        if other.epoch() > this.epoch() {
            return true;
        }

        if compare_release(this.release(), other.release()) == Ordering::Equal {
            // `>3.1` must not match `3.1.post0`, unless the specifier is a post-release itself.
            if !this.is_post() && other.is_post() {
                return false;
            }
            if other.is_local() {
                return false;
            }
        }

        other > this
    }
}

/// Whether `prefix` matches the start of `release`, padding `release` with zeros.
fn is_release_prefix(prefix: &[u64], release: &[u64]) -> bool {
    prefix
        .iter()
        .zip(release.iter().chain(std::iter::repeat(&0)))
        .all(|(this, other)| this == other)
}

impl FromStr for VersionSpecifier {
    type Err = VersionSpecifierParseError;

    /// Parses a specifier such as `>= 1.19`, `== 1.1.*`, `~=1.0+abc.5` or `<=1!2012.2`.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let spec = spec.trim();
        let operator_len = spec
            .find(|c: char| !matches!(c, '=' | '!' | '~' | '<' | '>'))
            .unwrap_or(spec.len());
        let (operator, version) = spec.split_at(operator_len);
        if operator.is_empty() {
            return Err(VersionSpecifierParseError::MissingOperator(spec.to_string()));
        }
        let operator =
            Operator::from_str(operator).map_err(VersionSpecifierParseError::InvalidOperator)?;
        let version = version.trim();
        if version.is_empty() {
            return Err(VersionSpecifierParseError::MissingVersion);
        }
        if let Some(position) = version.find(char::is_whitespace) {
            return Err(VersionSpecifierParseError::InvalidTrailing(
                version[position..].trim().to_string(),
            ));
        }
        let (version, wildcard) = Version::parse_pattern(version)?;
        Self::new(operator, version, wildcard)
    }
}

impl Display for VersionSpecifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if matches!(self.operator, Operator::EqualStar | Operator::NotEqualStar) {
            return write!(f, "{}{}.*", self.operator, self.version);
        }
        write!(f, "{}{}", self.operator, self.version)
    }
}

impl Serialize for VersionSpecifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An error when parsing or constructing a single [`VersionSpecifier`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionSpecifierParseError {
    #[error("Unexpected end of version specifier, expected operator in `{0}`")]
    MissingOperator(String),
    #[error("{0}")]
    InvalidOperator(String),
    #[error("Unexpected end of version specifier, expected version")]
    MissingVersion,
    #[error("Trailing `{0}` is not allowed")]
    InvalidTrailing(String),
    #[error(transparent)]
    InvalidVersion(#[from] VersionParseError),
    #[error("Operator {0} cannot be used with a wildcard version specifier")]
    OperatorWithStar(Operator),
    #[error(
        "Operator {operator} is incompatible with versions containing non-empty local segments (`{version}`)"
    )]
    OperatorLocalCombo { operator: Operator, version: Version },
    #[error("The ~= operator requires at least two segments in the release version")]
    CompatibleRelease,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use insta::assert_snapshot;
    use test_case::test_case;

    use super::*;

    #[test_case("1.19", ">=1.16, <2.0", true)]
    #[test_case("2.0", ">=1.16, <2.0", false)]
    #[test_case("1.2.3", "==1.2.*", true)]
    #[test_case("1.3", "==1.2.*", false)]
    #[test_case("1.2", "!=1.2.*", false)]
    #[test_case("2.2", "~=2.2", true)]
    #[test_case("2.9", "~=2.2", true)]
    #[test_case("3.0", "~=2.2", false)]
    #[test_case("1.4.9", "~=1.4.5", true)]
    #[test_case("1.5.0", "~=1.4.5", false)]
    #[test_case("1.0+local", "==1.0", true)]
    #[test_case("1.0+local", ">1.0", false)]
    #[test_case("3.1.post0", ">3.1", false)]
    #[test_case("3.2.post0", ">3.1", true)]
    #[test_case("3.1.dev0", "<3.1", false)]
    #[test_case("3.0.dev0", "<3.1", true)]
    #[test_case("1.5.7", "!=1.5.7, >=1.5.6", false)]
    #[test_case("1.7.1", "!=1.5.7, >=1.5.6", true)]
    #[test_case("3.12.1", ">=3.7", true)]
    #[test_case("0.1", "", true)]
    fn contains(version: &str, specifiers: &str, expected: bool) {
        let version = Version::from_str(version).unwrap();
        let specifiers = VersionSpecifiers::from_str(specifiers).unwrap();
        assert_eq!(specifiers.contains(&version), expected);
    }

    #[test]
    fn admits_prereleases_only_when_named() {
        let beta = Version::from_str("2.0b1").unwrap();
        assert!(VersionSpecifiers::from_str(">=1").unwrap().contains(&beta));
        assert!(!VersionSpecifiers::from_str(">=1").unwrap().admits(&beta));
        assert!(!VersionSpecifiers::empty().admits(&beta));
        assert!(VersionSpecifiers::from_str(">=2.0a1").unwrap().admits(&beta));
    }

    #[test]
    fn display() {
        let specifiers = VersionSpecifiers::from_str(" >=1.0 ,<2 ,!= 1.5.* ").unwrap();
        assert_snapshot!(specifiers, @">=1.0, <2, !=1.5.*");
    }

    #[test]
    fn errors() {
        assert_snapshot!(
            VersionSpecifier::from_str("1.0").unwrap_err(),
            @"Unexpected end of version specifier, expected operator in `1.0`"
        );
        assert_snapshot!(
            VersionSpecifier::from_str(">=").unwrap_err(),
            @"Unexpected end of version specifier, expected version"
        );
        assert_snapshot!(
            VersionSpecifier::from_str("~=1").unwrap_err(),
            @"The ~= operator requires at least two segments in the release version"
        );
        assert_snapshot!(
            VersionSpecifier::from_str(">=1.0.*").unwrap_err(),
            @"Operator >= cannot be used with a wildcard version specifier"
        );
        assert_snapshot!(
            VersionSpecifier::from_str("=>1.0").unwrap_err(),
            @"No such comparison operator `=>`, must be one of ~= == != <= >= < > ==="
        );
        assert_snapshot!(
            VersionSpecifiers::from_str(">=1.0, <2.0 foo").unwrap_err(),
            @"Failed to parse version specifiers `>=1.0, <2.0 foo` at ` <2.0 foo`: Trailing `foo` is not allowed"
        );
    }
}
