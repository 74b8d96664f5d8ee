use std::fmt::{Display, Formatter};
use std::str::FromStr;

use untangle_normalize::PackageName;
use untangle_pep440::Version;

use crate::DistFilenameError;

/// The optional build tag of a wheel, such as `1` in `foo-1.0-1-py3-none-any.whl`.
///
/// > Must start with a digit. Acts as a tie-breaker if two wheel file names are the same in all
/// > other respects (i.e. name, version, and other tags).
///
/// Sorts by the leading number, then by the remainder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuildTag(u64, Option<String>);

impl BuildTag {
    fn parse(tag: &str) -> Option<Self> {
        let split = tag.find(|c: char| !c.is_ascii_digit()).unwrap_or(tag.len());
        if split == 0 {
            return None;
        }
        let (prefix, suffix) = tag.split_at(split);
        let number = prefix.parse::<u64>().ok()?;
        Some(Self(number, (!suffix.is_empty()).then(|| suffix.to_string())))
    }
}

impl Display for BuildTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.0, self.1.as_deref().unwrap_or_default())
    }
}

/// One `{python}-{abi}-{platform}` compatibility tag.
///
/// Compressed tag sets such as `py2.py3-none-any` expand to one tag per combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WheelTag {
    pub python: String,
    pub abi: String,
    pub platform: String,
}

impl Display for WheelTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.python, self.abi, self.platform)
    }
}

/// A wheel filename, `{name}-{version}(-{build tag})?-{python tag}-{abi tag}-{platform tag}.whl`.
///
/// See: <https://packaging.python.org/en/latest/specifications/binary-distribution-format/#file-name-convention>
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WheelFilename {
    pub name: PackageName,
    pub version: Version,
    pub build_tag: Option<BuildTag>,
    pub tags: Vec<WheelTag>,
    filename: String,
}

impl WheelFilename {
    pub(crate) fn parse(filename: &str) -> Result<Self, DistFilenameError> {
        let invalid = |reason: String| {
            DistFilenameError::InvalidWheelFilename(filename.to_string(), reason)
        };

        let stem = filename
            .strip_suffix(".whl")
            .ok_or_else(|| invalid("Must end with .whl".to_string()))?;

        let parts = stem.split('-').collect::<Vec<_>>();
        let (name, version, build_tag, python, abi, platform) = match parts.as_slice() {
            [name, version, python, abi, platform] => {
                (*name, *version, None, *python, *abi, *platform)
            }
            [name, version, build_tag, python, abi, platform] => {
                (*name, *version, Some(*build_tag), *python, *abi, *platform)
            }
            _ => {
                return Err(invalid(format!(
                    "Expected 5 or 6 `-`-separated parts, found {}",
                    parts.len()
                )));
            }
        };

        if name.contains("__")
            || !name
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.'))
        {
            return Err(invalid(format!("Invalid project name `{name}`")));
        }
        let name = PackageName::from_str(name)
            .map_err(|err| DistFilenameError::InvalidName(filename.to_string(), err))?;
        let version = Version::from_str(version)
            .map_err(|err| DistFilenameError::InvalidVersion(filename.to_string(), err))?;
        let build_tag = build_tag
            .map(|tag| {
                BuildTag::parse(tag).ok_or_else(|| invalid(format!("Invalid build tag `{tag}`")))
            })
            .transpose()?;

        let mut tags = Vec::new();
        for python in python.split('.') {
            for abi in abi.split('.') {
                for platform in platform.split('.') {
                    tags.push(WheelTag {
                        python: python.to_string(),
                        abi: abi.to_string(),
                        platform: platform.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            name,
            version,
            build_tag,
            tags,
            filename: filename.to_string(),
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// `{distribution}-{version}.dist-info/METADATA`, where `{distribution}` is spelled as in
    /// the filename, since that is how the wheel's own `.dist-info` directory is spelled.
    pub fn metadata_path(&self) -> String {
        let distribution = self
            .filename
            .split_once('-')
            .map_or(self.filename.as_str(), |(distribution, _)| distribution);
        format!("{distribution}-{}.dist-info/METADATA", self.version)
    }
}

impl FromStr for WheelFilename {
    type Err = DistFilenameError;

    fn from_str(filename: &str) -> Result<Self, Self::Err> {
        Self::parse(filename)
    }
}

impl Display for WheelFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.filename)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use insta::assert_snapshot;
    use test_case::test_case;

    use super::{BuildTag, WheelFilename};

    #[test]
    fn pysocks() {
        let wheel = WheelFilename::from_str("PySocks-1.7.1-py27-none-any.whl").unwrap();
        assert_eq!(wheel.name.as_str(), "pysocks");
        assert_eq!(wheel.version.to_string(), "1.7.1");
        assert_eq!(wheel.build_tag, None);
        assert_eq!(wheel.tags.len(), 1);
        assert_eq!(wheel.tags[0].to_string(), "py27-none-any");
    }

    #[test]
    fn compressed_tags() {
        let wheel = WheelFilename::from_str("six-1.16.0-py2.py3-none-any.whl").unwrap();
        let tags = wheel
            .tags
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        assert_eq!(tags, ["py2-none-any", "py3-none-any"]);
    }

    #[test]
    fn build_tag() {
        let wheel = WheelFilename::from_str("foo-1.2.3-202206090410-py3-none-any.whl").unwrap();
        assert_eq!(wheel.build_tag, BuildTag::parse("202206090410"));
        let wheel = WheelFilename::from_str("foo-1.2.3-1abc-py3-none-any.whl").unwrap();
        assert_eq!(wheel.build_tag.unwrap().to_string(), "1abc");
        assert!(BuildTag::parse("1") < BuildTag::parse("1a"));
        assert!(BuildTag::parse("2") > BuildTag::parse("1a"));
    }

    #[test_case("foo.whl"; "one part")]
    #[test_case("foo-1.2.3.whl"; "two parts")]
    #[test_case("foo-1.2.3-py3-none.whl"; "four parts")]
    #[test_case("foo-1.2.3-a-b-py3-none-any.whl"; "seven parts")]
    fn wrong_number_of_parts(filename: &str) {
        let err = WheelFilename::from_str(filename).unwrap_err();
        assert!(err.to_string().starts_with(&format!("Invalid wheel filename `{filename}`")));
    }

    #[test]
    fn errors() {
        assert_snapshot!(
            WheelFilename::from_str("foo-1.2.3-abc-py3-none-any.whl").unwrap_err(),
            @"Invalid wheel filename `foo-1.2.3-abc-py3-none-any.whl`: Invalid build tag `abc`"
        );
        assert_snapshot!(
            WheelFilename::from_str("foo__bar-1.2.3-py3-none-any.whl").unwrap_err(),
            @"Invalid wheel filename `foo__bar-1.2.3-py3-none-any.whl`: Invalid project name `foo__bar`"
        );
        assert_snapshot!(
            WheelFilename::from_str("foo-x.y.z-py3-none-any.whl").unwrap_err(),
            @"Invalid version in `foo-x.y.z-py3-none-any.whl`"
        );
    }
}
