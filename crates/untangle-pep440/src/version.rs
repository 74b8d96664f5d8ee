use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::iter;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

/// The regex from <https://peps.python.org/pep-0440/#appendix-b-parsing-version-strings-with-regular-expressions>,
/// extended with a trailing `.*` for wildcard specifiers.
const VERSION_RE_INNER: &str = r"
v?
(?:(?P<epoch>[0-9]+)!)?
(?P<release>[0-9]+(?:\.[0-9]+)*)
(?P<pre_field>
    [-_\.]?
    (?P<pre_name>alpha|a|beta|b|preview|pre|c|rc)
    [-_\.]?
    (?P<pre>[0-9]+)?
)?
(?P<post_field>
    (?:-(?P<post_old>[0-9]+))
    |
    (?:
        [-_\.]?
        (?P<post_l>post|rev|r)
        [-_\.]?
        (?P<post_new>[0-9]+)?
    )
)?
(?P<dev_field>
    [-_\.]?
    dev
    [-_\.]?
    (?P<dev>[0-9]+)?
)?
(?:\+(?P<local>[a-z0-9]+(?:[-_\.][a-z0-9]+)*))?
(?P<wildcard>\.\*)?
";

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?xi)^\s*{VERSION_RE_INNER}\s*$")).expect("version regex is valid")
});

/// One of `~=` `==` `!=` `<=` `>=` `<` `>` `===`, with `==` and `!=` split into exact and
/// wildcard (`== 1.2.*`) flavours.
#[derive(Eq, PartialEq, Debug, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum Operator {
    /// `== 1.2.3`
    Equal,
    /// `== 1.2.*`
    EqualStar,
    /// `=== 1.2.3`, compared as strings.
    ExactEqual,
    /// `!= 1.2.3`
    NotEqual,
    /// `!= 1.2.*`
    NotEqualStar,
    /// `~= 1.2`
    TildeEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEqual,
}

impl Operator {
    /// The wildcard flavour of this operator, if it has one.
    pub(crate) fn to_star(self) -> Option<Self> {
        match self {
            Self::Equal => Some(Self::EqualStar),
            Self::NotEqual => Some(Self::NotEqualStar),
            _ => None,
        }
    }

    /// Whether this operator may be combined with a version carrying a local segment.
    pub(crate) fn is_local_compatible(self) -> bool {
        matches!(self, Self::Equal | Self::NotEqual | Self::ExactEqual)
    }
}

impl FromStr for Operator {
    type Err = String;

    /// Parses the textual operator. Wildcards are resolved later, once the version is known.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let operator = match s {
            "==" => Self::Equal,
            "===" => {
                tracing::warn!("Using arbitrary equality (`===`) is discouraged");
                Self::ExactEqual
            }
            "!=" => Self::NotEqual,
            "~=" => Self::TildeEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessThanEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterThanEqual,
            other => {
                return Err(format!(
                    "No such comparison operator `{other}`, must be one of ~= == != <= >= < > ==="
                ));
            }
        };
        Ok(operator)
    }
}

impl Display for Operator {
    /// Note that wildcard operators print without their `.*`, which belongs to the version.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let operator = match self {
            Self::Equal | Self::EqualStar => "==",
            Self::ExactEqual => "===",
            Self::NotEqual | Self::NotEqualStar => "!=",
            Self::TildeEqual => "~=",
            Self::LessThan => "<",
            Self::LessThanEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanEqual => ">=",
        };
        f.write_str(operator)
    }
}

/// Pre-release kind (alpha, beta or release candidate).
///
/// <https://peps.python.org/pep-0440/#pre-releases>
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy, Ord, PartialOrd)]
pub enum PreRelease {
    Alpha,
    Beta,
    Rc,
}

impl PreRelease {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "a" | "alpha" => Some(Self::Alpha),
            "b" | "beta" => Some(Self::Beta),
            "c" | "rc" | "pre" | "preview" => Some(Self::Rc),
            _ => None,
        }
    }
}

impl Display for PreRelease {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alpha => f.write_str("a"),
            Self::Beta => f.write_str("b"),
            Self::Rc => f.write_str("rc"),
        }
    }
}

/// A segment of a [local version identifier](https://peps.python.org/pep-0440/#local-version-identifiers).
///
/// Numeric segments compare as integers and always above string segments; string segments
/// compare case-insensitively. With that, the derived `Ord` of `Vec<LocalSegment>` matches
/// PEP 440, including "more segments sort higher when the prefix matches".
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum LocalSegment {
    String(String),
    Number(u64),
}

impl Display for LocalSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(string) => f.write_str(string),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

impl PartialOrd for LocalSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocalSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(n1), Self::Number(n2)) => n1.cmp(n2),
            (Self::String(s1), Self::String(s2)) => s1.cmp(s2),
            (Self::Number(_), Self::String(_)) => Ordering::Greater,
            (Self::String(_), Self::Number(_)) => Ordering::Less,
        }
    }
}

/// An error when parsing a [`Version`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    #[error("Version `{0}` doesn't match PEP 440 rules")]
    Invalid(String),
    #[error("Version `{0}` must not end with a wildcard (`.*`)")]
    UnexpectedWildcard(String),
    #[error("Version `{0}` combines a wildcard (`.*`) with a pre-, post-, dev- or local segment")]
    WildcardSuffix(String),
    #[error("Segment `{segment}` of version `{version}` is too large")]
    Overflow { version: String, segment: String },
}

/// A version number such as `1.2.3` or `4!5.6.7-a8.post9.dev0`.
///
/// `Ord` and `Eq` implement PEP 440 sorting: release segments are zero padded, so `1.0 == 1.0.0`.
/// Matching against a specifier has its own rules, see [`crate::VersionSpecifier::contains`].
#[derive(Debug, Clone)]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PreRelease, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Vec<LocalSegment>,
}

impl Version {
    /// A final release such as `3.8`.
    pub fn new(release: impl IntoIterator<Item = u64>) -> Self {
        Self {
            epoch: 0,
            release: release.into_iter().collect(),
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    #[must_use]
    pub fn with_pre(mut self, pre: Option<(PreRelease, u64)>) -> Self {
        self.pre = pre;
        self
    }

    #[must_use]
    pub fn with_post(mut self, post: Option<u64>) -> Self {
        self.post = post;
        self
    }

    #[must_use]
    pub fn with_dev(mut self, dev: Option<u64>) -> Self {
        self.dev = dev;
        self
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn release(&self) -> &[u64] {
        &self.release
    }

    pub fn pre(&self) -> Option<(PreRelease, u64)> {
        self.pre
    }

    pub fn post(&self) -> Option<u64> {
        self.post
    }

    pub fn dev(&self) -> Option<u64> {
        self.dev
    }

    pub fn local(&self) -> &[LocalSegment] {
        &self.local
    }

    /// Whether this is an alpha/beta/rc or dev version.
    pub fn any_prerelease(&self) -> bool {
        self.is_pre() || self.is_dev()
    }

    pub fn is_pre(&self) -> bool {
        self.pre.is_some()
    }

    pub fn is_dev(&self) -> bool {
        self.dev.is_some()
    }

    pub fn is_post(&self) -> bool {
        self.post.is_some()
    }

    pub fn is_local(&self) -> bool {
        !self.local.is_empty()
    }

    /// Local version labels are ignored when matching against a specifier without one.
    #[must_use]
    pub(crate) fn without_local(&self) -> Self {
        Self {
            local: Vec::new(),
            ..self.clone()
        }
    }

    /// Parse a version that may end in `.*`, returning whether it did.
    ///
    /// * `1.2.3` -> `(1.2.3, false)`
    /// * `1.2.*` -> `(1.2, true)`
    /// * `1.0.dev1.*` -> error
    pub fn parse_pattern(version: &str) -> Result<(Self, bool), VersionParseError> {
        let captures = VERSION_RE
            .captures(version)
            .ok_or_else(|| VersionParseError::Invalid(version.to_string()))?;
        let parsed = Self::from_captures(version, &captures)?;
        let wildcard = captures.name("wildcard").is_some();
        if wildcard
            && (parsed.pre.is_some()
                || parsed.post.is_some()
                || parsed.dev.is_some()
                || !parsed.local.is_empty())
        {
            return Err(VersionParseError::WildcardSuffix(version.to_string()));
        }
        Ok((parsed, wildcard))
    }

    fn from_captures(version: &str, captures: &Captures) -> Result<Self, VersionParseError> {
        let number = |segment: &str| {
            segment
                .parse::<u64>()
                .map_err(|_| VersionParseError::Overflow {
                    version: version.to_string(),
                    segment: segment.to_string(),
                })
        };
        let field = |name: &str| captures.name(name).map(|m| number(m.as_str())).transpose();

        // "If no explicit epoch is given, the implicit epoch is 0"
        let epoch = field("epoch")?.unwrap_or_default();
        let release = captures
            .name("release")
            .map(|release| release.as_str().split('.').map(number).collect())
            .transpose()?
            .unwrap_or_default();
        let pre = match captures.name("pre_name") {
            Some(name) => {
                let kind = PreRelease::parse(name.as_str())
                    .ok_or_else(|| VersionParseError::Invalid(version.to_string()))?;
                // <https://peps.python.org/pep-0440/#implicit-pre-release-number>
                Some((kind, field("pre")?.unwrap_or_default()))
            }
            None => None,
        };
        let post = if captures.name("post_field").is_some() {
            Some(
                field("post_new")?
                    .or(field("post_old")?)
                    .unwrap_or_default(),
            )
        } else {
            None
        };
        let dev = if captures.name("dev_field").is_some() {
            Some(field("dev")?.unwrap_or_default())
        } else {
            None
        };
        let local = captures
            .name("local")
            .map(|local| {
                local
                    .as_str()
                    .split(['-', '_', '.'])
                    .map(|segment| match segment.parse::<u64>() {
                        Ok(number) => LocalSegment::Number(number),
                        Err(_) => LocalSegment::String(segment.to_ascii_lowercase()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    /// Parses a version such as `1.19`, `1.0a1`, `1.0+abc.5` or `1!2012.2`.
    fn from_str(version: &str) -> Result<Self, Self::Err> {
        let (parsed, wildcard) = Self::parse_pattern(version)?;
        if wildcard {
            return Err(VersionParseError::UnexpectedWildcard(version.to_string()));
        }
        Ok(parsed)
    }
}

/// Shows the normalized version.
impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let mut release = self.release.iter();
        if let Some(first) = release.next() {
            write!(f, "{first}")?;
        }
        for segment in release {
            write!(f, ".{segment}")?;
        }
        if let Some((kind, number)) = self.pre {
            write!(f, "{kind}{number}")?;
        }
        if let Some(post) = self.post {
            write!(f, ".post{post}")?;
        }
        if let Some(dev) = self.dev {
            write!(f, ".dev{dev}")?;
        }
        let mut local = self.local.iter();
        if let Some(first) = local.next() {
            write!(f, "+{first}")?;
            for segment in local {
                write!(f, ".{segment}")?;
            }
        }
        Ok(())
    }
}

/// Compare release segments, padding the shorter one with zeros: `1.1.0 == 1.1`, `1.16 < 1.19`.
pub(crate) fn compare_release(this: &[u64], other: &[u64]) -> Ordering {
    let len = this.len().max(other.len());
    this.iter()
        .chain(iter::repeat(&0))
        .zip(other.iter().chain(iter::repeat(&0)))
        .take(len)
        .map(|(this, other)| this.cmp(other))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// The suffix ordering `.devN < aN < bN < rcN < <final> < .postN` as a sortable tuple:
/// `(kind, pre number, post, dev, local)`.
///
/// A missing post release sorts lowest; a missing dev release sorts highest.
fn sortable_tuple(version: &Version) -> (u8, u64, Option<u64>, u64, &[LocalSegment]) {
    let dev = version.dev.unwrap_or(u64::MAX);
    match (version.pre, version.post, version.dev) {
        (None, None, Some(dev)) => (0, 0, None, dev, &version.local),
        (Some((PreRelease::Alpha, n)), post, _) => (1, n, post, dev, &version.local),
        (Some((PreRelease::Beta, n)), post, _) => (2, n, post, dev, &version.local),
        (Some((PreRelease::Rc, n)), post, _) => (3, n, post, dev, &version.local),
        (None, None, None) => (4, 0, None, 0, &version.local),
        (None, Some(post), _) => (5, 0, Some(post), dev, &version.local),
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    /// Trailing zeros are skipped, consistent with the zero-padded `Eq`.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        let significant = self
            .release
            .iter()
            .rposition(|segment| *segment != 0)
            .map_or(0, |position| position + 1);
        self.release[..significant].hash(state);
        self.pre.hash(state);
        self.post.hash(state);
        self.dev.hash(state);
        self.local.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    /// 1.0.dev456 < 1.0a1 < 1.0a2.dev456 < 1.0a12.dev456 < 1.0a12 < 1.0b1.dev456 < 1.0b2
    /// < 1.0b2.post345.dev456 < 1.0b2.post345 < 1.0c1.dev456 < 1.0c1 < 1.0rc2 < 1.0
    /// < 1.0.post456.dev34 < 1.0.post456
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_release(&self.release, &other.release))
            .then_with(|| sortable_tuple(self).cmp(&sortable_tuple(other)))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use insta::assert_snapshot;
    use test_case::test_case;

    use super::*;

    #[test]
    fn ordering() {
        let versions = [
            "1.0.dev456",
            "1.0a1",
            "1.0a2.dev456",
            "1.0a12.dev456",
            "1.0a12",
            "1.0b1.dev456",
            "1.0b2",
            "1.0b2.post345.dev456",
            "1.0b2.post345",
            "1.0rc1.dev456",
            "1.0rc1",
            "1.0",
            "1.0+abc.5",
            "1.0+abc.7",
            "1.0+5",
            "1.0.post456.dev34",
            "1.0.post456",
            "1.1.dev1",
            "1!0.1",
        ];
        let parsed: Vec<Version> = versions
            .iter()
            .map(|version| Version::from_str(version).unwrap())
            .collect();
        for window in parsed.windows(2) {
            assert!(window[0] < window[1], "{} < {}", window[0], window[1]);
        }
    }

    #[test_case("1.0", "1.0.0")]
    #[test_case("1.0.0", "1")]
    #[test_case("v1.2", "1.2")]
    #[test_case("1.0-alpha-1", "1.0a1")]
    #[test_case("1.0c2", "1.0rc2")]
    #[test_case("1.0-5", "1.0.post5")]
    #[test_case("1.0.post", "1.0.post0")]
    fn equivalent(left: &str, right: &str) {
        let left = Version::from_str(left).unwrap();
        let right = Version::from_str(right).unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn display_normalizes() {
        let version = Version::from_str("1!2.0-ALPHA.3_post4-dev5+Ubuntu-1").unwrap();
        assert_snapshot!(version, @"1!2.0a3.post4.dev5+ubuntu.1");
    }

    #[test]
    fn invalid() {
        assert_snapshot!(
            Version::from_str("1.0-reupload").unwrap_err(),
            @"Version `1.0-reupload` doesn't match PEP 440 rules"
        );
        assert_snapshot!(
            Version::from_str("1.2.*").unwrap_err(),
            @"Version `1.2.*` must not end with a wildcard (`.*`)"
        );
        assert_snapshot!(
            Version::parse_pattern("1.0.dev1.*").unwrap_err(),
            @"Version `1.0.dev1.*` combines a wildcard (`.*`) with a pre-, post-, dev- or local segment"
        );
        assert!(Version::from_str("").is_err());
    }

    #[test]
    fn hash_ignores_trailing_zeros() {
        use std::collections::HashSet;

        let set: HashSet<Version> = ["1.0", "1", "1.0.0"]
            .iter()
            .map(|version| Version::from_str(version).unwrap())
            .collect();
        assert_eq!(set.len(), 1);
    }
}
