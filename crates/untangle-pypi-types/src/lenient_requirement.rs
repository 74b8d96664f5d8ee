use std::borrow::Cow;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, de};
use tracing::warn;

use untangle_pep440::{VersionSpecifiers, VersionSpecifiersParseError};
use untangle_pep508::{Pep508Error, Requirement};

type FixUp = (Regex, &'static str, &'static str);

fn compile(fixups: &[(&str, &'static str, &'static str)]) -> Vec<FixUp> {
    fixups
        .iter()
        .map(|(pattern, replacement, note)| {
            (
                Regex::new(pattern).expect("fix-up regex is valid"),
                *replacement,
                *note,
            )
        })
        .collect()
}

/// Repairs for specifiers seen in the wild, applied in order.
static SPECIFIER_FIXUPS: LazyLock<Vec<FixUp>> = LazyLock::new(|| {
    compile(&[
        // Given `!=~5.0,>=4.12`, rewrite to `!=5.0.*,>=4.12`.
        (
            r"!=~((?:\d+\.)*\d+)",
            "!=${1}.*",
            "replacing invalid tilde with wildcard",
        ),
        // Given `>=7.2.0<8.0.0`, rewrite to `>=7.2.0,<8.0.0`.
        (r"(\d)([<>=~!])", "${1},${2}", "inserting missing comma"),
        // Given `>=1.9.*`, rewrite to `>=1.9`.
        (
            r"(>=?)(\d+(?:\.\d+)*)\.\*",
            "${1}${2}",
            "removing star after greater than",
        ),
        // Given `!=3.0*`, rewrite to `!=3.0.*`.
        (
            r"(==|!=)(\d+(?:\.\d+)*)\*",
            "${1}${2}.*",
            "adding dot before star",
        ),
        // Given `>=3.6,`, rewrite to `>=3.6`.
        (r",\s*$", "", "removing trailing comma"),
    ])
});

/// Only for bare specifiers, a requirement's marker values are quoted.
static QUOTE_FIXUP: LazyLock<Vec<FixUp>> = LazyLock::new(|| {
    compile(&[
        // Given `>= '2.7'`, rewrite to `>=2.7`.
        (
            r#"([<>=!~]=?)\s*['"]([^'"]*)['"]"#,
            "${1}${2}",
            "removing quotes around version",
        ),
    ])
});

fn apply_fixups<'a>(input: &'a str, fixups: &[&[FixUp]]) -> (Cow<'a, str>, Vec<&'static str>) {
    let mut patched = Cow::Borrowed(input);
    let mut notes = Vec::new();
    for (regex, replacement, note) in fixups.iter().flat_map(|fixups| fixups.iter()) {
        if regex.is_match(&patched) {
            patched = Cow::Owned(regex.replace_all(&patched, *replacement).into_owned());
            notes.push(*note);
        }
    }
    (patched, notes)
}

/// Like [`Requirement`], but attempts to correct some common errors in published metadata.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LenientRequirement(Requirement);

impl FromStr for LenientRequirement {
    type Err = Pep508Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match Requirement::from_str(input) {
            Ok(requirement) => Ok(Self(requirement)),
            Err(err) => {
                let (patched, notes) = apply_fixups(input, &[&SPECIFIER_FIXUPS]);
                if notes.is_empty() {
                    return Err(err);
                }
                match Requirement::from_str(&patched) {
                    Ok(requirement) => {
                        warn!(
                            "Fixing invalid requirement by {} (before: `{input}`; after: `{patched}`)",
                            notes.join(", ")
                        );
                        Ok(Self(requirement))
                    }
                    Err(_) => Err(err),
                }
            }
        }
    }
}

impl From<LenientRequirement> for Requirement {
    fn from(requirement: LenientRequirement) -> Self {
        requirement.0
    }
}

/// Like [`VersionSpecifiers`], but attempts to correct some common errors in index data, such as
/// `requires-python = ">=3.6.*"`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LenientVersionSpecifiers(VersionSpecifiers);

impl FromStr for LenientVersionSpecifiers {
    type Err = VersionSpecifiersParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match VersionSpecifiers::from_str(input) {
            Ok(specifiers) => Ok(Self(specifiers)),
            Err(err) => {
                let (patched, notes) = apply_fixups(input, &[&QUOTE_FIXUP, &SPECIFIER_FIXUPS]);
                if notes.is_empty() {
                    return Err(err);
                }
                match VersionSpecifiers::from_str(&patched) {
                    Ok(specifiers) => {
                        warn!(
                            "Fixing invalid version specifier by {} (before: `{input}`; after: `{patched}`)",
                            notes.join(", ")
                        );
                        Ok(Self(specifiers))
                    }
                    Err(_) => Err(err),
                }
            }
        }
    }
}

impl From<LenientVersionSpecifiers> for VersionSpecifiers {
    fn from(specifiers: LenientVersionSpecifiers) -> Self {
        specifiers.0
    }
}

impl<'de> Deserialize<'de> for LenientVersionSpecifiers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}
