//! Python version numbers and specifiers, following
//! [PEP 440](https://peps.python.org/pep-0440).
//!
//! Sorting and matching differ: `1.0+local > 1.0` when sorting, but `==1.0` matches
//! `1.0+local`. Pre-releases sort below the final release and are only admitted by a
//! specifier set that names a pre-release itself, see [`VersionSpecifiers::admits`].
pub use version::{LocalSegment, Operator, PreRelease, Version, VersionParseError};
pub use version_specifier::{
    VersionSpecifier, VersionSpecifierParseError, VersionSpecifiers, VersionSpecifiersParseError,
};

mod version;
mod version_specifier;
