use thiserror::Error;

pub use extra_name::ExtraName;
pub use package_name::PackageName;

mod extra_name;
mod package_name;

/// Validate and normalize a package or extra name.
///
/// Lowercases ASCII letters and collapses every run of `-`, `_` and `.` into a single `-`.
pub(crate) fn validate_and_normalize(name: &str) -> Result<String, InvalidNameError> {
    let mut normalized = String::with_capacity(name.len());

    let mut last = None;
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' => normalized.push(byte.to_ascii_lowercase() as char),
            b'a'..=b'z' | b'0'..=b'9' => normalized.push(byte as char),
            b'-' | b'_' | b'.' => match last {
                // Names can't start with punctuation.
                None => return Err(InvalidNameError(name.to_string())),
                Some(b'-' | b'_' | b'.') => {}
                Some(_) => normalized.push('-'),
            },
            _ => return Err(InvalidNameError(name.to_string())),
        }
        last = Some(byte);
    }

    match last {
        None | Some(b'-' | b'_' | b'.') => Err(InvalidNameError(name.to_string())),
        Some(_) => Ok(normalized),
    }
}

/// Invalid [`PackageName`] or [`ExtraName`].
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error(
    "Not a valid package or extra name: \"{0}\". Names must start and end with a letter or \
    digit and may only contain -, _, ., and alphanumeric characters."
)]
pub struct InvalidNameError(String);

impl InvalidNameError {
    /// Returns the invalid name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("friendly-bard", "friendly-bard")]
    #[test_case("Friendly-Bard", "friendly-bard")]
    #[test_case("FRIENDLY-BARD", "friendly-bard")]
    #[test_case("friendly.bard", "friendly-bard")]
    #[test_case("friendly_bard", "friendly-bard")]
    #[test_case("friendly--bard", "friendly-bard")]
    #[test_case("FrIeNdLy-._.-bArD", "friendly-bard")]
    #[test_case("PySocks", "pysocks")]
    #[test_case("charset_normalizer", "charset-normalizer")]
    fn normalize(input: &str, expected: &str) {
        assert_eq!(validate_and_normalize(input).unwrap(), expected);
    }

    #[test_case(""; "empty")]
    #[test_case("-friendly"; "leading dash")]
    #[test_case("friendly-"; "trailing dash")]
    #[test_case("friendly_"; "trailing underscore")]
    #[test_case("friendly bard"; "whitespace")]
    #[test_case("friendly!bard"; "punctuation")]
    fn reject(input: &str) {
        let err = validate_and_normalize(input).unwrap_err();
        assert_eq!(err.as_str(), input);
    }
}
