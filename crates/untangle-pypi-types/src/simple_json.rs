use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use untangle_pep440::{VersionSpecifiers, VersionSpecifiersParseError};

use crate::LenientVersionSpecifiers;

/// The project page of the Simple API in its JSON form.
///
/// <https://peps.python.org/pep-0691/#project-detail>
#[derive(Debug, Clone, Deserialize)]
pub struct SimpleJson {
    #[serde(default)]
    pub files: Vec<File>,
}

/// A single (remote) file belonging to a package, either a wheel or a source distribution.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct File {
    pub filename: String,
    #[serde(default)]
    pub hashes: Hashes,
    /// Parsed leniently. A value that still fails to parse is kept as the error so the finder
    /// can decide what to do with the file.
    #[serde(default, deserialize_with = "deserialize_version_specifiers_lenient")]
    pub requires_python: Option<Result<VersionSpecifiers, VersionSpecifiersParseError>>,
    pub url: String,
    pub yanked: Option<Yanked>,
}

fn deserialize_version_specifiers_lenient<'de, D>(
    deserializer: D,
) -> Result<Option<Result<VersionSpecifiers, VersionSpecifiersParseError>>, D::Error>
where
    D: Deserializer<'de>,
{
    let maybe_string: Option<String> = Option::deserialize(deserializer)?;
    let Some(string) = maybe_string else {
        return Ok(None);
    };
    if string.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(
        LenientVersionSpecifiers::from_str(&string).map(Into::into),
    ))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Yanked {
    Bool(bool),
    Reason(String),
}

impl Yanked {
    pub fn is_yanked(&self) -> bool {
        match self {
            Self::Bool(is_yanked) => *is_yanked,
            Self::Reason(_) => true,
        }
    }
}

/// A dictionary mapping a hash name to a hex encoded digest of the file.
///
/// Only SHA 256 is used, other algorithms are ignored.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
pub struct Hashes {
    pub sha256: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::SimpleJson;

    #[test]
    fn project_page() {
        let page: SimpleJson = serde_json::from_str(
            r#"{
                "meta": {"api-version": "1.1"},
                "name": "pysocks",
                "files": [
                    {
                        "filename": "PySocks-1.7.1-py27-none-any.whl",
                        "url": "https://files.example.com/PySocks-1.7.1-py27-none-any.whl",
                        "hashes": {"sha256": "08e69f09", "md5": "abc"},
                        "requires-python": ">=2.7, !=3.0.*, !=3.1.*, !=3.2.*, !=3.3.*",
                        "yanked": false
                    },
                    {
                        "filename": "PySocks-1.7.1.tar.gz",
                        "url": "https://files.example.com/PySocks-1.7.1.tar.gz",
                        "hashes": {},
                        "requires-python": ">=3.6.*",
                        "yanked": "broken"
                    },
                    {
                        "filename": "PySocks-1.0.tar.gz",
                        "url": "https://files.example.com/PySocks-1.0.tar.gz",
                        "requires-python": ">=python3"
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(page.files.len(), 3);
        let wheel = &page.files[0];
        assert_eq!(wheel.hashes.sha256.as_deref(), Some("08e69f09"));
        assert!(matches!(wheel.requires_python, Some(Ok(_))));
        assert!(!wheel.yanked.as_ref().unwrap().is_yanked());

        let sdist = &page.files[1];
        assert_eq!(sdist.hashes.sha256, None);
        assert_eq!(
            sdist.requires_python.as_ref().unwrap().as_ref().unwrap().to_string(),
            ">=3.6"
        );
        assert!(sdist.yanked.as_ref().unwrap().is_yanked());

        assert!(matches!(page.files[2].requires_python, Some(Err(_))));
    }

    #[test]
    fn no_files() {
        let page: SimpleJson = serde_json::from_str(r#"{"name": "empty"}"#).unwrap();
        assert!(page.files.is_empty());
    }
}
