use std::cell::OnceCell;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::str::FromStr;

use tracing::{debug, warn};
use url::Url;

use untangle_backtrack::Dependencies;
use untangle_distribution_filename::DistFilename;
use untangle_normalize::{ExtraName, PackageName};
use untangle_pep440::{Version, VersionSpecifier, VersionSpecifiers};
use untangle_pep508::{MarkerEnvironment, Requirement};
use untangle_pypi_types::Metadata;

use crate::error::error_chain;
use crate::{Identifier, MetadataError, MetadataFetcher};

/// One distribution file of a package, considered with a set of extras.
///
/// Two candidates are the same choice if they point at the same URL. Metadata and dependencies
/// are fetched at most once per candidate; clones share them.
#[derive(Debug, Clone)]
pub struct Candidate(Rc<CandidateInner>);

#[derive(Debug)]
struct CandidateInner {
    filename: DistFilename,
    url: Url,
    sha256: Option<String>,
    extras: Vec<ExtraName>,
    metadata: OnceCell<Rc<Metadata>>,
    dependencies: OnceCell<Dependencies<Requirement>>,
}

impl Candidate {
    pub fn new(
        filename: DistFilename,
        url: Url,
        sha256: Option<String>,
        extras: Vec<ExtraName>,
    ) -> Self {
        Self(Rc::new(CandidateInner {
            filename,
            url,
            sha256,
            extras,
            metadata: OnceCell::new(),
            dependencies: OnceCell::new(),
        }))
    }

    pub fn name(&self) -> &PackageName {
        self.0.filename.name()
    }

    pub fn version(&self) -> &Version {
        self.0.filename.version()
    }

    pub fn filename(&self) -> &DistFilename {
        &self.0.filename
    }

    pub fn url(&self) -> &Url {
        &self.0.url
    }

    pub fn sha256(&self) -> Option<&str> {
        self.0.sha256.as_deref()
    }

    pub fn extras(&self) -> &[ExtraName] {
        &self.0.extras
    }

    pub fn is_wheel(&self) -> bool {
        self.0.filename.is_wheel()
    }

    pub fn identifier(&self) -> Identifier {
        Identifier::new(self.name().clone(), self.0.extras.iter().cloned())
    }

    /// The core metadata, fetched on first use.
    pub fn metadata(&self, fetcher: &MetadataFetcher) -> Result<Rc<Metadata>, MetadataError> {
        if let Some(metadata) = self.0.metadata.get() {
            return Ok(metadata.clone());
        }
        let metadata = fetcher.fetch(self)?;
        Ok(self.0.metadata.get_or_init(|| metadata).clone())
    }

    /// The requirements that apply to this candidate, or why they could not be determined.
    ///
    /// A `Requires-Dist` entry applies if its marker holds in `markers` without extras or with
    /// any one of the candidate's extras. A candidate with extras also requires its own package
    /// at the same version, so that `pkg` and `pkg[extra]` are pinned alike.
    ///
    /// Only network and recording failures are returned as errors; a distribution whose metadata
    /// can't be obtained or parsed is [`Dependencies::Unavailable`].
    pub fn dependencies(
        &self,
        fetcher: &MetadataFetcher,
        markers: &MarkerEnvironment,
    ) -> Result<Dependencies<Requirement>, MetadataError> {
        if let Some(dependencies) = self.0.dependencies.get() {
            return Ok(dependencies.clone());
        }

        let dependencies = match self.metadata(fetcher) {
            Ok(metadata) => {
                for mismatch in self.mismatches(&metadata, markers) {
                    warn!("{self}: {mismatch}");
                }
                match metadata.requires_dist() {
                    Ok(requires_dist) => {
                        Dependencies::Available(self.applicable(requires_dist, markers))
                    }
                    Err(err) => {
                        let err = MetadataError::Invalid {
                            filename: self.0.filename.to_string(),
                            err,
                        };
                        warn!("Skipping {self}: {}", error_chain(&err));
                        Dependencies::Unavailable(error_chain(&err))
                    }
                }
            }
            Err(err) if err.is_candidate_local() => {
                warn!("Skipping {self}: {}", error_chain(&err));
                Dependencies::Unavailable(error_chain(&err))
            }
            Err(err) => return Err(err),
        };
        Ok(self.0.dependencies.get_or_init(|| dependencies).clone())
    }

    /// Where the metadata disagrees with the filename, the target Python or the requested
    /// extras. These are only reported; the metadata is used as is.
    fn mismatches(&self, metadata: &Metadata, markers: &MarkerEnvironment) -> Vec<String> {
        let mut mismatches = Vec::new();
        if let Ok(name) = metadata.name() {
            if &name != self.name() {
                mismatches.push(format!("the metadata is for the package `{name}`"));
            }
        }
        if let Ok(version) = metadata.version() {
            if &version != self.version() {
                mismatches.push(format!("the metadata is for version {version}"));
            }
        }
        if let Ok(Some(requires_python)) = metadata.requires_python() {
            if !requires_python.contains(&markers.python_full_version.version) {
                mismatches.push(format!(
                    "requires Python {requires_python}, but resolving for {}",
                    markers.python_full_version.string
                ));
            }
        }
        // `Provides-Extra` is mandatory since metadata 2.1.
        let lists_extras = metadata
            .metadata_version()
            .and_then(|metadata_version| Version::from_str(metadata_version).ok())
            .is_some_and(|metadata_version| metadata_version >= Version::new([2, 1]));
        if lists_extras {
            let provided = metadata.provides_extras();
            for extra in &self.0.extras {
                if !provided.contains(extra) {
                    mismatches.push(format!("the package has no extra named `{extra}`"));
                }
            }
        }
        mismatches
    }

    fn applicable(
        &self,
        requires_dist: Vec<Requirement>,
        markers: &MarkerEnvironment,
    ) -> Vec<Requirement> {
        let mut requirements = requires_dist
            .into_iter()
            .filter(|requirement| {
                let applies = requirement.evaluate_markers(markers, &[])
                    || self.0.extras.iter().any(|extra| {
                        requirement.evaluate_markers(markers, std::slice::from_ref(extra))
                    });
                if !applies {
                    debug!("Ignoring `{requirement}` of {self}");
                }
                applies
            })
            .collect::<Vec<_>>();

        if !self.0.extras.is_empty() {
            requirements.push(Requirement {
                name: self.name().clone(),
                extras: Vec::new(),
                specifiers: VersionSpecifiers::from(VersionSpecifier::equals_version(
                    self.version().clone(),
                )),
                marker: None,
            });
        }
        requirements
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.0.url == other.0.url
    }
}

impl Eq for Candidate {}

impl Hash for Candidate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.url.hash(state);
    }
}

impl Display for Candidate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}=={}", self.identifier(), self.version())
    }
}
