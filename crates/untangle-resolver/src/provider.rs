use untangle_backtrack::{Dependencies, InformationFor, Provider};
use untangle_pep508::{MarkerEnvironment, Requirement};

use crate::{Candidate, Identifier, IndexFinder, MetadataFetcher, ResolveError};

/// Resolves Python packages from an index.
pub struct PypiProvider<'a> {
    finder: &'a IndexFinder<'a>,
    fetcher: &'a MetadataFetcher<'a>,
    /// The environment dependency markers are evaluated in.
    markers: &'a MarkerEnvironment,
}

impl<'a> PypiProvider<'a> {
    pub fn new(
        finder: &'a IndexFinder<'a>,
        fetcher: &'a MetadataFetcher<'a>,
        markers: &'a MarkerEnvironment,
    ) -> Self {
        Self {
            finder,
            fetcher,
            markers,
        }
    }
}

impl Provider for PypiProvider<'_> {
    type Identifier = Identifier;
    type Requirement = Requirement;
    type Candidate = Candidate;
    /// The number of candidates left; packages with fewer options are pinned first.
    type Preference = usize;
    type Error = ResolveError;

    fn identify_requirement(&self, requirement: &Requirement) -> Identifier {
        Identifier::from_requirement(requirement)
    }

    fn identify_candidate(&self, candidate: &Candidate) -> Identifier {
        candidate.identifier()
    }

    fn get_preference(
        &self,
        _identifier: &Identifier,
        candidates: &[Candidate],
        _information: &[InformationFor<Self>],
        _backtrack_causes: &[InformationFor<Self>],
    ) -> usize {
        candidates.len()
    }

    /// The candidates matching all requirements, newest first. A version is excluded as a
    /// whole once any of its files was found incompatible.
    fn find_matches(
        &self,
        identifier: &Identifier,
        requirements: &[&Requirement],
        incompatibilities: &[Candidate],
    ) -> Result<Vec<Candidate>, ResolveError> {
        let mut candidates = self
            .finder
            .find_candidates(identifier)?
            .iter()
            .filter(|candidate| {
                !incompatibilities
                    .iter()
                    .any(|incompatible| incompatible.version() == candidate.version())
            })
            .filter(|candidate| {
                requirements
                    .iter()
                    .all(|requirement| requirement.specifiers.admits(candidate.version()))
            })
            .cloned()
            .collect::<Vec<_>>();
        // Stable, so files of the same version keep their index order.
        candidates.sort_by(|a, b| b.version().cmp(a.version()));
        Ok(candidates)
    }

    fn is_satisfied_by(&self, requirement: &Requirement, candidate: &Candidate) -> bool {
        requirement.name == *candidate.name()
            && requirement.specifiers.admits(candidate.version())
    }

    fn get_dependencies(
        &self,
        candidate: &Candidate,
    ) -> Result<Dependencies<Requirement>, ResolveError> {
        Ok(candidate.dependencies(self.fetcher, self.markers)?)
    }
}
