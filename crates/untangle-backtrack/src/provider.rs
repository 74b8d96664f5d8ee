use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::InformationFor;

/// The dependencies of a candidate, as far as they can be determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependencies<R> {
    /// The candidate's requirements; an empty list means it has none.
    Available(Vec<R>),
    /// The dependencies could not be determined, e.g. because the candidate's metadata is
    /// missing. The candidate is skipped as if it conflicted.
    Unavailable(String),
}

/// Everything the resolver needs to know about packages.
///
/// All methods take `&self`; a provider that caches does so through interior mutability. The
/// resolver calls the provider from one thread only.
pub trait Provider {
    /// What the resolver makes one decision for, e.g. a package name with a set of extras.
    ///
    /// Among identifiers with the same preference, the smaller one (by [`Ord`]) is pinned first.
    type Identifier: Clone + Eq + Hash + Ord + Debug + Display;
    type Requirement: Clone + Debug + Display;
    /// One concrete choice for an identifier.
    type Candidate: Clone + Eq + Debug + Display;
    /// The smallest preference is pinned first.
    type Preference: Ord;
    /// An error that aborts the resolution.
    type Error: std::error::Error + 'static;

    fn identify_requirement(&self, requirement: &Self::Requirement) -> Self::Identifier;

    fn identify_candidate(&self, candidate: &Self::Candidate) -> Self::Identifier;

    /// The preference of an unsatisfied identifier, given its remaining candidates, the
    /// requirements on it and the causes of the last backtrack.
    fn get_preference(
        &self,
        identifier: &Self::Identifier,
        candidates: &[Self::Candidate],
        information: &[InformationFor<Self>],
        backtrack_causes: &[InformationFor<Self>],
    ) -> Self::Preference;

    /// The candidates for `identifier` that satisfy all `requirements` and are not in
    /// `incompatibilities`, most preferred first.
    fn find_matches(
        &self,
        identifier: &Self::Identifier,
        requirements: &[&Self::Requirement],
        incompatibilities: &[Self::Candidate],
    ) -> Result<Vec<Self::Candidate>, Self::Error>;

    fn is_satisfied_by(&self, requirement: &Self::Requirement, candidate: &Self::Candidate)
    -> bool;

    /// The requirements a candidate adds when it's pinned.
    ///
    /// This is called more than once for the same candidate, so providers that fetch anything
    /// should cache the result.
    fn get_dependencies(
        &self,
        candidate: &Self::Candidate,
    ) -> Result<Dependencies<Self::Requirement>, Self::Error>;
}

