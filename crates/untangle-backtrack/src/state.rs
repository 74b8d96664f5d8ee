use std::fmt::{Display, Formatter};

use indexmap::IndexMap;

/// A requirement and the candidate that introduced it, or `None` for a root requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementInformation<R, C> {
    pub requirement: R,
    pub parent: Option<C>,
}

impl<R: Display, C: Display> Display for RequirementInformation<R, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{} (required by {parent})", self.requirement),
            None => write!(f, "{} (requested)", self.requirement),
        }
    }
}

/// Everything known about one identifier during the search.
#[derive(Debug, Clone)]
pub struct Criterion<R, C> {
    /// The candidates that satisfy all requirements and are not incompatible, most preferred
    /// first. Never empty.
    pub candidates: Vec<C>,
    /// The requirements on the identifier, with where they came from.
    pub information: Vec<RequirementInformation<R, C>>,
    /// Candidates ruled out by backtracking.
    pub incompatibilities: Vec<C>,
}

impl<R, C> Criterion<R, C> {
    pub fn iter_requirement(&self) -> impl Iterator<Item = &R> {
        self.information.iter().map(|information| &information.requirement)
    }

    /// The candidates that introduced a requirement; `None` for root requirements.
    pub fn iter_parent(&self) -> impl Iterator<Item = Option<&C>> {
        self.information
            .iter()
            .map(|information| information.parent.as_ref())
    }
}

/// A snapshot of the search: the pins made so far and the criteria they led to.
///
/// The resolver keeps a stack of these to backtrack to.
#[derive(Debug, Clone)]
pub struct State<I, R, C> {
    /// Pins in the order they were made.
    pub mapping: IndexMap<I, C>,
    pub criteria: IndexMap<I, Criterion<R, C>>,
    /// The requirements that caused the last backtrack.
    pub backtrack_causes: Vec<RequirementInformation<R, C>>,
}

impl<I, R, C> Default for State<I, R, C> {
    fn default() -> Self {
        Self {
            mapping: IndexMap::new(),
            criteria: IndexMap::new(),
            backtrack_causes: Vec::new(),
        }
    }
}
