use crate::{CriterionFor, InformationFor, Provider, StateFor};

/// Hooks into the progress of a resolution, e.g. for logging.
///
/// All methods do nothing by default.
pub trait Reporter<P: Provider> {
    fn starting(&self) {}

    fn starting_round(&self, _index: usize) {}

    fn ending_round(&self, _index: usize, _state: &StateFor<P>) {}

    /// The resolution succeeded with `state`.
    fn ending(&self, _state: &StateFor<P>) {}

    /// A requirement is added, either a root requirement or a dependency of `parent`.
    fn adding_requirement(&self, _requirement: &P::Requirement, _parent: Option<&P::Candidate>) {}

    /// No candidate of the identifier could be pinned; the resolver backtracks.
    fn resolving_conflicts(&self, _causes: &[InformationFor<P>]) {}

    /// A dependency of `candidate` left no candidates for `criterion`.
    fn rejecting_candidate(&self, _criterion: &CriterionFor<P>, _candidate: &P::Candidate) {}

    /// The dependencies of `candidate` could not be determined.
    fn rejecting_unavailable(&self, _candidate: &P::Candidate, _reason: &str) {}

    fn pinning(&self, _candidate: &P::Candidate) {}
}

/// A [`Reporter`] that reports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl<P: Provider> Reporter<P> for NoopReporter {}
