//! A backtracking dependency resolver.
//!
//! The resolver keeps one [`Criterion`] per identifier: the requirements on it, where they came
//! from, the candidates that still match them and the candidates ruled out by earlier conflicts.
//! Each round pins the unsatisfied identifier with the fewest options (as decided by
//! [`Provider::get_preference`]) to the first of its candidates whose dependencies don't
//! conflict. When none can be pinned, the resolver backjumps to the most recent pin that
//! introduced one of the conflicting requirements, marks that pin as incompatible and continues
//! from there.
//!
//! Everything about packages, versions and where to find them is behind the [`Provider`] trait.

pub use error::ResolutionError;
pub use provider::{Dependencies, Provider};
pub use reporter::{NoopReporter, Reporter};
pub use resolution::Resolution;
pub use resolver::Resolver;
pub use state::{Criterion, RequirementInformation, State};

mod error;
mod provider;
mod reporter;
mod resolution;
mod resolver;
mod state;

/// The [`ResolutionError`] of a [`Provider`].
pub type ErrorFor<P> = ResolutionError<
    <P as Provider>::Requirement,
    <P as Provider>::Candidate,
    <P as Provider>::Error,
>;

/// The [`State`] of a [`Provider`].
pub type StateFor<P> = State<
    <P as Provider>::Identifier,
    <P as Provider>::Requirement,
    <P as Provider>::Candidate,
>;

/// The [`Criterion`] of a [`Provider`].
pub type CriterionFor<P> = Criterion<<P as Provider>::Requirement, <P as Provider>::Candidate>;

/// The [`RequirementInformation`] of a [`Provider`].
pub type InformationFor<P> =
    RequirementInformation<<P as Provider>::Requirement, <P as Provider>::Candidate>;

/// The [`Resolution`] of a [`Provider`].
pub type ResolutionFor<P> = Resolution<
    <P as Provider>::Identifier,
    <P as Provider>::Requirement,
    <P as Provider>::Candidate,
>;
