//! Resolve Python requirements against a package index.
//!
//! The [`IndexFinder`] lists the distributions of a package as [`Candidate`]s, the
//! [`MetadataFetcher`] obtains their dependencies, and the [`PypiProvider`] hands both to the
//! backtracking engine of `untangle-backtrack`. [`generate_lock`] turns the outcome into a
//! [`LockDocument`].

pub use candidate::Candidate;
pub use error::{ConflictCause, MetadataError, NoSolutionError, ResolveError};
pub use finder::IndexFinder;
pub use identifier::Identifier;
pub use lock::{LockDocument, LockSource, generate_lock};
pub use metadata::MetadataFetcher;
pub use provider::PypiProvider;
pub use reporter::TracingReporter;
pub use session::{DEFAULT_MAX_ROUNDS, ResolveOptions, Session};

mod candidate;
mod error;
mod finder;
mod identifier;
mod lock;
mod metadata;
mod provider;
mod reporter;
mod session;

/// The pinned candidates of a successful resolution and the edges between them.
pub type ResolutionResult = untangle_backtrack::Resolution<
    Identifier,
    untangle_pep508::Requirement,
    Candidate,
>;
