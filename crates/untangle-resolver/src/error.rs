use std::fmt::{Display, Formatter};

use thiserror::Error;
use url::Url;

use untangle_backtrack::ResolutionError;
use untangle_pep508::Requirement;

use crate::Candidate;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Client(#[from] untangle_client::Error),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    NoSolution(#[from] NoSolutionError),

    #[error("The resolution did not finish within {0} rounds")]
    TooDeep(usize),

    #[error("The resolution ran out of time in round {0}")]
    DeadlineExceeded(usize),

    #[error("`{candidate}` was offered but does not satisfy: {requirements}")]
    InconsistentCandidate {
        candidate: String,
        requirements: String,
    },
}

impl From<ResolutionError<Requirement, Candidate, Self>> for ResolveError {
    fn from(value: ResolutionError<Requirement, Candidate, Self>) -> Self {
        match value {
            ResolutionError::Impossible { causes } => Self::NoSolution(NoSolutionError {
                causes: causes
                    .into_iter()
                    .map(|cause| ConflictCause {
                        requirement: cause.requirement,
                        required_by: cause.parent.map(|parent| parent.to_string()),
                    })
                    .collect(),
            }),
            ResolutionError::TooDeep { max_rounds } => Self::TooDeep(max_rounds),
            ResolutionError::DeadlineExceeded { round } => Self::DeadlineExceeded(round),
            ResolutionError::InconsistentCandidate {
                candidate,
                requirements,
            } => Self::InconsistentCandidate {
                candidate: candidate.to_string(),
                requirements: requirements
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            },
            ResolutionError::Provider(err) => err,
        }
    }
}

/// The requirements that could not be satisfied together.
#[derive(Debug, Clone)]
pub struct NoSolutionError {
    causes: Vec<ConflictCause>,
}

impl NoSolutionError {
    pub fn causes(&self) -> &[ConflictCause] {
        &self.causes
    }
}

impl std::error::Error for NoSolutionError {}

impl Display for NoSolutionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "No solution satisfies all requirements; in conflict are:")?;
        for cause in &self.causes {
            write!(f, "\n  {cause}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConflictCause {
    pub requirement: Requirement,
    /// The candidate that declared the requirement, `None` for a requested one.
    pub required_by: Option<String>,
}

impl Display for ConflictCause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.required_by {
            Some(parent) => write!(f, "{} (required by {parent})", self.requirement),
            None => write!(f, "{} (requested)", self.requirement),
        }
    }
}

/// Failure to obtain the metadata of a distribution.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("No metadata found for `{filename}` at {url}")]
    NotFound { filename: String, url: Url },

    #[error("Metadata preparation for {url} failed")]
    PreparationFailed {
        url: Url,
        #[source]
        err: Box<untangle_build::Error>,
    },

    #[error("Failed to read `{filename}`")]
    Archive {
        filename: String,
        #[source]
        err: std::io::Error,
    },

    #[error("Failed to read `{filename}`")]
    Zip {
        filename: String,
        #[source]
        err: zip::result::ZipError,
    },

    #[error("Invalid metadata in `{filename}`")]
    Invalid {
        filename: String,
        #[source]
        err: untangle_pypi_types::MetadataError,
    },

    #[error(transparent)]
    Client(#[from] untangle_client::Error),

    #[error("Failed to record the metadata of `{filename}`")]
    Record {
        filename: String,
        #[source]
        err: untangle_client::Error,
    },
}

impl MetadataError {
    /// Whether the error only concerns this distribution, which the resolver then skips.
    /// Network and recording failures abort the resolution instead.
    pub fn is_candidate_local(&self) -> bool {
        match self {
            Self::NotFound { .. }
            | Self::PreparationFailed { .. }
            | Self::Archive { .. }
            | Self::Zip { .. }
            | Self::Invalid { .. } => true,
            Self::Client(_) | Self::Record { .. } => false,
        }
    }
}

/// The error and all its sources, joined with `: `.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use untangle_pep508::Requirement;

    use super::{ConflictCause, NoSolutionError, error_chain};
    use crate::MetadataError;

    #[test]
    fn no_solution() {
        let err = NoSolutionError {
            causes: vec![
                ConflictCause {
                    requirement: Requirement::from_str("urllib3<2").unwrap(),
                    required_by: None,
                },
                ConflictCause {
                    requirement: Requirement::from_str("urllib3>=2").unwrap(),
                    required_by: Some("botocore==1.31.0".to_string()),
                },
            ],
        };
        insta::assert_snapshot!(err, @r"
        No solution satisfies all requirements; in conflict are:
          urllib3<2 (requested)
          urllib3>=2 (required by botocore==1.31.0)
        ");
    }

    #[test]
    fn preparation_failed_chain() {
        let err = MetadataError::PreparationFailed {
            url: "https://files.example.com/foo-1.0.tar.gz".parse().unwrap(),
            err: Box::new(untangle_build::Error::InvalidSourceDist(
                "foo-1.0.tar.gz contains neither a `pyproject.toml` nor a `setup.py` file at \
                 the top level"
                    .to_string(),
            )),
        };
        assert!(err.is_candidate_local());
        insta::assert_snapshot!(error_chain(&err), @"Metadata preparation for https://files.example.com/foo-1.0.tar.gz failed: Invalid source distribution: foo-1.0.tar.gz contains neither a `pyproject.toml` nor a `setup.py` file at the top level");
    }
}
