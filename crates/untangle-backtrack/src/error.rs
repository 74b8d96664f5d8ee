use std::fmt::{Debug, Display, Formatter};

use crate::RequirementInformation;

#[derive(Debug)]
pub enum ResolutionError<R, C, E> {
    /// No combination of candidates satisfies the requirements. `causes` are the requirements
    /// that were in conflict when the resolver ran out of decisions to revisit.
    Impossible {
        causes: Vec<RequirementInformation<R, C>>,
    },
    /// The resolution did not finish within the allowed number of rounds.
    TooDeep { max_rounds: usize },
    /// The deadline passed before `round` started.
    DeadlineExceeded { round: usize },
    /// The provider returned a candidate that doesn't satisfy the requirements it was asked to
    /// match.
    InconsistentCandidate { candidate: C, requirements: Vec<R> },
    /// The provider failed.
    Provider(E),
}

impl<R: Display, C: Display, E: Display> Display for ResolutionError<R, C, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Impossible { causes } => {
                write!(f, "No solution satisfies all requirements; in conflict are:")?;
                for cause in causes {
                    write!(f, "\n  {cause}")?;
                }
                Ok(())
            }
            Self::TooDeep { max_rounds } => {
                write!(f, "The resolution did not finish within {max_rounds} rounds")
            }
            Self::DeadlineExceeded { round } => {
                write!(f, "The resolution ran out of time in round {round}")
            }
            Self::InconsistentCandidate {
                candidate,
                requirements,
            } => {
                write!(f, "`{candidate}` was offered but does not satisfy:")?;
                for requirement in requirements {
                    write!(f, " `{requirement}`")?;
                }
                Ok(())
            }
            Self::Provider(err) => Display::fmt(err, f),
        }
    }
}

impl<R, C, E> std::error::Error for ResolutionError<R, C, E>
where
    R: Display + Debug,
    C: Display + Debug,
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Provider(err) => err.source(),
            _ => None,
        }
    }
}
