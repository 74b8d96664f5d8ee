use std::time::Instant;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use crate::{
    Criterion, CriterionFor, Dependencies, ErrorFor, InformationFor, Provider, Reporter,
    RequirementInformation, ResolutionError, ResolutionFor, StateFor,
};

/// Resolves root requirements to one candidate per identifier.
pub struct Resolver<'a, P: Provider, R: Reporter<P>> {
    provider: &'a P,
    reporter: &'a R,
    deadline: Option<Instant>,
}

impl<'a, P: Provider, R: Reporter<P>> Resolver<'a, P, R> {
    pub fn new(provider: &'a P, reporter: &'a R) -> Self {
        Self {
            provider,
            reporter,
            deadline: None,
        }
    }

    /// Give up with [`ResolutionError::DeadlineExceeded`] if a round would start after
    /// `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Resolve `requirements`, giving up with [`ResolutionError::TooDeep`] after `max_rounds`
    /// rounds.
    pub fn resolve(
        &self,
        requirements: impl IntoIterator<Item = P::Requirement>,
        max_rounds: usize,
    ) -> Result<ResolutionFor<P>, ErrorFor<P>> {
        let search = Search {
            context: Context {
                provider: self.provider,
                reporter: self.reporter,
            },
            deadline: self.deadline,
            stack: Vec::new(),
            current: StateFor::<P>::default(),
        };
        search.run(requirements, max_rounds)
    }
}

/// A dependency of a candidate left no candidates for an identifier.
enum CriteriaError<P: Provider> {
    Conflicted(CriterionFor<P>),
    Provider(P::Error),
}

struct Context<'a, P: Provider, R: Reporter<P>> {
    provider: &'a P,
    reporter: &'a R,
}

impl<P: Provider, R: Reporter<P>> Context<'_, P, R> {
    /// Add `requirement` to the criterion of its identifier, narrowing the candidates.
    fn add_to_criteria(
        &self,
        criteria: &mut IndexMap<P::Identifier, CriterionFor<P>>,
        requirement: P::Requirement,
        parent: Option<&P::Candidate>,
    ) -> Result<(), CriteriaError<P>> {
        self.reporter.adding_requirement(&requirement, parent);
        let identifier = self.provider.identify_requirement(&requirement);
        let existing = criteria.get(&identifier);

        let incompatibilities = existing
            .map(|criterion| criterion.incompatibilities.clone())
            .unwrap_or_default();
        let mut requirements = existing
            .map(|criterion| criterion.iter_requirement().collect::<Vec<_>>())
            .unwrap_or_default();
        requirements.push(&requirement);
        let candidates = self
            .provider
            .find_matches(&identifier, &requirements, &incompatibilities)
            .map_err(CriteriaError::Provider)?;

        let mut information = existing
            .map(|criterion| criterion.information.clone())
            .unwrap_or_default();
        information.push(RequirementInformation {
            requirement,
            parent: parent.cloned(),
        });
        let criterion = Criterion {
            candidates,
            information,
            incompatibilities,
        };
        if criterion.candidates.is_empty() {
            return Err(CriteriaError::Conflicted(criterion));
        }
        criteria.insert(identifier, criterion);
        Ok(())
    }

    /// Drop the requirements introduced by the pins of `parents`.
    fn remove_information_from_criteria(
        &self,
        criteria: &mut IndexMap<P::Identifier, CriterionFor<P>>,
        parents: &FxHashSet<P::Identifier>,
    ) {
        if parents.is_empty() {
            return;
        }
        for criterion in criteria.values_mut() {
            criterion.information.retain(|information| {
                information.parent.as_ref().is_none_or(|parent| {
                    !parents.contains(&self.provider.identify_candidate(parent))
                })
            });
        }
    }

    fn is_current_pin_satisfying(
        &self,
        state: &StateFor<P>,
        identifier: &P::Identifier,
        criterion: &CriterionFor<P>,
    ) -> bool {
        let Some(pin) = state.mapping.get(identifier) else {
            return false;
        };
        criterion
            .iter_requirement()
            .all(|requirement| self.provider.is_satisfied_by(requirement, pin))
    }

    /// The identifiers of the requirements of `candidate`.
    fn dependency_identifiers(
        &self,
        candidate: &P::Candidate,
    ) -> Result<FxHashSet<P::Identifier>, P::Error> {
        Ok(match self.provider.get_dependencies(candidate)? {
            Dependencies::Available(requirements) => requirements
                .iter()
                .map(|requirement| self.provider.identify_requirement(requirement))
                .collect(),
            Dependencies::Unavailable(_) => FxHashSet::default(),
        })
    }
}

/// The state of one resolution.
///
/// `stack` holds the earlier states, `current` is the one being worked on. Pushing a state
/// saves a copy of `current`; backtracking replaces `current` with a copy of an earlier one.
struct Search<'a, P: Provider, R: Reporter<P>> {
    context: Context<'a, P, R>,
    deadline: Option<Instant>,
    stack: Vec<StateFor<P>>,
    current: StateFor<P>,
}

impl<P: Provider, R: Reporter<P>> Search<'_, P, R> {
    fn run(
        mut self,
        requirements: impl IntoIterator<Item = P::Requirement>,
        max_rounds: usize,
    ) -> Result<ResolutionFor<P>, ErrorFor<P>> {
        self.context.reporter.starting();

        for requirement in requirements {
            match self
                .context
                .add_to_criteria(&mut self.current.criteria, requirement, None)
            {
                Ok(()) => {}
                Err(CriteriaError::Conflicted(criterion)) => {
                    return Err(ResolutionError::Impossible {
                        causes: criterion.information,
                    });
                }
                Err(CriteriaError::Provider(err)) => return Err(ResolutionError::Provider(err)),
            }
        }
        self.push_new_state();

        for round in 0..max_rounds {
            if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(ResolutionError::DeadlineExceeded { round });
            }
            self.context.reporter.starting_round(round);

            let unsatisfied = self
                .current
                .criteria
                .iter()
                .filter(|(identifier, criterion)| {
                    !self
                        .context
                        .is_current_pin_satisfying(&self.current, identifier, criterion)
                })
                .collect::<Vec<_>>();

            // The most constrained identifier goes first; ties are broken by the identifier.
            let name = unsatisfied
                .iter()
                .min_by_key(|(identifier, criterion)| {
                    (
                        self.context.provider.get_preference(
                            identifier,
                            &criterion.candidates,
                            &criterion.information,
                            &self.current.backtrack_causes,
                        ),
                        *identifier,
                    )
                })
                .map(|(identifier, _)| (*identifier).clone());
            let satisfied = self
                .current
                .criteria
                .keys()
                .filter(|identifier| {
                    !unsatisfied
                        .iter()
                        .any(|(unsatisfied, _)| unsatisfied == identifier)
                })
                .cloned()
                .collect::<FxHashSet<_>>();

            let Some(name) = name else {
                debug!("Resolved after {round} rounds");
                self.context.reporter.ending(&self.current);
                return Ok(ResolutionFor::<P>::from_state(
                    self.context.provider,
                    self.current,
                ));
            };

            let failure_causes = self.attempt_to_pin_criterion(&name)?;
            if failure_causes.is_empty() {
                // Pins that the new requirements invalidated are revisited, so the requirements
                // they introduced are no longer in force.
                let newly_unsatisfied = self
                    .current
                    .criteria
                    .iter()
                    .filter(|(identifier, criterion)| {
                        satisfied.contains(*identifier)
                            && !self.context.is_current_pin_satisfying(
                                &self.current,
                                identifier,
                                criterion,
                            )
                    })
                    .map(|(identifier, _)| identifier.clone())
                    .collect::<FxHashSet<_>>();
                self.context
                    .remove_information_from_criteria(&mut self.current.criteria, &newly_unsatisfied);
                self.push_new_state();
            } else {
                let causes = failure_causes
                    .into_iter()
                    .flat_map(|criterion| criterion.information)
                    .collect::<Vec<_>>();
                self.context.reporter.resolving_conflicts(&causes);
                let success = self.backjump(&causes)?;
                if !success {
                    return Err(ResolutionError::Impossible { causes });
                }
                self.current.backtrack_causes = causes;
            }

            self.context.reporter.ending_round(round, &self.current);
        }

        Err(ResolutionError::TooDeep { max_rounds })
    }

    fn push_new_state(&mut self) {
        self.stack.push(self.current.clone());
    }

    /// Try to pin a candidate of `name`. Returns the criteria that rejected the candidates, or
    /// nothing if a candidate was pinned.
    fn attempt_to_pin_criterion(
        &mut self,
        name: &P::Identifier,
    ) -> Result<Vec<CriterionFor<P>>, ErrorFor<P>> {
        let Some(criterion) = self.current.criteria.get(name).cloned() else {
            return Ok(Vec::new());
        };

        let mut causes = Vec::new();
        for candidate in &criterion.candidates {
            let dependencies = match self
                .context
                .provider
                .get_dependencies(candidate)
                .map_err(ResolutionError::Provider)?
            {
                Dependencies::Available(dependencies) => dependencies,
                Dependencies::Unavailable(reason) => {
                    self.context
                        .reporter
                        .rejecting_unavailable(candidate, &reason);
                    continue;
                }
            };

            let mut criteria = self.current.criteria.clone();
            let mut conflict = None;
            for requirement in dependencies {
                match self
                    .context
                    .add_to_criteria(&mut criteria, requirement, Some(candidate))
                {
                    Ok(()) => {}
                    Err(CriteriaError::Conflicted(conflicted)) => {
                        conflict = Some(conflicted);
                        break;
                    }
                    Err(CriteriaError::Provider(err)) => {
                        return Err(ResolutionError::Provider(err));
                    }
                }
            }
            if let Some(conflicted) = conflict {
                self.context
                    .reporter
                    .rejecting_candidate(&conflicted, candidate);
                causes.push(conflicted);
                continue;
            }

            // The provider only offers candidates that match, so this is a provider bug.
            if !criterion
                .iter_requirement()
                .all(|requirement| self.context.provider.is_satisfied_by(requirement, candidate))
            {
                return Err(ResolutionError::InconsistentCandidate {
                    candidate: candidate.clone(),
                    requirements: criterion.iter_requirement().cloned().collect(),
                });
            }

            self.context.reporter.pinning(candidate);
            self.current.criteria = criteria;
            self.current.mapping.shift_remove(name);
            self.current.mapping.insert(name.clone(), candidate.clone());
            return Ok(Vec::new());
        }

        // Every candidate was unavailable; the requirements on the identifier are the conflict.
        if causes.is_empty() {
            causes.push(criterion);
        }
        Ok(causes)
    }

    /// Go back to the most recent pin whose dependencies are involved in `causes`, mark it as
    /// incompatible and try to continue from the state before it.
    ///
    /// Returns `false` if no earlier state can be continued from.
    fn backjump(&mut self, causes: &[InformationFor<P>]) -> Result<bool, ErrorFor<P>> {
        let provider = self.context.provider;
        let incompatible_deps = causes
            .iter()
            .filter_map(|cause| cause.parent.as_ref())
            .map(|parent| provider.identify_candidate(parent))
            .chain(
                causes
                    .iter()
                    .map(|cause| provider.identify_requirement(&cause.requirement)),
            )
            .collect::<FxHashSet<_>>();

        // The stack holds the state with the root requirements and at least one pin.
        while self.stack.len() >= 2 {
            // Drop the current state, then find the pin to undo.
            let (broken_state, name, candidate) = loop {
                let Some(mut broken_state) = self.stack.pop() else {
                    return Err(ResolutionError::Impossible {
                        causes: causes.to_vec(),
                    });
                };
                let Some((name, candidate)) = broken_state.mapping.pop() else {
                    return Err(ResolutionError::Impossible {
                        causes: causes.to_vec(),
                    });
                };
                let dependencies = self
                    .context
                    .dependency_identifiers(&candidate)
                    .map_err(ResolutionError::Provider)?;
                if !dependencies.is_disjoint(&incompatible_deps) {
                    break (broken_state, name, candidate);
                }
            };
            trace!("Backjumping over {name} ({candidate})");

            let mut incompatibilities_from_broken = broken_state
                .criteria
                .into_iter()
                .map(|(identifier, criterion)| (identifier, criterion.incompatibilities))
                .collect::<Vec<_>>();
            incompatibilities_from_broken.push((name, vec![candidate]));

            let Some(base) = self.stack.last() else {
                return Err(ResolutionError::Impossible {
                    causes: causes.to_vec(),
                });
            };
            self.current = base.clone();
            if self.patch_criteria(incompatibilities_from_broken)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Narrow the current criteria by the incompatibilities learned in the broken state.
    ///
    /// Returns `false` if that leaves an identifier without candidates.
    fn patch_criteria(
        &mut self,
        incompatibilities_from_broken: Vec<(P::Identifier, Vec<P::Candidate>)>,
    ) -> Result<bool, ErrorFor<P>> {
        for (identifier, mut incompatibilities) in incompatibilities_from_broken {
            if incompatibilities.is_empty() {
                continue;
            }
            let Some(criterion) = self.current.criteria.get(&identifier) else {
                continue;
            };
            incompatibilities.extend(criterion.incompatibilities.iter().cloned());
            let requirements = criterion.iter_requirement().collect::<Vec<_>>();
            let candidates = self
                .context
                .provider
                .find_matches(&identifier, &requirements, &incompatibilities)
                .map_err(ResolutionError::Provider)?;
            if candidates.is_empty() {
                return Ok(false);
            }
            let information = criterion.information.clone();
            self.current.criteria.insert(
                identifier,
                Criterion {
                    candidates,
                    information,
                    incompatibilities,
                },
            );
        }
        Ok(true)
    }
}
