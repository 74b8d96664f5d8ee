use std::fmt::Write;

use itertools::Itertools;
use tracing::{Level, debug, enabled, trace};

use untangle_backtrack::{CriterionFor, InformationFor, Reporter, StateFor};
use untangle_pep508::Requirement;

use crate::{Candidate, PypiProvider};

/// Logs the progress of a resolution: decisions at `debug`, and after every round a table of
/// all identifiers at `trace`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter<PypiProvider<'_>> for TracingReporter {
    fn starting(&self) {
        debug!("Starting resolution");
    }

    fn starting_round(&self, index: usize) {
        trace!("Starting round {index}");
    }

    fn ending_round(&self, index: usize, state: &StateFor<PypiProvider<'_>>) {
        if enabled!(Level::TRACE) {
            trace!("State after round {index}:\n{}", round_table(state));
        }
    }

    fn ending(&self, state: &StateFor<PypiProvider<'_>>) {
        debug!("Resolved {} packages", state.mapping.len());
    }

    fn adding_requirement(&self, requirement: &Requirement, parent: Option<&Candidate>) {
        match parent {
            Some(parent) => trace!("Adding requirement `{requirement}` of {parent}"),
            None => trace!("Adding requirement `{requirement}`"),
        }
    }

    fn resolving_conflicts(&self, causes: &[InformationFor<PypiProvider<'_>>]) {
        debug!(
            "Backtracking over conflicts: {}",
            causes.iter().map(ToString::to_string).join(", ")
        );
    }

    fn rejecting_candidate(
        &self,
        criterion: &CriterionFor<PypiProvider<'_>>,
        candidate: &Candidate,
    ) {
        debug!(
            "Rejecting {candidate}, no candidates left for: {}",
            criterion.information.iter().map(ToString::to_string).join(", ")
        );
    }

    fn rejecting_unavailable(&self, candidate: &Candidate, reason: &str) {
        debug!("Rejecting {candidate}: {reason}");
    }

    fn pinning(&self, candidate: &Candidate) {
        debug!("Pinning {candidate}");
    }
}

/// One row per identifier: whether it's pinned, the kind of distribution, the version and the
/// packages that require it.
fn round_table(state: &StateFor<PypiProvider<'_>>) -> String {
    let rows = state
        .criteria
        .iter()
        .map(|(identifier, criterion)| {
            let (status, kind, version) = match state.mapping.get(identifier) {
                Some(candidate) => (
                    "pinned",
                    candidate.filename().kind().to_string(),
                    candidate.version().to_string(),
                ),
                None => ("pending", "?".to_string(), "?".to_string()),
            };
            let requested_by = criterion
                .iter_parent()
                .map(|parent| parent.map_or("<root>".to_string(), |parent| parent.name().to_string()))
                .unique()
                .join(", ");
            [
                status.to_string(),
                identifier.to_string(),
                kind,
                version,
                requested_by,
            ]
        })
        .collect::<Vec<_>>();

    let header = ["status", "identifier", "type", "version", "requested by"].map(String::from);
    let mut widths = header.clone().map(|cell| cell.len());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut table = String::new();
    for row in std::iter::once(&header).chain(&rows) {
        let line = row
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .join("  ");
        let _ = writeln!(table, "{}", line.trim_end());
    }
    table
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use untangle_backtrack::{Criterion, RequirementInformation, StateFor};
    use untangle_distribution_filename::DistFilename;
    use untangle_normalize::ExtraName;
    use untangle_pep508::Requirement;

    use super::round_table;
    use crate::{Candidate, PypiProvider};

    fn candidate(filename: &str, extras: &[&str]) -> Candidate {
        Candidate::new(
            DistFilename::try_from_filename(filename).unwrap(),
            format!("https://files.example.com/{filename}").parse().unwrap(),
            None,
            extras
                .iter()
                .map(|extra| ExtraName::from_str(extra).unwrap())
                .collect(),
        )
    }

    fn criterion(
        requirement: &str,
        parents: &[Option<&Candidate>],
        candidates: Vec<Candidate>,
    ) -> Criterion<Requirement, Candidate> {
        Criterion {
            candidates,
            information: parents
                .iter()
                .map(|parent| RequirementInformation {
                    requirement: Requirement::from_str(requirement).unwrap(),
                    parent: parent.cloned(),
                })
                .collect(),
            incompatibilities: Vec::new(),
        }
    }

    #[test]
    fn table() {
        let requests = candidate("requests-2.31.0-py3-none-any.whl", &["socks"]);
        let pysocks = candidate("PySocks-1.7.1.tar.gz", &[]);

        let mut state = StateFor::<PypiProvider>::default();
        state.criteria.insert(
            requests.identifier(),
            criterion("requests[socks]", &[None], vec![requests.clone()]),
        );
        state.criteria.insert(
            pysocks.identifier(),
            criterion(
                "pysocks>=1.5.6",
                &[Some(&requests), Some(&requests)],
                vec![pysocks.clone()],
            ),
        );
        state.criteria.insert(
            candidate("idna-3.4-py3-none-any.whl", &[]).identifier(),
            criterion("idna", &[Some(&requests)], Vec::new()),
        );
        state
            .mapping
            .insert(requests.identifier(), requests.clone());
        state.mapping.insert(pysocks.identifier(), pysocks);

        insta::assert_snapshot!(round_table(&state), @r"
        status   identifier       type   version  requested by
        pinned   requests[socks]  wheel  2.31.0   <root>
        pinned   pysocks          sdist  1.7.1    requests
        pending  idna             ?      ?        requests
        ");
    }
}
