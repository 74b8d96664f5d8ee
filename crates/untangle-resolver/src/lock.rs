use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use url::Url;

use untangle_normalize::PackageName;
use untangle_pep440::Version;

use crate::ResolutionResult;

/// The name of the only target for now.
const DEFAULT_TARGET: &str = "default";

/// The pinned distributions of a resolution and the dependencies between their packages.
///
/// Extras are dropped: `requests` and `requests[socks]` share one source, and the packages
/// `requests[socks]` requires are listed as dependencies of `requests`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDocument {
    pub sources: BTreeMap<PackageName, LockSource>,
    /// Per target, the direct dependencies of every package, sorted.
    pub targets: BTreeMap<String, BTreeMap<PackageName, Vec<PackageName>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSource {
    pub url: Url,
    pub sha256: Option<String>,
    pub version: Version,
}

pub fn generate_lock(resolution: &ResolutionResult) -> LockDocument {
    let mut target: BTreeMap<PackageName, BTreeSet<PackageName>> = BTreeMap::new();
    for (parent, child) in resolution.edges() {
        target.entry(child.name().clone()).or_default();
        let Some(parent) = parent else {
            continue;
        };
        // Skip edges from unreachable pins, and from an extra to its own package.
        if !resolution.mapping.contains_key(parent) || parent.name() == child.name() {
            continue;
        }
        target
            .entry(parent.name().clone())
            .or_default()
            .insert(child.name().clone());
    }

    let sources = resolution
        .mapping
        .iter()
        .map(|(identifier, candidate)| {
            (
                identifier.name().clone(),
                LockSource {
                    url: candidate.url().clone(),
                    sha256: candidate.sha256().map(ToString::to_string),
                    version: candidate.version().clone(),
                },
            )
        })
        .collect();

    LockDocument {
        sources,
        targets: BTreeMap::from([(
            DEFAULT_TARGET.to_string(),
            target
                .into_iter()
                .map(|(name, dependencies)| (name, dependencies.into_iter().collect()))
                .collect(),
        )]),
    }
}
