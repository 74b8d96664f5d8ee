use std::time::{Duration, Instant};

use tracing::info;

use untangle_backtrack::Resolver;
use untangle_build::Interpreter;
use untangle_client::{FixtureRecorder, RegistryClient};
use untangle_normalize::PackageName;
use untangle_pep440::Version;
use untangle_pep508::{MarkerEnvironment, Requirement, StringVersion};

use crate::{
    IndexFinder, MetadataFetcher, PypiProvider, ResolutionResult, ResolveError, TracingReporter,
};

pub const DEFAULT_MAX_ROUNDS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// The Python version to resolve for, the interpreter's if unset.
    pub python_version: Option<Version>,
    /// Packages whose source distributions get their metadata from the build backend.
    pub legacy_metadata: Vec<PackageName>,
    pub max_rounds: usize,
    /// Give up if the resolution takes longer, checked between rounds.
    pub timeout: Option<Duration>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            python_version: None,
            legacy_metadata: Vec::new(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            timeout: None,
        }
    }
}

/// The caches of one resolution: project pages, candidates and metadata.
pub struct Session<'a> {
    finder: IndexFinder<'a>,
    fetcher: MetadataFetcher<'a>,
    markers: MarkerEnvironment,
    max_rounds: usize,
    timeout: Option<Duration>,
}

impl<'a> Session<'a> {
    pub fn new(
        client: &'a RegistryClient,
        interpreter: &'a Interpreter,
        options: &ResolveOptions,
        recorder: Option<&'a FixtureRecorder>,
    ) -> Self {
        let python_version = options
            .python_version
            .clone()
            .unwrap_or_else(|| interpreter.version().clone());
        let markers = with_python_version(interpreter.markers(), &python_version);
        Self {
            finder: IndexFinder::new(client, python_version).with_recorder(recorder),
            fetcher: MetadataFetcher::new(client, interpreter)
                .with_legacy_metadata(options.legacy_metadata.iter().cloned())
                .with_recorder(recorder),
            markers,
            max_rounds: options.max_rounds,
            timeout: options.timeout,
        }
    }

    /// The environment dependency markers are evaluated in.
    pub fn markers(&self) -> &MarkerEnvironment {
        &self.markers
    }

    pub fn resolve(
        &self,
        requirements: Vec<Requirement>,
    ) -> Result<ResolutionResult, ResolveError> {
        let provider = PypiProvider::new(&self.finder, &self.fetcher, &self.markers);
        let mut resolver = Resolver::new(&provider, &TracingReporter);
        if let Some(timeout) = self.timeout {
            resolver = resolver.with_deadline(Instant::now() + timeout);
        }
        let resolution = resolver.resolve(requirements, self.max_rounds)?;
        info!("Resolved {} packages", resolution.mapping.len());
        Ok(resolution)
    }
}

/// The markers with the Python version replaced, if it differs from the interpreter's.
fn with_python_version(markers: &MarkerEnvironment, python_version: &Version) -> MarkerEnvironment {
    let mut markers = markers.clone();
    if markers.python_full_version.version == *python_version {
        return markers;
    }
    let minor = Version::new(python_version.release().iter().take(2).copied());
    markers.python_full_version = StringVersion {
        string: python_version.to_string(),
        version: python_version.clone(),
    };
    markers.python_version = StringVersion {
        string: minor.to_string(),
        version: minor,
    };
    markers
}
