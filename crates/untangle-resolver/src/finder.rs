use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::{debug, info, instrument, warn};

use untangle_client::{FixtureRecorder, RegistryClient, SimpleResponse};
use untangle_distribution_filename::DistFilename;
use untangle_normalize::PackageName;
use untangle_pep440::Version;

use crate::{Candidate, Identifier};

/// Lists the candidates of an identifier from the project page of its package.
///
/// Every package is queried at most once; the candidates of each identifier are built once
/// and replayed from the cache on later calls.
pub struct IndexFinder<'a> {
    client: &'a RegistryClient,
    /// Files that require another Python version are skipped.
    python_version: Version,
    recorder: Option<&'a FixtureRecorder>,
    pages: RefCell<FxHashMap<PackageName, Rc<SimpleResponse>>>,
    candidates: RefCell<FxHashMap<Identifier, Rc<[Candidate]>>>,
}

impl<'a> IndexFinder<'a> {
    pub fn new(client: &'a RegistryClient, python_version: Version) -> Self {
        Self {
            client,
            python_version,
            recorder: None,
            pages: RefCell::default(),
            candidates: RefCell::default(),
        }
    }

    /// Record every project page that is fetched into a fixture.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Option<&'a FixtureRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// The candidates of `identifier`, in index order.
    #[instrument(skip(self), fields(identifier = %identifier))]
    pub fn find_candidates(
        &self,
        identifier: &Identifier,
    ) -> Result<Rc<[Candidate]>, untangle_client::Error> {
        if let Some(candidates) = self.candidates.borrow().get(identifier) {
            debug!("Reusing the cached candidates of {identifier}");
            return Ok(candidates.clone());
        }

        let page = self.page(identifier.name())?;
        debug!(
            "Gathering the candidates of {identifier} from {}",
            self.client.index_url()
        );
        let candidates = page
            .page
            .files
            .iter()
            .filter_map(|file| {
                let filename = match DistFilename::try_from_filename(&file.filename) {
                    Ok(filename) => filename,
                    Err(err) if err.is_skippable() => {
                        info!("Skipping {}: {err}", file.filename);
                        return None;
                    }
                    Err(err) => {
                        warn!("Skipping {}: {err}", file.filename);
                        return None;
                    }
                };

                match &file.requires_python {
                    Some(Ok(requires_python)) if !requires_python.contains(&self.python_version) => {
                        debug!(
                            "Skipping {} as it requires Python {requires_python}",
                            file.filename
                        );
                        return None;
                    }
                    Some(Err(err)) => {
                        warn!(
                            "Ignoring the invalid `requires-python` of {}: {err}",
                            file.filename
                        );
                    }
                    _ => {}
                }

                let url = match page.file_url(&file.url) {
                    Ok(url) => url,
                    Err(err) => {
                        warn!("Skipping {} with invalid URL `{}`: {err}", file.filename, file.url);
                        return None;
                    }
                };

                Some(Candidate::new(
                    filename,
                    url,
                    file.hashes.sha256.clone(),
                    identifier.extras().to_vec(),
                ))
            })
            .collect::<Rc<[_]>>();

        self.candidates
            .borrow_mut()
            .insert(identifier.clone(), candidates.clone());
        Ok(candidates)
    }

    /// The project page of a package, fetched on first use.
    fn page(&self, name: &PackageName) -> Result<Rc<SimpleResponse>, untangle_client::Error> {
        if let Some(page) = self.pages.borrow().get(name) {
            return Ok(page.clone());
        }
        let page = Rc::new(self.client.simple(name)?);
        if let Some(recorder) = self.recorder {
            recorder.record_index(name, &page.raw)?;
        }
        self.pages.borrow_mut().insert(name.clone(), page.clone());
        Ok(page)
    }
}
