use std::time::Duration;

use tracing::{debug, instrument};
use url::Url;

use untangle_normalize::PackageName;
use untangle_pypi_types::SimpleJson;

use crate::base_client::{BaseClient, BaseClientBuilder};
use crate::error::{Error, ErrorKind};

/// The media type of the JSON form of the Simple API.
const SIMPLE_JSON: &str = "application/vnd.pypi.simple.v1+json";

/// A builder for a [`RegistryClient`].
#[derive(Debug, Clone)]
pub struct RegistryClientBuilder {
    index_url: Url,
    base: BaseClientBuilder,
}

impl RegistryClientBuilder {
    pub fn new(index_url: Url) -> Self {
        Self {
            index_url,
            base: BaseClientBuilder::new(),
        }
    }

    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.base = self.base.retries(retries);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.base = self.base.timeout(timeout);
        self
    }

    #[must_use]
    pub fn retry_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.base = self.base.retry_bounds(min, max);
        self
    }

    pub fn build(&self) -> Result<RegistryClient, Error> {
        Ok(RegistryClient {
            index_url: self.index_url.clone(),
            client: self.base.build()?,
        })
    }
}

/// A project page of the index, both parsed and as received.
#[derive(Debug, Clone)]
pub struct SimpleResponse {
    /// The URL the page was fetched from; relative file URLs resolve against it.
    pub url: Url,
    pub page: SimpleJson,
    pub raw: Vec<u8>,
}

impl SimpleResponse {
    /// Resolve a file URL of the page. Relative URLs are relative to the project directory
    /// `{index_url}/{name}/`, even when the page was requested without the trailing slash.
    pub fn file_url(&self, url: &str) -> Result<Url, url::ParseError> {
        if self.url.path().ends_with('/') {
            return self.url.join(url);
        }
        let mut base = self.url.clone();
        base.set_path(&format!("{}/", self.url.path()));
        base.join(url)
    }
}

/// A client for fetching packages from a `PyPI`-compatible index.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    index_url: Url,
    client: BaseClient,
}

impl RegistryClient {
    pub fn index_url(&self) -> &Url {
        &self.index_url
    }

    /// Fetch the project page `{index_url}/{name}` in the JSON Simple API format.
    #[instrument(skip(self))]
    pub fn simple(&self, package_name: &PackageName) -> Result<SimpleResponse, Error> {
        let url = format!(
            "{}/{}",
            self.index_url.as_str().trim_end_matches('/'),
            package_name
        );
        let url = Url::parse(&url).map_err(|err| ErrorKind::InvalidUrl(url, err))?;

        let raw = self.client.get_bytes(&url, Some(SIMPLE_JSON))?;
        let page = serde_json::from_slice::<SimpleJson>(&raw)
            .map_err(|err| Error::from_json_err(err, url.clone()))?;
        debug!("Found {} files for {package_name}", page.files.len());
        Ok(SimpleResponse { url, page, raw })
    }

    /// Fetch the metadata file the index serves next to a distribution, at `{url}.metadata`.
    ///
    /// Returns `None` if the index answers with anything but success, which is how indexes
    /// without such files respond.
    #[instrument(skip_all, fields(%url))]
    pub fn metadata_sidecar(&self, url: &Url) -> Result<Option<Vec<u8>>, Error> {
        let sidecar = format!("{url}.metadata");
        let sidecar = Url::parse(&sidecar).map_err(|err| ErrorKind::InvalidUrl(sidecar, err))?;

        let response = self.client.get(&sidecar, None)?;
        if !response.status().is_success() {
            debug!(
                "No metadata file at {sidecar} (HTTP {})",
                response.status()
            );
            return Ok(None);
        }
        let bytes = response
            .bytes()
            .map_err(|err| ErrorKind::Request(sidecar.clone(), err))?;
        Ok(Some(bytes.to_vec()))
    }

    /// Download a whole distribution into memory.
    #[instrument(skip_all, fields(%url))]
    pub fn download(&self, url: &Url) -> Result<Vec<u8>, Error> {
        let bytes = self.client.get_bytes(url, None)?;
        debug!("Downloaded {} bytes from {url}", bytes.len());
        Ok(bytes)
    }
}
