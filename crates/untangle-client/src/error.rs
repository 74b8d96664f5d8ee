use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use reqwest::StatusCode;
use url::Url;

#[derive(Debug)]
pub struct Error {
    kind: Box<ErrorKind>,
    retries: u32,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.retries > 0 {
            write!(
                f,
                "Request failed after {retries} retries",
                retries = self.retries
            )
        } else {
            Display::fmt(&self.kind, f)
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if self.retries > 0 {
            Some(&self.kind)
        } else {
            self.kind.source()
        }
    }
}

impl Error {
    pub fn new(kind: ErrorKind, retries: u32) -> Self {
        Self {
            kind: Box::new(kind),
            retries,
        }
    }

    /// The number of retries that were attempted before this error was returned.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.kind
    }

    /// The HTTP status of the failed response, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match &*self.kind {
            ErrorKind::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn from_json_err(err: serde_json::Error, url: Url) -> Self {
        ErrorKind::BadJson { source: err, url }.into()
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind, 0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("Invalid index URL: `{0}`")]
    InvalidUrl(String, #[source] url::ParseError),

    #[error("Failed to build the HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    /// A transport error while sending the request or reading the response.
    #[error("Failed to fetch: `{0}`")]
    Request(Url, #[source] reqwest::Error),

    /// The server answered with an error status.
    #[error("HTTP status {status} for `{url}`")]
    Status { url: Url, status: StatusCode },

    #[error("Received some unexpected JSON from {url}")]
    BadJson {
        source: serde_json::Error,
        url: Url,
    },

    #[error("Failed to write fixture file `{}`", _0.display())]
    FixtureWrite(PathBuf, #[source] std::io::Error),

    #[error("Failed to read fixture file `{}`", _0.display())]
    FixtureRead(PathBuf, #[source] std::io::Error),

    #[error("Invalid JSON in fixture file `{}`", _0.display())]
    FixtureJson(PathBuf, #[source] serde_json::Error),
}
