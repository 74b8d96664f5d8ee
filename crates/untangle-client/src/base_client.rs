use std::error::Error as _;
use std::io;
use std::time::{Duration, SystemTime};

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::ACCEPT;
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::{RetryDecision, RetryPolicy, Retryable, default_on_request_error};
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, ErrorKind};

/// The default number of retries for transient failures.
pub const DEFAULT_RETRIES: u32 = 3;

/// The default timeout of a single request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A builder for a [`BaseClient`].
#[derive(Debug, Clone)]
pub struct BaseClientBuilder {
    retries: u32,
    timeout: Duration,
    retry_bounds: Option<(Duration, Duration)>,
}

impl Default for BaseClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseClientBuilder {
    pub fn new() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            retry_bounds: None,
        }
    }

    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the minimum and maximum backoff between retries.
    #[must_use]
    pub fn retry_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.retry_bounds = Some((min, max));
        self
    }

    pub fn build(&self) -> Result<BaseClient, Error> {
        let client = Client::builder()
            .user_agent(concat!("untangle/", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .build()
            .map_err(ErrorKind::ClientBuild)?;
        debug!(
            "Using request timeout of {}s and {} retries",
            self.timeout.as_secs(),
            self.retries
        );
        Ok(BaseClient {
            client,
            retries: self.retries,
            retry_bounds: self.retry_bounds,
        })
    }
}

/// A blocking HTTP client that retries transient failures.
#[derive(Debug, Clone)]
pub struct BaseClient {
    client: Client,
    retries: u32,
    retry_bounds: Option<(Duration, Duration)>,
}

impl BaseClient {
    /// The [`RetryPolicy`] for the client.
    pub fn retry_policy(&self) -> ExponentialBackoff {
        let mut builder = ExponentialBackoff::builder();
        if let Some((min, max)) = self.retry_bounds {
            builder = builder.retry_bounds(min, max);
        }
        builder.build_with_max_retries(self.retries)
    }

    /// Send a `GET` request, retrying on transient errors and on 5xx, 408 and 429 responses.
    ///
    /// Any other response is returned as is, including error statuses. Once the retries are used
    /// up, the last response is returned too, so the caller decides what an error status means.
    pub fn get(&self, url: &Url, accept: Option<&str>) -> Result<Response, Error> {
        self.send(url, accept).map(|(response, _)| response)
    }

    /// Like [`BaseClient::get`], but any non-success status is an error and the whole body is
    /// read.
    pub fn get_bytes(&self, url: &Url, accept: Option<&str>) -> Result<Vec<u8>, Error> {
        let (response, retries) = self.send(url, accept)?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::new(
                ErrorKind::Status {
                    url: url.clone(),
                    status,
                },
                retries,
            ));
        }
        let bytes = response
            .bytes()
            .map_err(|err| Error::new(ErrorKind::Request(url.clone(), err), retries))?;
        Ok(bytes.to_vec())
    }

    /// Returns the final response and the number of retries it took.
    fn send(&self, url: &Url, accept: Option<&str>) -> Result<(Response, u32), Error> {
        let mut retry_state = RetryState::start(self.retry_policy(), url.clone());
        loop {
            let mut request = self.client.get(url.clone());
            if let Some(accept) = accept {
                request = request.header(ACCEPT, accept);
            }
            let backoff = match request.send() {
                Ok(response) => {
                    if !is_retryable_status(response.status()) {
                        return Ok((response, retry_state.total_retries()));
                    }
                    trace!(
                        "Considering retry of response HTTP {} for {url}",
                        response.status()
                    );
                    match retry_state.should_retry(Some(Retryable::Transient)) {
                        Some(duration) => duration,
                        None => return Ok((response, retry_state.total_retries())),
                    }
                }
                Err(err) => match retry_state.should_retry(retryable_on_request_failure(&err)) {
                    Some(duration) => duration,
                    None => {
                        return Err(Error::new(
                            ErrorKind::Request(url.clone(), err),
                            retry_state.total_retries(),
                        ));
                    }
                },
            };
            retry_state.sleep_backoff(backoff);
        }
    }
}

/// Whether the status code is worth retrying.
///
/// Port of `reqwest_retry::default_on_request_success`.
fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Classify a failed request, looking through the error's sources for I/O errors.
fn retryable_on_request_failure(err: &reqwest::Error) -> Option<Retryable> {
    trace!("Considering retry of error: {err:?}");
    if default_on_request_error(err) == Some(Retryable::Transient) {
        return Some(Retryable::Transient);
    }

    let mut current_source = err.source();
    while let Some(source) = current_source {
        if let Some(io_err) = source.downcast_ref::<io::Error>() {
            let retryable_io_err_kinds = [
                io::ErrorKind::BrokenPipe,
                io::ErrorKind::ConnectionAborted,
                io::ErrorKind::ConnectionReset,
                io::ErrorKind::InvalidData,
                io::ErrorKind::TimedOut,
                io::ErrorKind::UnexpectedEof,
            ];
            if retryable_io_err_kinds.contains(&io_err.kind()) {
                trace!("Retrying error: `{}`", io_err.kind());
                return Some(Retryable::Transient);
            }
        }
        current_source = source.source();
    }

    Some(Retryable::Fatal)
}

/// Per-request retry state and policy.
struct RetryState {
    retry_policy: ExponentialBackoff,
    start_time: SystemTime,
    total_retries: u32,
    url: Url,
}

impl RetryState {
    fn start(retry_policy: ExponentialBackoff, url: Url) -> Self {
        Self {
            retry_policy,
            start_time: SystemTime::now(),
            total_retries: 0,
            url,
        }
    }

    fn total_retries(&self) -> u32 {
        self.total_retries
    }

    /// Returns the backoff duration if the request should be retried.
    #[must_use]
    fn should_retry(&mut self, retryable: Option<Retryable>) -> Option<Duration> {
        match retryable {
            Some(Retryable::Transient) => {
                let now = SystemTime::now();
                let retry_decision = self
                    .retry_policy
                    .should_retry(self.start_time, self.total_retries);
                if let RetryDecision::Retry { execute_after } = retry_decision {
                    let duration = execute_after
                        .duration_since(now)
                        .unwrap_or_else(|_| Duration::default());
                    self.total_retries += 1;
                    return Some(duration);
                }
                None
            }
            Some(Retryable::Fatal) | None => None,
        }
    }

    fn sleep_backoff(&self, duration: Duration) {
        debug!(
            "Transient failure while handling response from {}; retrying after {:.1}s...",
            self.url,
            duration.as_secs_f32(),
        );
        std::thread::sleep(duration);
    }
}
