pub use base_client::{BaseClient, BaseClientBuilder, DEFAULT_RETRIES, DEFAULT_TIMEOUT};
pub use error::{Error, ErrorKind};
pub use fixtures::{FixtureInputs, FixtureRecorder, FixtureReplay};
pub use registry_client::{RegistryClient, RegistryClientBuilder, SimpleResponse};

mod base_client;
mod error;
mod fixtures;
mod registry_client;
