/// Declares the environment variables read by `untangle`.
pub struct EnvVars;

impl EnvVars {
    /// Equivalent to the `--index-url` command-line argument: the Simple API root to resolve
    /// against.
    pub const UNTANGLE_INDEX_URL: &'static str = "UNTANGLE_INDEX_URL";

    /// Equivalent to the `--python` command-line argument: the interpreter whose environment
    /// markers are used and that runs build backends.
    pub const UNTANGLE_PYTHON: &'static str = "UNTANGLE_PYTHON";

    /// How often a failed request to the index is retried, 3 by default.
    pub const UNTANGLE_HTTP_RETRIES: &'static str = "UNTANGLE_HTTP_RETRIES";

    /// Timeout of a single request to the index in seconds, 30 by default.
    pub const UNTANGLE_HTTP_TIMEOUT: &'static str = "UNTANGLE_HTTP_TIMEOUT";

    /// Standard `RUST_LOG` filter, overriding `-v` and `-q`.
    pub const RUST_LOG: &'static str = "RUST_LOG";
}
