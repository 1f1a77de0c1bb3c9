use thiserror::Error;

/// Boxed error returned by caller-supplied feed entry handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the client.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by the Serialized client and the feed consumer.
///
/// Transport failures, unexpected status codes and decoding problems are
/// reported as-is; nothing in this crate retries on its own. `Cancelled` is
/// kept separate so callers can tell a requested stop from a failure.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the size limit
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    /// Response status was not the one the operation expects
    #[error("Unexpected status code: {0}")]
    UnexpectedStatus(u16),
    /// The named resource does not exist (HTTP 404)
    #[error("Not found: {resource}")]
    NotFound { resource: String },
    /// Optimistic concurrency check failed while storing events (HTTP 409)
    #[error(
        "Version conflict storing {aggregate_type}/{aggregate_id}: expected version {expected_version}"
    )]
    Conflict {
        aggregate_type: String,
        aggregate_id: String,
        expected_version: u64,
    },
    /// Response body was not valid JSON for the expected type
    #[error("Invalid response body: {0}")]
    Decode(#[source] serde_json::Error),
    /// Request body could not be serialized
    #[error("Failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),
    /// A response header the operation relies on was absent or malformed
    #[error("Missing or invalid response header: {0}")]
    MissingHeader(&'static str),
    /// Base URL or endpoint could not be built
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// A client option is out of range
    #[error("Invalid client setting: {0}")]
    InvalidSetting(&'static str),
    /// Base URL is plain HTTP on a non-local host
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    /// Feed consumption was stopped through its cancellation token
    #[error("Feed consumption cancelled")]
    Cancelled,
    /// The entry handler failed; the cursor stays at the previous entry
    #[error("Handler failed at sequence number {sequence_number}: {source}")]
    Handler {
        sequence_number: u64,
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// Returns true if this error is the result of a cancellation request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns true for 404 responses on named resources.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub(crate) fn not_found(resource: impl Into<String>) -> Self {
        Error::NotFound {
            resource: resource.into(),
        }
    }
}
