//! HTTP transport for the Serialized API.
//!
//! [`Client`] builds authenticated requests, enforces a per-request timeout
//! and a response size limit, and maps status codes to [`Error`]s. The
//! resource modules (`aggregate`, `feed`, `projection`, `reaction`) add their
//! operations as further `impl Client` blocks on top of these helpers.
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::util::validate_base_url;

pub const DEFAULT_BASE_URL: &str = "https://api.serialized.io";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Shortest wait the feed consumer will accept between polls.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

const ACCESS_KEY_HEADER: &str = "Serialized-Access-Key";
const SECRET_ACCESS_KEY_HEADER: &str = "Serialized-Secret-Access-Key";
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB

// ============================================================================
// Client
// ============================================================================

/// Client for the Serialized API.
///
/// Cheap to clone: the underlying connection pool is shared.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    user_agent: String,
    access_key: Arc<SecretString>,
    secret_access_key: Arc<SecretString>,
    poll_interval: Duration,
    request_timeout: Duration,
}

/// Credentials never appear in debug output.
impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url.as_str())
            .field("user_agent", &self.user_agent)
            .field("access_key", &"[REDACTED]")
            .field("secret_access_key", &"[REDACTED]")
            .field("poll_interval", &self.poll_interval)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Builds a client from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut builder = Self::builder()
            .base_url(&config.base_url)
            .poll_interval(Duration::from_millis(config.poll_interval_ms))
            .request_timeout(Duration::from_secs(config.request_timeout_secs));
        if let Some(key) = &config.access_key {
            builder = builder.access_key(key.expose_secret());
        }
        if let Some(key) = &config.secret_access_key {
            builder = builder.secret_access_key(key.expose_secret());
        }
        builder.build()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Interval the feed consumer waits between polls once caught up.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Resolves an API path from individual segments.
    ///
    /// Segments are percent-encoded, so names containing `/` or `?` cannot
    /// escape the resource they address.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Starts a request with the headers every call carries.
    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        tracing::trace!(method = %method, path = %url.path(), "Attaching API credentials");
        self.http
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .header(ACCESS_KEY_HEADER, self.access_key.expose_secret())
            .header(SECRET_ACCESS_KEY_HEADER, self.secret_access_key.expose_secret())
    }

    /// Attaches a JSON body.
    pub(crate) fn with_json<T: Serialize + ?Sized>(
        request: RequestBuilder,
        body: &T,
    ) -> Result<RequestBuilder> {
        let bytes = serde_json::to_vec(body).map_err(Error::Encode)?;
        Ok(request
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(bytes))
    }

    /// Sends a request under the client's timeout.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = tokio::time::timeout(self.request_timeout, request.send())
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(Error::Network)?;

        tracing::debug!(
            url = %response.url().path(),
            status = response.status().as_u16(),
            "Serialized API response"
        );
        Ok(response)
    }

    /// Reads and decodes a JSON body under the client's timeout.
    ///
    /// An empty body decodes to `T::default()` rather than failing.
    pub(crate) async fn read_json<T>(&self, response: Response) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let bytes = tokio::time::timeout(
            self.request_timeout,
            read_limited_bytes(response, MAX_RESPONSE_SIZE),
        )
        .await
        .map_err(|_| Error::Timeout)??;
        decode_json(&bytes)
    }
}

/// Fails unless the response carries the status the operation expects.
pub(crate) fn expect_status(response: &Response, expected: StatusCode) -> Result<()> {
    if response.status() == expected {
        Ok(())
    } else {
        Err(Error::UnexpectedStatus(response.status().as_u16()))
    }
}

/// Like [`expect_status`], but maps 404 to [`Error::NotFound`] for `resource`.
pub(crate) fn expect_found(
    response: &Response,
    expected: StatusCode,
    resource: impl FnOnce() -> String,
) -> Result<()> {
    if response.status() == StatusCode::NOT_FOUND {
        return Err(Error::not_found(resource()));
    }
    expect_status(response, expected)
}

pub(crate) fn decode_json<T>(bytes: &[u8]) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if bytes.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(bytes).map_err(Error::Decode)
}

async fn read_limited_bytes(response: Response, limit: usize) -> Result<Vec<u8>> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(Error::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Error::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(Error::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Client`]. Unset options fall back to the public defaults.
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: String,
    user_agent: String,
    access_key: SecretString,
    secret_access_key: SecretString,
    poll_interval: Duration,
    request_timeout: Duration,
    http: Option<reqwest::Client>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: format!("serialized-rs/{}", env!("CARGO_PKG_VERSION")),
            access_key: SecretString::from(String::new()),
            secret_access_key: SecretString::from(String::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            http: None,
        }
    }
}

impl ClientBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn access_key(mut self, key: impl Into<String>) -> Self {
        self.access_key = SecretString::from(key.into());
        self
    }

    pub fn secret_access_key(mut self, key: impl Into<String>) -> Self {
        self.secret_access_key = SecretString::from(key.into());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Reuses an existing `reqwest::Client` (proxies, custom TLS, ...).
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] / [`Error::InsecureBaseUrl`] if the base URL
    ///   does not parse or is not HTTPS (loopback hosts excepted)
    /// - [`Error::InvalidSetting`] if the poll interval is below
    ///   [`MIN_POLL_INTERVAL`] or the request timeout is zero
    /// - [`Error::Network`] if the HTTP client cannot be initialised
    pub fn build(self) -> Result<Client> {
        let base_url = validate_base_url(&self.base_url)?;
        if self.base_url != DEFAULT_BASE_URL {
            tracing::info!(base_url = %base_url, "Using custom Serialized API base URL");
        }
        if self.poll_interval < MIN_POLL_INTERVAL {
            return Err(Error::InvalidSetting("poll interval must be at least 10ms"));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::InvalidSetting("request timeout must be non-zero"));
        }

        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .pool_idle_timeout(Duration::from_secs(30))
                .tcp_keepalive(Duration::from_secs(60))
                .build()
                .map_err(Error::Network)?,
        };

        Ok(Client {
            http,
            base_url,
            user_agent: self.user_agent,
            access_key: Arc::new(self.access_key),
            secret_access_key: Arc::new(self.secret_access_key),
            poll_interval: self.poll_interval,
            request_timeout: self.request_timeout,
        })
    }
}
