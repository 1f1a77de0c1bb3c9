use url::Url;

use crate::error::{Error, Result};

/// Validates the API base URL a client is pointed at.
///
/// HTTPS is required because every request carries the access keys. Plain
/// HTTP is only accepted for loopback hosts so tests can run against a local
/// mock server.
///
/// # Errors
///
/// - [`Error::InvalidUrl`] if the string does not parse
/// - [`Error::InsecureBaseUrl`] for any other scheme or a non-local HTTP host
///
/// # Examples
///
/// ```
/// use serialized::util::validate_base_url;
///
/// assert!(validate_base_url("https://api.serialized.io").is_ok());
/// assert!(validate_base_url("http://127.0.0.1:8080").is_ok());
/// assert!(validate_base_url("http://api.serialized.io").is_err());
/// ```
pub fn validate_base_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str)?;

    if url.cannot_be_a_base() {
        return Err(Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase));
    }

    match url.scheme() {
        "https" => Ok(url),
        "http" if is_loopback_host(&url) => {
            tracing::warn!(base_url = %url, "Using non-HTTPS base URL (localhost only)");
            Ok(url)
        }
        _ => {
            tracing::error!(base_url = %url, "Rejecting non-HTTPS base URL");
            Err(Error::InsecureBaseUrl)
        }
    }
}

fn is_loopback_host(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(domain)) => domain == "localhost",
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}
