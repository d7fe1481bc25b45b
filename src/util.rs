use std::sync::Mutex;
use std::time::Duration;

use http::Uri;
use http::header::{HeaderName, HeaderValue};
use url::Url;

use crate::error::{Error, TransportErrorKind};

const MAX_ERROR_BODY_LEN: usize = 2048;

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn redact_uri_for_logs(uri_text: &str) -> String {
    let Ok(mut parsed) = Url::parse(uri_text) else {
        return uri_text.split('?').next().unwrap_or(uri_text).to_owned();
    };

    let _ = parsed.set_username("");
    let _ = parsed.set_password(None);
    parsed.set_query(None);
    parsed.set_fragment(None);
    parsed.to_string()
}

/// Absolute urls are used as-is; relative ones are joined onto `base` per RFC 3986.
pub(crate) fn resolve_url(base: Option<&Url>, url: &str) -> Result<Url, Error> {
    match Url::parse(url) {
        Ok(absolute) => Ok(absolute),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = base.ok_or_else(|| Error::InvalidUri {
                uri: url.to_owned(),
            })?;
            base.join(url).map_err(|_| Error::InvalidUri {
                uri: url.to_owned(),
            })
        }
        Err(_) => Err(Error::InvalidUri {
            uri: url.to_owned(),
        }),
    }
}

/// Replaces the whole query component; an empty pair list removes it.
pub(crate) fn replace_query(url: &mut Url, pairs: &[(String, String)]) {
    if pairs.is_empty() {
        url.set_query(None);
        return;
    }
    url.query_pairs_mut().clear().extend_pairs(pairs);
}

pub(crate) fn to_http_uri(url: &Url) -> Result<Uri, Error> {
    url.as_str().parse().map_err(|_| Error::InvalidUri {
        uri: url.to_string(),
    })
}

pub(crate) fn validate_base_url(base_url: &str) -> Result<Url, Error> {
    let invalid = || Error::InvalidUri {
        uri: base_url.to_owned(),
    };
    let parsed = Url::parse(base_url.trim()).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(invalid());
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(invalid());
    }
    Ok(parsed)
}

pub(crate) fn classify_transport_error(
    error: &hyper_util::client::legacy::Error,
) -> TransportErrorKind {
    let text = error.to_string().to_ascii_lowercase();
    if error.is_connect() {
        if text.contains("dns")
            || text.contains("name or service not known")
            || text.contains("failed to lookup address")
        {
            return TransportErrorKind::Dns;
        }
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            return TransportErrorKind::Tls;
        }
        return TransportErrorKind::Connect;
    }

    if text.contains("read")
        || text.contains("connection reset")
        || text.contains("broken pipe")
        || text.contains("unexpected eof")
        || text.contains("connection closed")
    {
        return TransportErrorKind::Read;
    }

    TransportErrorKind::Other
}

pub(crate) fn parse_header_name(name: &str) -> Result<HeaderName, Error> {
    name.trim()
        .parse()
        .map_err(|source| Error::InvalidHeaderName {
            name: name.to_owned(),
            source,
        })
}

pub(crate) fn parse_header_value(name: &str, value: &str) -> Result<HeaderValue, Error> {
    value
        .parse()
        .map_err(|source| Error::InvalidHeaderValue {
            name: name.to_owned(),
            source,
        })
}

pub(crate) fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() <= MAX_ERROR_BODY_LEN {
        return text.into_owned();
    }

    let truncated: String = text.chars().take(MAX_ERROR_BODY_LEN).collect();
    format!("{truncated}...(truncated)")
}

pub(crate) fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use url::Url;

    use super::{
        parse_header_name, redact_uri_for_logs, replace_query, resolve_url, saturating_millis,
        truncate_body, validate_base_url,
    };
    use crate::error::Error;

    #[test]
    fn absolute_url_ignores_base() {
        let base = Url::parse("https://api.example.com/v1/").expect("base should parse");
        let resolved =
            resolve_url(Some(&base), "http://other.example.com/ping").expect("should resolve");
        assert_eq!(resolved.as_str(), "http://other.example.com/ping");
    }

    #[test]
    fn relative_url_joins_base() {
        let base = Url::parse("https://api.example.com/v1/").expect("base should parse");
        let resolved = resolve_url(Some(&base), "users/7").expect("should resolve");
        assert_eq!(resolved.as_str(), "https://api.example.com/v1/users/7");

        let rooted = resolve_url(Some(&base), "/health").expect("should resolve");
        assert_eq!(rooted.as_str(), "https://api.example.com/health");
    }

    #[test]
    fn relative_url_without_base_is_invalid() {
        let error = resolve_url(None, "users/7").expect_err("no base should fail");
        assert!(matches!(error, Error::InvalidUri { uri } if uri == "users/7"));
    }

    #[test]
    fn query_replacement_drops_existing_query() {
        let mut url = Url::parse("https://api.example.com/search?old=1#top").expect("url");
        replace_query(
            &mut url,
            &[
                ("q".to_owned(), "a b".to_owned()),
                ("tags[]".to_owned(), "x".to_owned()),
            ],
        );
        assert_eq!(
            url.as_str(),
            "https://api.example.com/search?q=a+b&tags%5B%5D=x#top"
        );

        replace_query(&mut url, &[]);
        assert_eq!(url.as_str(), "https://api.example.com/search#top");
    }

    #[test]
    fn redaction_strips_credentials_and_query() {
        assert_eq!(
            redact_uri_for_logs("https://user:pw@api.example.com/a?token=1#frag"),
            "https://api.example.com/a"
        );
        assert_eq!(redact_uri_for_logs("/relative?x=1"), "/relative");
    }

    #[test]
    fn base_url_must_be_http() {
        assert!(validate_base_url("https://api.example.com/").is_ok());
        assert!(validate_base_url("ftp://files.example.com/").is_err());
        assert!(validate_base_url("https://api.example.com/?x=1").is_err());
    }

    #[test]
    fn header_name_is_trimmed() {
        let name = parse_header_name(" X-Trace ").expect("name should parse");
        assert_eq!(name.as_str(), "x-trace");
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(3000);
        let truncated = truncate_body(body.as_bytes());
        assert!(truncated.ends_with("...(truncated)"));
        assert_eq!(truncate_body(b"short"), "short");
    }

    #[test]
    fn millis_saturate_instead_of_wrapping() {
        assert_eq!(saturating_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    }
}
